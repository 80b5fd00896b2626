use serde::{Deserialize, Serialize};

use crate::error::FlyoverError;
use crate::model::{OracleMerkleProof, TxBlockInfo};

/// Esplora (mempool-space style) REST collaborator supplying raw Bitcoin
/// data to the proof builders.
///
/// Errors are `anyhow::Error` with a typed [`FlyoverError`] inside where the
/// condition matters to callers (`NotFound`, `NotConfirmed`), recoverable
/// with `downcast_ref`.
#[derive(Debug, Clone)]
pub struct EsploraClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
struct TxResponse {
    status: TxStatus,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
struct TxStatus {
    confirmed: bool,
    block_height: Option<u64>,
    block_hash: Option<String>,
    block_time: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
struct MerkleProofResponse {
    block_height: u64,
    merkle: Vec<String>,
    pos: u64,
}

impl EsploraClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn get(&self, path: &str, what: &str) -> Result<reqwest::Response, anyhow::Error> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FlyoverError::NotFound(what.to_string()).into());
        }
        Ok(response.error_for_status()?)
    }

    /// Resolves the containing block of a transaction, or `NotConfirmed`
    /// while it is still in the mempool.
    pub async fn get_transaction_block_info(
        &self,
        txid: &str,
    ) -> Result<TxBlockInfo, anyhow::Error> {
        let tx: TxResponse = self
            .get(&format!("/tx/{txid}"), &format!("transaction {txid}"))
            .await?
            .json()
            .await?;

        if !tx.status.confirmed {
            return Err(FlyoverError::NotConfirmed(txid.to_string()).into());
        }
        Ok(TxBlockInfo {
            block_hash: tx
                .status
                .block_hash
                .ok_or_else(|| FlyoverError::NotConfirmed(txid.to_string()))?,
            block_height: tx.status.block_height.unwrap_or_default(),
            block_time: tx.status.block_time.unwrap_or_default(),
        })
    }

    /// Raw consensus-serialized block bytes.
    pub async fn get_block(&self, block_hash: &str) -> Result<Vec<u8>, anyhow::Error> {
        let bytes = self
            .get(
                &format!("/block/{block_hash}/raw"),
                &format!("block {block_hash}"),
            )
            .await?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }

    /// Simplified inclusion proof for a confirmed transaction. Esplora
    /// answers 404 here for mempool transactions even though `/tx` knows
    /// them, so callers treat the confirmation check as theirs.
    pub async fn get_merkle_proof(&self, txid: &str) -> Result<OracleMerkleProof, anyhow::Error> {
        let proof: MerkleProofResponse = self
            .get(
                &format!("/tx/{txid}/merkle-proof"),
                &format!("merkle proof for transaction {txid}"),
            )
            .await?
            .json()
            .await?;
        Ok(OracleMerkleProof {
            block_height: proof.block_height,
            hashes: proof.merkle,
            position: proof.pos,
        })
    }
}
