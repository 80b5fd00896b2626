use async_trait::async_trait;
use tracing::info;

use crate::error::FlyoverError;
use crate::merkle::branch::to_merkle_branch;
use crate::merkle::coinbase::build_coinbase_proof;
use crate::merkle::pmt::build_partial_merkle_tree;
use crate::model::{CoinbaseProof, MerkleBranch, OracleMerkleProof, TxBlockInfo};
use crate::rpc::EsploraClient;

/// Read side of the Bitcoin data oracle the proof flows depend on.
///
/// The seam exists so tests (and alternative backends) can feed the service
/// without a network; [`EsploraClient`] is the production implementation.
#[async_trait]
pub trait BitcoinDataProvider {
    async fn get_transaction_block_info(&self, txid: &str) -> Result<TxBlockInfo, anyhow::Error>;
    async fn get_block(&self, block_hash: &str) -> Result<Vec<u8>, anyhow::Error>;
    async fn get_merkle_proof(&self, txid: &str) -> Result<OracleMerkleProof, anyhow::Error>;
}

#[async_trait]
impl BitcoinDataProvider for EsploraClient {
    async fn get_transaction_block_info(&self, txid: &str) -> Result<TxBlockInfo, anyhow::Error> {
        EsploraClient::get_transaction_block_info(self, txid).await
    }

    async fn get_block(&self, block_hash: &str) -> Result<Vec<u8>, anyhow::Error> {
        EsploraClient::get_block(self, block_hash).await
    }

    async fn get_merkle_proof(&self, txid: &str) -> Result<OracleMerkleProof, anyhow::Error> {
        EsploraClient::get_merkle_proof(self, txid).await
    }
}

/// Serialized PMT together with where the proven transaction lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionInclusionProof {
    pub block_info: TxBlockInfo,
    pub serialized_pmt: Vec<u8>,
}

/// Fetch-then-build orchestration for the pegin/pegout proof flows.
///
/// Never retries: `NotConfirmed` surfaces to the caller, which polls once
/// more confirmations accrue (`err.downcast_ref::<FlyoverError>()`).
#[derive(Debug, Clone)]
pub struct FlyoverProofService<P> {
    provider: P,
}

impl<P: BitcoinDataProvider> FlyoverProofService<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Inclusion proof for a confirmed transaction, ready for bridge
    /// submission. `txid` is in RPC display order.
    pub async fn transaction_inclusion_proof(
        &self,
        txid: &str,
    ) -> Result<TransactionInclusionProof, anyhow::Error> {
        info!("building inclusion proof for tx {}", txid);

        let block_info = self.provider.get_transaction_block_info(txid).await?;
        let block_bytes = self.provider.get_block(&block_info.block_hash).await?;
        let target = txid_to_internal(txid)?;
        let serialized_pmt = build_partial_merkle_tree(&block_bytes, &target)?;

        Ok(TransactionInclusionProof {
            block_info,
            serialized_pmt,
        })
    }

    /// Coinbase proof of the given block, for witness-commitment
    /// registration calls.
    pub async fn coinbase_inclusion_proof(
        &self,
        block_hash: &str,
    ) -> Result<CoinbaseProof, anyhow::Error> {
        info!("building coinbase proof for block {}", block_hash);

        let block_bytes = self.provider.get_block(block_hash).await?;
        Ok(build_coinbase_proof(&block_bytes)?)
    }

    /// Oracle-reported branch for the pegout refund flow.
    pub async fn refund_merkle_branch(&self, txid: &str) -> Result<MerkleBranch, anyhow::Error> {
        info!("building refund merkle branch for tx {}", txid);

        let proof = self.provider.get_merkle_proof(txid).await?;
        Ok(to_merkle_branch(&proof.hashes, proof.position)?)
    }
}

fn txid_to_internal(txid: &str) -> Result<[u8; 32], FlyoverError> {
    let bytes = hex::decode(txid)?;
    let mut internal: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| FlyoverError::Decode(format!("txid {txid} is not 32 bytes")))?;
    internal.reverse();
    Ok(internal)
}
