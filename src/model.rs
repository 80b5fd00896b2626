use serde::{Deserialize, Serialize};

/// Snapshot of the Bitcoin federation as reported by the RSK bridge contract.
///
/// Fetched fresh from the bridge per use; this crate never caches one. The
/// key fields are hex strings as the bridge reports them and are decoded at
/// the point of use so malformed hex surfaces as a decode error there.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationInfo {
    pub fed_threshold: i64,
    pub fed_size: i64,
    /// Compressed secp256k1 public keys, hex encoded, in federation order.
    pub pub_keys: Vec<String>,
    /// The federation P2SH address as it appears on-chain.
    pub fed_address: String,
    pub active_fed_block_height: i64,
    pub iris_activation_height: i64,
    /// Emergency recovery keys, hex encoded.
    pub erp_keys: Vec<String>,
}

/// Per-quote inputs the derivation value is computed over.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlyoverDerivationArgs {
    pub fed_info: FederationInfo,
    /// RSK liquidity bridge contract address, 20 bytes.
    pub lbc_address: Vec<u8>,
    /// Decoded script payload of the user's BTC refund address.
    pub user_btc_refund_address: Vec<u8>,
    pub lp_btc_address: Vec<u8>,
    pub quote_hash: [u8; 32],
}

/// A quote's deposit address plus the script that proves how it was built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlyoverDerivation {
    pub address: String,
    /// Hex of `PUSH32 <derivation value> OP_DROP <federation redeem script>`.
    pub redeem_script: String,
}

/// Sibling path for the pegout refund flow, as supplied by the data provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleBranch {
    pub hashes: Vec<[u8; 32]>,
    /// Left/right indicator per level, least significant bit at the leaf.
    pub path: u64,
}

/// Everything the bridge registration call needs to know about a block's
/// coinbase transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinbaseProof {
    /// Coinbase transaction in legacy (witness-stripped) serialization.
    pub btc_tx_serialized: Vec<u8>,
    /// Block hash in RPC display order.
    pub block_hash: [u8; 32],
    pub block_height: u64,
    pub serialized_pmt: Vec<u8>,
    /// Witness-id merkle root in RPC display order.
    pub witness_merkle_root: [u8; 32],
    pub witness_reserved_value: [u8; 32],
}

/// Where a confirmed transaction landed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxBlockInfo {
    pub block_hash: String,
    pub block_height: u64,
    pub block_time: u64,
}

/// Simplified inclusion proof as reported by the data provider. Trusted
/// as-is; see [`crate::merkle::branch`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleMerkleProof {
    pub block_height: u64,
    pub hashes: Vec<String>,
    pub position: u64,
}
