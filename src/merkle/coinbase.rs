//! Coinbase inclusion proof, proving chain-extension and witness-commitment
//! facts to the bridge: the legacy-serialized coinbase, its PMT in the txid
//! tree, the witness-id merkle root, and the witness reserved value.

use bitcoin::consensus::{encode, Decodable};
use bitcoin::hashes::Hash;
use bitcoin::{Block, Transaction, Witness};

use crate::error::FlyoverError;
use crate::merkle::pmt::serialize_partial_merkle_tree;
use crate::merkle::tree::merkle_root;
use crate::model::CoinbaseProof;

/// Builds the full coinbase proof from raw block bytes.
///
/// Pure function of the block: the height comes from the BIP34 push in the
/// coinbase scriptSig (every segwit block has one), hashes are reported in
/// RPC display order as the bridge expects them.
pub fn build_coinbase_proof(block_bytes: &[u8]) -> Result<CoinbaseProof, FlyoverError> {
    let block = Block::consensus_decode(&mut &block_bytes[..])?;

    let (coinbase_index, coinbase) = block
        .txdata
        .iter()
        .enumerate()
        .find(|(_, tx)| tx.is_coin_base())
        .ok_or_else(|| {
            FlyoverError::InvariantViolation("block has no coinbase transaction".to_string())
        })?;

    let witness_reserved_value = extract_witness_reserved_value(coinbase)?;

    // A transaction with no witness data encodes in the pre-segwit format.
    let mut stripped = coinbase.clone();
    for input in &mut stripped.input {
        input.witness = Witness::new();
    }
    let btc_tx_serialized = encode::serialize(&stripped);

    let txids: Vec<[u8; 32]> = block
        .txdata
        .iter()
        .map(|tx| tx.txid().to_raw_hash().to_byte_array())
        .collect();
    let serialized_pmt = serialize_partial_merkle_tree(&txids, &txids[coinbase_index])?;

    // The coinbase wtxid is all zero in the commitment tree (BIP141).
    let wtxids: Vec<[u8; 32]> = block
        .txdata
        .iter()
        .enumerate()
        .map(|(i, tx)| {
            if i == coinbase_index {
                [0u8; 32]
            } else {
                tx.wtxid().to_raw_hash().to_byte_array()
            }
        })
        .collect();
    let witness_merkle_root = merkle_root(&wtxids).ok_or_else(|| {
        FlyoverError::InvariantViolation("block has no transactions".to_string())
    })?;

    let block_height = block.bip34_block_height().map_err(|e| {
        FlyoverError::InvariantViolation(format!("coinbase lacks a BIP34 height: {e}"))
    })?;

    Ok(CoinbaseProof {
        btc_tx_serialized,
        block_hash: to_display_order(block.block_hash().to_raw_hash().to_byte_array()),
        block_height,
        serialized_pmt,
        witness_merkle_root: to_display_order(witness_merkle_root),
        witness_reserved_value,
    })
}

fn extract_witness_reserved_value(coinbase: &Transaction) -> Result<[u8; 32], FlyoverError> {
    let input = coinbase.input.first().ok_or_else(|| {
        FlyoverError::InvariantViolation("coinbase transaction has no input".to_string())
    })?;
    let first = input.witness.nth(0).ok_or_else(|| {
        FlyoverError::InvariantViolation(
            "coinbase carries no witness, block predates segwit".to_string(),
        )
    })?;
    if first.len() != 32 {
        return Err(FlyoverError::InvariantViolation(format!(
            "witness reserved value is {} bytes, expected 32",
            first.len()
        )));
    }
    let mut value = [0u8; 32];
    value.copy_from_slice(first);
    Ok(value)
}

fn to_display_order(mut hash: [u8; 32]) -> [u8; 32] {
    hash.reverse();
    hash
}
