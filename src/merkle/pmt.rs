//! BIP37 partial merkle tree construction and wire serialization.
//!
//! The serialized form is consumed by the RSK bridge contract, which
//! recomputes the merkle root from it, so the bytes must match the Bitcoin
//! `merkleblock` encoding exactly: `u32_le` transaction count, compact-size
//! prefixed hash list, compact-size prefixed flag bytes with bits packed
//! LSB-first in pre-order traversal order. The byte emission here is
//! hand-rolled for that reason and pinned against rust-bitcoin's consensus
//! encoder in tests.

use bitcoin::consensus::Decodable;
use bitcoin::hashes::Hash;

use crate::error::FlyoverError;
use crate::merkle::tree::hash_pair;

/// Serialized inclusion proof of `target_txid` (internal byte order) in the
/// given raw block.
pub fn build_partial_merkle_tree(
    block_bytes: &[u8],
    target_txid: &[u8; 32],
) -> Result<Vec<u8>, FlyoverError> {
    let block = bitcoin::Block::consensus_decode(&mut &block_bytes[..])?;
    let txids: Vec<[u8; 32]> = block
        .txdata
        .iter()
        .map(|tx| tx.txid().to_raw_hash().to_byte_array())
        .collect();
    serialize_partial_merkle_tree(&txids, target_txid)
}

/// Same as [`build_partial_merkle_tree`] over an already extracted txid list.
pub fn serialize_partial_merkle_tree(
    txids: &[[u8; 32]],
    target_txid: &[u8; 32],
) -> Result<Vec<u8>, FlyoverError> {
    if !txids.iter().any(|txid| txid == target_txid) {
        let mut display = *target_txid;
        display.reverse();
        return Err(FlyoverError::NotFound(format!(
            "transaction {} in block",
            hex::encode(display)
        )));
    }

    let matches: Vec<bool> = txids.iter().map(|txid| txid == target_txid).collect();
    let mut builder = PmtBuilder {
        txids,
        matches: &matches,
        bits: Vec::new(),
        hashes: Vec::new(),
    };
    let height = tree_height(txids.len() as u32);
    builder.traverse(height, 0);

    let flag_len = (builder.bits.len() + 7) / 8;
    let mut out = Vec::with_capacity(4 + 9 + 32 * builder.hashes.len() + 9 + flag_len);
    out.extend_from_slice(&(txids.len() as u32).to_le_bytes());
    write_compact_size(&mut out, builder.hashes.len() as u64);
    for hash in &builder.hashes {
        out.extend_from_slice(hash);
    }
    write_compact_size(&mut out, flag_len as u64);
    let mut flags = vec![0u8; flag_len];
    for (i, bit) in builder.bits.iter().enumerate() {
        if *bit {
            flags[i / 8] |= 1 << (i % 8);
        }
    }
    out.extend_from_slice(&flags);
    Ok(out)
}

/// Walks a serialized partial merkle tree and recomputes the root it
/// commits to, in internal byte order. The walk is the inverse of the
/// builder's pre-order traversal.
pub fn compute_pmt_root(serialized: &[u8]) -> Result<[u8; 32], FlyoverError> {
    let mut input = serialized;

    let count_bytes = take(&mut input, 4)?;
    let tx_count = u32::from_le_bytes([
        count_bytes[0],
        count_bytes[1],
        count_bytes[2],
        count_bytes[3],
    ]);
    if tx_count == 0 {
        return Err(FlyoverError::Decode(
            "partial merkle tree over zero transactions".to_string(),
        ));
    }

    let hash_count = read_compact_size(&mut input)? as usize;
    if hash_count > tx_count as usize {
        return Err(FlyoverError::Decode(
            "partial merkle tree hash count exceeds transaction count".to_string(),
        ));
    }
    let mut hashes = Vec::with_capacity(hash_count);
    for _ in 0..hash_count {
        let raw = take(&mut input, 32)?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(raw);
        hashes.push(hash);
    }

    let flag_len = read_compact_size(&mut input)? as usize;
    let flag_bytes = take(&mut input, flag_len)?;
    let mut bits = Vec::with_capacity(flag_len * 8);
    for byte in flag_bytes {
        for i in 0..8 {
            bits.push(byte >> i & 1 == 1);
        }
    }

    let mut walker = PmtWalker {
        tx_count,
        bits: &bits,
        hashes: &hashes,
        bit_pos: 0,
        hash_pos: 0,
    };
    walker.extract(tree_height(tx_count), 0)
}

// Number of nodes at the given height, leaves at height 0.
fn level_width(tx_count: u32, height: u32) -> u32 {
    (tx_count + (1 << height) - 1) >> height
}

fn tree_height(tx_count: u32) -> u32 {
    let mut height = 0;
    while level_width(tx_count, height) > 1 {
        height += 1;
    }
    height
}

struct PmtBuilder<'a> {
    txids: &'a [[u8; 32]],
    matches: &'a [bool],
    bits: Vec<bool>,
    hashes: Vec<[u8; 32]>,
}

impl PmtBuilder<'_> {
    fn width(&self, height: u32) -> u32 {
        level_width(self.txids.len() as u32, height)
    }

    fn traverse(&mut self, height: u32, pos: u32) {
        let first = pos << height;
        let last = ((pos + 1) << height).min(self.txids.len() as u32);
        let parent_of_match = (first..last).any(|i| self.matches[i as usize]);
        self.bits.push(parent_of_match);

        if height == 0 || !parent_of_match {
            // this subtree contributes a single verbatim hash
            self.hashes.push(self.node_hash(height, pos));
        } else {
            self.traverse(height - 1, pos * 2);
            if pos * 2 + 1 < self.width(height - 1) {
                self.traverse(height - 1, pos * 2 + 1);
            }
        }
    }

    fn node_hash(&self, height: u32, pos: u32) -> [u8; 32] {
        if height == 0 {
            return self.txids[pos as usize];
        }
        let left = self.node_hash(height - 1, pos * 2);
        let right = if pos * 2 + 1 < self.width(height - 1) {
            self.node_hash(height - 1, pos * 2 + 1)
        } else {
            left
        };
        hash_pair(&left, &right)
    }
}

struct PmtWalker<'a> {
    tx_count: u32,
    bits: &'a [bool],
    hashes: &'a [[u8; 32]],
    bit_pos: usize,
    hash_pos: usize,
}

impl PmtWalker<'_> {
    fn extract(&mut self, height: u32, pos: u32) -> Result<[u8; 32], FlyoverError> {
        let parent_of_match = *self
            .bits
            .get(self.bit_pos)
            .ok_or_else(|| FlyoverError::Decode("partial merkle tree flag bits exhausted".to_string()))?;
        self.bit_pos += 1;

        if height == 0 || !parent_of_match {
            let hash = self
                .hashes
                .get(self.hash_pos)
                .copied()
                .ok_or_else(|| FlyoverError::Decode("partial merkle tree hash list exhausted".to_string()))?;
            self.hash_pos += 1;
            return Ok(hash);
        }

        let left = self.extract(height - 1, pos * 2)?;
        let right = if pos * 2 + 1 < level_width(self.tx_count, height - 1) {
            self.extract(height - 1, pos * 2 + 1)?
        } else {
            left
        };
        Ok(hash_pair(&left, &right))
    }
}

/// Bitcoin wire compact-size integer.
pub(crate) fn write_compact_size(out: &mut Vec<u8>, value: u64) {
    if value < 0xFD {
        out.push(value as u8);
    } else if value <= 0xFFFF {
        out.push(0xFD);
        out.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xFFFF_FFFF {
        out.push(0xFE);
        out.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        out.push(0xFF);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

pub(crate) fn read_compact_size(input: &mut &[u8]) -> Result<u64, FlyoverError> {
    let tag = take(input, 1)?[0];
    Ok(match tag {
        0xFD => {
            let b = take(input, 2)?;
            u16::from_le_bytes([b[0], b[1]]) as u64
        }
        0xFE => {
            let b = take(input, 4)?;
            u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as u64
        }
        0xFF => {
            let b = take(input, 8)?;
            u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
        }
        small => small as u64,
    })
}

fn take<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], FlyoverError> {
    if input.len() < n {
        return Err(FlyoverError::Decode(
            "partial merkle tree truncated".to_string(),
        ));
    }
    let (head, tail) = input.split_at(n);
    *input = tail;
    Ok(head)
}

#[cfg(test)]
mod tests {
    use bitcoin::consensus::encode;
    use bitcoin::hashes::{sha256d, Hash};
    use bitcoin::merkle_tree::PartialMerkleTree;
    use bitcoin::Txid;

    use crate::merkle::testutil::synthetic_block;
    use crate::merkle::tree::merkle_root;

    use super::*;

    fn txids(count: u32) -> Vec<[u8; 32]> {
        (0..count)
            .map(|i| sha256d::Hash::hash(&i.to_le_bytes()).to_byte_array())
            .collect()
    }

    #[test]
    fn compact_size_round_trips() {
        for value in [0u64, 1, 0xFC, 0xFD, 0xFFFF, 0x1_0000, 0xFFFF_FFFF, u64::MAX] {
            let mut buf = Vec::new();
            write_compact_size(&mut buf, value);
            let mut input = buf.as_slice();
            assert_eq!(read_compact_size(&mut input).unwrap(), value);
            assert!(input.is_empty());
        }
    }

    #[test]
    fn compact_size_boundary_widths() {
        let mut buf = Vec::new();
        write_compact_size(&mut buf, 0xFC);
        assert_eq!(buf, [0xFC]);
        buf.clear();
        write_compact_size(&mut buf, 0xFD);
        assert_eq!(buf, [0xFD, 0xFD, 0x00]);
        buf.clear();
        write_compact_size(&mut buf, 0x1_0000);
        assert_eq!(buf, [0xFE, 0x00, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn recomputed_root_matches_full_tree() {
        for count in [1u32, 2, 3, 7, 1030] {
            let ids = txids(count);
            let expected_root = merkle_root(&ids).unwrap();

            for target_index in [0, (count / 2) as usize, count as usize - 1] {
                let serialized =
                    serialize_partial_merkle_tree(&ids, &ids[target_index]).unwrap();
                let root = compute_pmt_root(&serialized).unwrap();
                assert_eq!(root, expected_root, "size {count} target {target_index}");
            }
        }
    }

    #[test]
    fn serialization_is_bit_exact_with_consensus_encoding() {
        for count in [1u32, 2, 3, 7, 1030] {
            let ids = txids(count);
            let target = ids[count as usize / 2];
            let ours = serialize_partial_merkle_tree(&ids, &target).unwrap();

            let txid_objects: Vec<Txid> = ids
                .iter()
                .map(|id| Txid::from_raw_hash(sha256d::Hash::from_byte_array(*id)))
                .collect();
            let matches: Vec<bool> = ids.iter().map(|id| *id == target).collect();
            let reference = encode::serialize(&PartialMerkleTree::from_txids(
                &txid_objects,
                &matches,
            ));

            assert_eq!(ours, reference, "size {count}");
        }
    }

    #[test]
    fn single_transaction_block() {
        let ids = txids(1);
        let serialized = serialize_partial_merkle_tree(&ids, &ids[0]).unwrap();

        // ntx=1, one hash, one flag byte with the leaf bit set
        let mut expected = vec![1, 0, 0, 0, 1];
        expected.extend_from_slice(&ids[0]);
        expected.extend_from_slice(&[1, 1]);
        assert_eq!(serialized, expected);
    }

    #[test]
    fn missing_target_is_not_found() {
        let ids = txids(7);
        let absent = sha256d::Hash::hash(b"absent").to_byte_array();

        let err = serialize_partial_merkle_tree(&ids, &absent).unwrap_err();

        assert!(matches!(err, FlyoverError::NotFound(_)));
    }

    #[test]
    fn truncated_proof_is_a_decode_error() {
        let ids = txids(7);
        let serialized = serialize_partial_merkle_tree(&ids, &ids[3]).unwrap();

        let err = compute_pmt_root(&serialized[..serialized.len() - 5]).unwrap_err();

        assert!(matches!(err, FlyoverError::Decode(_)));
    }

    #[test]
    fn hash_count_above_tx_count_is_a_decode_error() {
        // ntx=1 admits exactly one hash; a second one overflows the tree.
        let mut serialized = vec![1, 0, 0, 0, 2];
        serialized.extend_from_slice(&sha256d::Hash::hash(b"a").to_byte_array());
        serialized.extend_from_slice(&sha256d::Hash::hash(b"b").to_byte_array());
        serialized.extend_from_slice(&[1, 1]);

        let err = compute_pmt_root(&serialized).unwrap_err();

        assert!(matches!(err, FlyoverError::Decode(_)));
    }

    #[test]
    fn builds_from_raw_block_bytes() {
        let block = synthetic_block(850_000, 5);
        let expected_root = block.header.merkle_root.to_raw_hash().to_byte_array();
        let target = block.txdata[3].txid().to_raw_hash().to_byte_array();
        let block_bytes = encode::serialize(&block);

        let serialized = build_partial_merkle_tree(&block_bytes, &target).unwrap();

        assert_eq!(compute_pmt_root(&serialized).unwrap(), expected_root);
    }

    #[test]
    fn malformed_block_bytes_are_a_decode_error() {
        let err = build_partial_merkle_tree(&[0xDE, 0xAD, 0xBE, 0xEF], &[0u8; 32]).unwrap_err();

        assert!(matches!(err, FlyoverError::Decode(_)));
    }
}
