/*
    Full Bitcoin transaction tree hashing.

    1- Nodes combine with sha256d over the concatenated pair
    2- A level of odd cardinality duplicates its last node
      From bitcoin-core:
       The reason is that if the number of hashes in the list at a given level
       is odd, the last one is duplicated before computing the next level
       (which is unusual in Merkle trees). This results in certain sequences
       of transactions leading to the same merkle root. For example, these
       two trees:

                    A               A
                  /  \            /   \
                B     C         B       C
               / \    |        / \     / \
              D   E   F       D   E   F   F
             / \ / \ / \     / \ / \ / \ / \
             1 2 3 4 5 6     1 2 3 4 5 6 5 6

    3- Leaves are txids (or wtxids) in internal byte order, [u8; 32]
*/
use bitcoin::hashes::{sha256d, Hash};

/// sha256d of `left || right`, the node combiner for Bitcoin trees.
pub(crate) fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(left);
    data[32..].copy_from_slice(right);
    sha256d::Hash::hash(&data).to_byte_array()
}

/// Root of the full tree over `leaves`, in internal byte order.
/// `None` for an empty leaf set.
pub fn merkle_root(leaves: &[[u8; 32]]) -> Option<[u8; 32]> {
    if leaves.is_empty() {
        return None;
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level.first().copied()
}

fn next_level(hashes: &[[u8; 32]]) -> Vec<[u8; 32]> {
    let mut next = Vec::with_capacity((hashes.len() + 1) / 2);
    for pair in hashes.chunks(2) {
        let left = &pair[0];
        let right = pair.get(1).unwrap_or(left);
        next.push(hash_pair(left, right));
    }
    next
}
