use crate::error::FlyoverError;
use crate::model::MerkleBranch;

/// Reshapes the data provider's simplified merkle proof into the branch the
/// pegout refund registration consumes.
///
/// Trust-boundary pass-through: hashes are carried in the order and
/// orientation the provider reports them and the path is the position as
/// given. No root is recomputed here.
pub fn to_merkle_branch(hashes: &[String], position: u64) -> Result<MerkleBranch, FlyoverError> {
    let mut decoded = Vec::with_capacity(hashes.len());
    for hash in hashes {
        let bytes = hex::decode(hash)?;
        let hash: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            FlyoverError::Decode(format!("merkle branch hash {hash} is not 32 bytes"))
        })?;
        decoded.push(hash);
    }
    Ok(MerkleBranch {
        hashes: decoded,
        path: position,
    })
}
