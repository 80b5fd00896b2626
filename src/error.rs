use thiserror::Error;

/// Failure taxonomy for the proof and derivation core.
///
/// `NotConfirmed` is the single retryable condition: the transaction exists
/// but has no containing block yet, so callers poll instead of aborting.
/// Everything else is terminal for the call that produced it.
#[derive(Error, Debug)]
pub enum FlyoverError {
    #[error("malformed input: {0}")]
    Decode(String),

    #[error("reconstructed redeem script does not hash to federation address {address}")]
    RedeemScriptMismatch { address: String },

    #[error("transaction {0} is not confirmed yet")]
    NotConfirmed(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl From<hex::FromHexError> for FlyoverError {
    fn from(e: hex::FromHexError) -> Self {
        FlyoverError::Decode(format!("invalid hex: {e}"))
    }
}

impl From<bitcoin::consensus::encode::Error> for FlyoverError {
    fn from(e: bitcoin::consensus::encode::Error) -> Self {
        FlyoverError::Decode(format!("invalid consensus encoding: {e}"))
    }
}

impl From<bitcoin::address::Error> for FlyoverError {
    fn from(e: bitcoin::address::Error) -> Self {
        FlyoverError::Decode(format!("invalid address: {e}"))
    }
}
