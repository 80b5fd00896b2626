//! Bitcoin proof and address derivation engine for the Flyover bridge.
//!
//! The pure core reconstructs federation redeem scripts ([`federation`]),
//! derives per-quote hash-locked deposit addresses ([`derivation`]) and
//! builds the SPV proof material the RSK bridge contract verifies
//! ([`merkle`]). The `native` feature adds the Esplora data-provider client
//! and the async service orchestrating fetch-then-build ([`rpc`],
//! [`service`]).

pub mod derivation;
pub mod error;
pub mod federation;
pub mod merkle;
pub mod model;

#[cfg(feature = "native")]
pub mod rpc;
#[cfg(feature = "native")]
pub mod service;

pub use error::FlyoverError;
