use bitcoin::blockdata::opcodes::all::{OP_DROP, OP_PUSHBYTES_32};
use bitcoin::{Address, Network, ScriptBuf};

use crate::error::FlyoverError;
use crate::model::{FlyoverDerivation, FlyoverDerivationArgs};

/// Computes the 32-byte value that binds a quote to its deposit address.
///
/// The concrete hash is owned by the RSK side of the protocol; this core
/// only relies on its contract: 32 bytes, deterministic over the quote
/// identity and the three addresses.
pub trait DerivationValueSource {
    fn derive_value(
        &self,
        quote_hash: &[u8; 32],
        lbc_address: &[u8],
        user_btc_refund_address: &[u8],
        lp_btc_address: &[u8],
    ) -> [u8; 32];
}

/// Wraps the federation redeem script with a per-quote derivation value and
/// encodes the result as a P2SH deposit address.
///
/// The script is `PUSH32 <derivation value> OP_DROP <federation script>`:
/// the value is discarded from the stack before the federation clause runs,
/// so funds stay spendable only by the federation while every distinct
/// derivation value yields a distinct watched address. Pure function; the
/// caller supplies the active redeem script already fetched from the bridge.
pub fn derive_flyover_address(
    fed_redeem_script: &[u8],
    derivation_value: &[u8; 32],
    network: Network,
) -> Result<FlyoverDerivation, FlyoverError> {
    let mut script_bytes = Vec::with_capacity(34 + fed_redeem_script.len());
    script_bytes.push(OP_PUSHBYTES_32.to_u8());
    script_bytes.extend_from_slice(derivation_value);
    script_bytes.push(OP_DROP.to_u8());
    script_bytes.extend_from_slice(fed_redeem_script);

    let script = ScriptBuf::from_bytes(script_bytes);
    let address = Address::p2sh(&script, network)
        .map_err(|e| FlyoverError::Decode(format!("flyover script not encodable as P2SH: {e}")))?;

    Ok(FlyoverDerivation {
        address: address.to_string(),
        redeem_script: hex::encode(script.as_bytes()),
    })
}

/// Quote-level convenience: computes the derivation value through the
/// injected hasher and derives the deposit address from it.
pub fn derive_for_quote(
    args: &FlyoverDerivationArgs,
    fed_redeem_script: &[u8],
    network: Network,
    hasher: &impl DerivationValueSource,
) -> Result<FlyoverDerivation, FlyoverError> {
    let value = hasher.derive_value(
        &args.quote_hash,
        &args.lbc_address,
        &args.user_btc_refund_address,
        &args.lp_btc_address,
    );
    derive_flyover_address(fed_redeem_script, &value, network)
}
