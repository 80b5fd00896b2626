use bitcoin::address::{NetworkUnchecked, Payload};
use bitcoin::blockdata::opcodes::all::{
    OP_CHECKMULTISIG, OP_CSV, OP_DROP, OP_ELSE, OP_ENDIF, OP_NOTIF, OP_PUSHNUM_1,
};
use bitcoin::blockdata::opcodes::All;
use bitcoin::blockdata::script::Builder;
use bitcoin::script::PushBytesBuf;
use bitcoin::{Address, Network, ScriptBuf, ScriptHash};

use crate::error::FlyoverError;
use crate::model::FederationInfo;

// Relative timelock of the ERP escape branch, pushed as two literal bytes.
const ERP_CSV_MAINNET_TESTNET: [u8; 2] = [0xCD, 0x50];
const ERP_CSV_OTHER: [u8; 2] = [0x01, 0xF4];

/// Reconstructs the federation redeem script and checks it hashes to the
/// federation address reported on-chain.
///
/// Federations activated after the Iris height carry the plain multisig
/// script. At or below it the ERP script is attempted first and the plain
/// script is the fallback; if neither matches the known address the result
/// is [`FlyoverError::RedeemScriptMismatch`] and must not be used.
pub fn build_federation_redeem_script(
    fed_info: &FederationInfo,
    network: Network,
) -> Result<ScriptBuf, FlyoverError> {
    let expected = federation_script_hash(&fed_info.fed_address)?;
    let keys = decode_keys(&fed_info.pub_keys)?;

    if fed_info.active_fed_block_height > fed_info.iris_activation_height {
        let script = plain_multisig_script(fed_info.fed_threshold, &keys, fed_info.fed_size)?;
        return validate(script, expected, &fed_info.fed_address);
    }

    let erp_keys = decode_keys(&fed_info.erp_keys)?;
    let erp = erp_redeem_script(fed_info, &keys, &erp_keys, network)?;
    if erp.script_hash() == expected {
        return Ok(erp);
    }

    let plain = plain_multisig_script(fed_info.fed_threshold, &keys, fed_info.fed_size)?;
    validate(plain, expected, &fed_info.fed_address)
}

/// `OP_<threshold> <keys...> OP_<size> OP_CHECKMULTISIG`
fn plain_multisig_script(
    threshold: i64,
    keys: &[Vec<u8>],
    size: i64,
) -> Result<ScriptBuf, FlyoverError> {
    let mut builder = Builder::new().push_opcode(small_num_opcode(threshold)?);
    for key in keys {
        builder = push_data(builder, key.clone())?;
    }
    Ok(builder
        .push_opcode(small_num_opcode(size)?)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script())
}

/// The BIP68-style escape variant: the federation clause under `OP_NOTIF`,
/// the recovery clause behind a relative timelock under `OP_ELSE`, with a
/// single `OP_CHECKMULTISIG` shared after `OP_ENDIF`.
fn erp_redeem_script(
    fed_info: &FederationInfo,
    keys: &[Vec<u8>],
    erp_keys: &[Vec<u8>],
    network: Network,
) -> Result<ScriptBuf, FlyoverError> {
    let erp_count = erp_keys.len() as i64;
    let erp_threshold = erp_count / 2 + 1;

    let mut builder = Builder::new()
        .push_opcode(OP_NOTIF)
        .push_opcode(small_num_opcode(fed_info.fed_threshold)?);
    for key in keys {
        builder = push_data(builder, key.clone())?;
    }
    builder = builder
        .push_opcode(small_num_opcode(fed_info.fed_size)?)
        .push_opcode(OP_ELSE);
    builder = push_data(builder, erp_csv_bytes(network).to_vec())?;
    builder = builder
        .push_opcode(OP_CSV)
        .push_opcode(OP_DROP)
        .push_opcode(small_num_opcode(erp_threshold)?);
    for key in erp_keys {
        builder = push_data(builder, key.clone())?;
    }
    Ok(builder
        .push_opcode(small_num_opcode(erp_count)?)
        .push_opcode(OP_ENDIF)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script())
}

fn erp_csv_bytes(network: Network) -> [u8; 2] {
    match network {
        Network::Bitcoin | Network::Testnet => ERP_CSV_MAINNET_TESTNET,
        _ => ERP_CSV_OTHER,
    }
}

fn validate(
    script: ScriptBuf,
    expected: ScriptHash,
    address: &str,
) -> Result<ScriptBuf, FlyoverError> {
    if script.script_hash() == expected {
        Ok(script)
    } else {
        Err(FlyoverError::RedeemScriptMismatch {
            address: address.to_string(),
        })
    }
}

fn federation_script_hash(address: &str) -> Result<ScriptHash, FlyoverError> {
    let parsed = address.parse::<Address<NetworkUnchecked>>()?;
    match parsed.payload {
        Payload::ScriptHash(hash) => Ok(hash),
        _ => Err(FlyoverError::Decode(format!(
            "federation address {address} is not P2SH"
        ))),
    }
}

fn decode_keys(keys: &[String]) -> Result<Vec<Vec<u8>>, FlyoverError> {
    keys.iter().map(|key| Ok(hex::decode(key)?)).collect()
}

// This federation size range never needs a generic numeric push.
fn small_num_opcode(n: i64) -> Result<All, FlyoverError> {
    if !(1..=16).contains(&n) {
        return Err(FlyoverError::Decode(format!(
            "multisig count {n} outside the OP_1..OP_16 range"
        )));
    }
    Ok(All::from(OP_PUSHNUM_1.to_u8() + (n as u8 - 1)))
}

fn push_data(builder: Builder, bytes: Vec<u8>) -> Result<Builder, FlyoverError> {
    let data = PushBytesBuf::try_from(bytes)
        .map_err(|_| FlyoverError::Decode("script push exceeds maximum size".to_string()))?;
    Ok(builder.push_slice(data))
}

#[cfg(test)]
mod tests {
    use bitcoin::{Address, Network};

    use super::*;

    const KEY_1: &str = "02cd53fc53a07f211641a677d250f6de99caf620e8e77071e811a28b3bcddf0be1";
    const KEY_2: &str = "0362634ab57dae9cb373a5d536e66a8c4f67468bbcfb063809bab643072d78a124";
    const KEY_3: &str = "03c5946b3fbae03a654237da863c9ed534e0878657175b132b8ca630f245df04db";

    fn federation(fed_address: String, active_height: i64, iris_height: i64) -> FederationInfo {
        FederationInfo {
            fed_threshold: 2,
            fed_size: 3,
            pub_keys: vec![KEY_1.to_string(), KEY_2.to_string(), KEY_3.to_string()],
            fed_address,
            active_fed_block_height: active_height,
            iris_activation_height: iris_height,
            erp_keys: vec![KEY_1.to_string(), KEY_2.to_string()],
        }
    }

    fn expected_plain_script() -> Vec<u8> {
        hex::decode(format!("5221{KEY_1}21{KEY_2}21{KEY_3}53ae")).unwrap()
    }

    fn expected_erp_script(csv: &[u8; 2]) -> Vec<u8> {
        let mut script = vec![0x64, 0x52]; // OP_NOTIF OP_2
        for key in [KEY_1, KEY_2, KEY_3] {
            script.push(0x21);
            script.extend_from_slice(&hex::decode(key).unwrap());
        }
        script.push(0x53); // OP_3
        script.push(0x67); // OP_ELSE
        script.push(0x02);
        script.extend_from_slice(csv);
        script.push(0xb2); // OP_CHECKSEQUENCEVERIFY
        script.push(0x75); // OP_DROP
        script.push(0x52); // erp threshold = 2 of 2
        for key in [KEY_1, KEY_2] {
            script.push(0x21);
            script.extend_from_slice(&hex::decode(key).unwrap());
        }
        script.push(0x52);
        script.push(0x68); // OP_ENDIF
        script.push(0xae); // OP_CHECKMULTISIG
        script
    }

    fn p2sh_of(script: &[u8], network: Network) -> String {
        Address::p2sh(bitcoin::Script::from_bytes(script), network)
            .unwrap()
            .to_string()
    }

    #[test]
    fn plain_policy_after_iris_activation() {
        let address = p2sh_of(&expected_plain_script(), Network::Testnet);
        let fed = federation(address, 101, 100);

        let script = build_federation_redeem_script(&fed, Network::Testnet).unwrap();

        assert_eq!(script.as_bytes(), expected_plain_script().as_slice());
    }

    #[test]
    fn erp_policy_attempted_first_at_iris_boundary() {
        let expected = expected_erp_script(&ERP_CSV_MAINNET_TESTNET);
        let address = p2sh_of(&expected, Network::Testnet);
        let fed = federation(address, 100, 100);

        let script = build_federation_redeem_script(&fed, Network::Testnet).unwrap();

        assert_eq!(script.as_bytes(), expected.as_slice());
    }

    #[test]
    fn falls_back_to_plain_policy_when_erp_does_not_match() {
        let address = p2sh_of(&expected_plain_script(), Network::Testnet);
        let fed = federation(address, 100, 100);

        let script = build_federation_redeem_script(&fed, Network::Testnet).unwrap();

        assert_eq!(script.as_bytes(), expected_plain_script().as_slice());
    }

    #[test]
    fn mismatch_on_both_policies_is_terminal() {
        // address of an unrelated script, so neither policy can match
        let address = p2sh_of(&[0x51], Network::Testnet);
        let fed = federation(address.clone(), 100, 100);

        let err = build_federation_redeem_script(&fed, Network::Testnet).unwrap_err();

        assert!(matches!(
            err,
            FlyoverError::RedeemScriptMismatch { address: a } if a == address
        ));
    }

    #[test]
    fn csv_constant_per_network() {
        for network in [Network::Bitcoin, Network::Testnet] {
            let script = expected_erp_script(&ERP_CSV_MAINNET_TESTNET);
            let address = p2sh_of(&script, network);
            let fed = federation(address, 100, 100);
            let built = build_federation_redeem_script(&fed, network).unwrap();
            assert!(windows_contain(built.as_bytes(), &[0x67, 0x02, 0xCD, 0x50, 0xb2, 0x75]));
        }
        for network in [Network::Regtest, Network::Signet] {
            let script = expected_erp_script(&ERP_CSV_OTHER);
            let address = p2sh_of(&script, network);
            let fed = federation(address, 100, 100);
            let built = build_federation_redeem_script(&fed, network).unwrap();
            assert!(windows_contain(built.as_bytes(), &[0x67, 0x02, 0x01, 0xF4, 0xb2, 0x75]));
        }
    }

    fn windows_contain(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn malformed_key_hex_is_a_decode_error() {
        let address = p2sh_of(&expected_plain_script(), Network::Testnet);
        let mut fed = federation(address, 101, 100);
        fed.pub_keys[1] = "zzzz".to_string();

        let err = build_federation_redeem_script(&fed, Network::Testnet).unwrap_err();

        assert!(matches!(err, FlyoverError::Decode(_)));
    }

    #[test]
    fn malformed_federation_address_is_a_decode_error() {
        let fed = federation("not-an-address".to_string(), 101, 100);

        let err = build_federation_redeem_script(&fed, Network::Testnet).unwrap_err();

        assert!(matches!(err, FlyoverError::Decode(_)));
    }

    #[test]
    fn non_p2sh_federation_address_is_a_decode_error() {
        // a P2WPKH address has no script hash to validate against
        let fed = federation(
            "bcrt1qxuds94z3pqwqea2p4f4ev4f25s6uu7y3avljrl".to_string(),
            101,
            100,
        );

        let err = build_federation_redeem_script(&fed, Network::Regtest).unwrap_err();

        assert!(matches!(err, FlyoverError::Decode(_)));
    }

    #[test]
    fn rejects_federation_size_beyond_small_opcodes() {
        let address = p2sh_of(&expected_plain_script(), Network::Testnet);
        let mut fed = federation(address, 101, 100);
        fed.fed_size = 17;

        let err = build_federation_redeem_script(&fed, Network::Testnet).unwrap_err();

        assert!(matches!(err, FlyoverError::Decode(_)));
    }
}
