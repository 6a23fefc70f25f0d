//! ABI byte encoding
//!
//! Canonical 32-byte word encoding of the values the verifying contracts hash
//! and the read-only calls take. Layout is delegated to `alloy-dyn-abi`; this
//! module restricts it to the supported type set and is strict about ranges:
//! a value that does not fit its declared type, or an encoding that is not
//! canonical, is an [`Error::Encoding`]. Nothing is ever truncated.
//!
//! The contract calls themselves are declared once with `sol!` in
//! [`contracts`].

use crate::{Error, Result};
use alloy_primitives::{keccak256, Selector, B256};

pub use alloy_dyn_abi::{DynSolType as AbiType, DynSolValue as AbiValue};

/// Size of one ABI word in bytes
pub const WORD_SIZE: usize = 32;

/// Read-only and proxy calls of the collaborating contracts
pub mod contracts {
    use alloy_sol_types::sol;

    sol! {
        /// Paymaster that verifies hashcash approval data
        interface IHashcashPaymaster {
            function difficulty() external view returns (uint256);
        }

        /// Trusted forwarder tracking replay-protection nonces
        interface IForwarder {
            function getNonce(address from) external view returns (uint256);
        }

        /// Factory deploying proxy identities with CREATE2
        interface IProxyFactory {
            function calculateAddress(address owner) external view returns (address);
        }

        /// Proxy identity forwarding calls from its owner
        interface IProxyIdentity {
            function execute(uint256 operationType, address to, uint256 value, bytes data) external;
        }
    }
}

/// Encode an ordered list of typed values as a top-level tuple
pub fn encode(params: &[(AbiType, AbiValue)]) -> Result<Vec<u8>> {
    let values = params
        .iter()
        .map(|(ty, value)| typed_value(ty, value))
        .collect::<Result<Vec<_>>>()?;
    Ok(AbiValue::Tuple(values).abi_encode_params())
}

/// Decode a top-level tuple of the given types
///
/// Only canonical encodings are accepted: exact length, zero padding and
/// values within their declared width.
pub fn decode(data: &[u8], types: &[AbiType]) -> Result<Vec<AbiValue>> {
    types.iter().try_for_each(check_supported)?;

    let tuple = AbiType::Tuple(types.to_vec());
    let decoded = tuple
        .abi_decode_params(data)
        .map_err(|e| Error::encoding(format!("invalid encoding of {tuple}: {e}")))?;
    let AbiValue::Tuple(values) = decoded else {
        return Err(Error::encoding(format!("{tuple} did not decode to a tuple")));
    };

    let values = types
        .iter()
        .zip(&values)
        .map(|(ty, value)| typed_value(ty, value))
        .collect::<Result<Vec<_>>>()?;

    let canonical = AbiValue::Tuple(values.clone()).abi_encode_params();
    if canonical != data {
        return Err(Error::encoding(format!(
            "non-canonical encoding of {tuple}: {} bytes, canonical form has {}",
            data.len(),
            canonical.len()
        )));
    }
    Ok(values)
}

/// Function selector: first four bytes of the signature's Keccak-256 digest
pub fn selector(signature: &str) -> Selector {
    Selector::from_slice(&keccak256(signature.as_bytes())[..4])
}

/// Encode a contract call: selector followed by the encoded arguments
pub fn encode_call(signature: &str, params: &[(AbiType, AbiValue)]) -> Result<Vec<u8>> {
    let mut call = selector(signature).to_vec();
    call.extend_from_slice(&encode(params)?);
    Ok(call)
}

/// Parse a textual value for the given type
///
/// Addresses and byte strings are hex; integers are decimal, or hex when
/// `0x`-prefixed.
pub fn parse_value(ty: &AbiType, text: &str) -> Result<AbiValue> {
    check_supported(ty)?;
    let value = ty
        .coerce_str(text.trim())
        .map_err(|e| Error::encoding(format!("invalid {ty} value `{text}`: {e}")))?;
    typed_value(ty, &value)
}

/// Parse a type name from the supported set
pub fn parse_type(name: &str) -> Result<AbiType> {
    let ty = AbiType::parse(name).map_err(|e| Error::encoding(format!("unknown ABI type `{name}`: {e}")))?;
    check_supported(&ty)?;
    Ok(ty)
}

fn check_supported(ty: &AbiType) -> Result<()> {
    match *ty {
        AbiType::Address | AbiType::Bytes => Ok(()),
        AbiType::Uint(bits) if bits > 0 && bits <= 256 && bits % 8 == 0 => Ok(()),
        AbiType::FixedBytes(len) if len > 0 && len <= WORD_SIZE => Ok(()),
        _ => Err(Error::encoding(format!("unsupported ABI type {ty}"))),
    }
}

/// Check `value` against `ty` and tag it with the declared width
fn typed_value(ty: &AbiType, value: &AbiValue) -> Result<AbiValue> {
    check_supported(ty)?;
    match (ty, value) {
        (AbiType::Address, AbiValue::Address(address)) => Ok(AbiValue::Address(*address)),
        (AbiType::Uint(bits), AbiValue::Uint(v, _)) => {
            if v.bit_len() > *bits {
                return Err(Error::encoding(format!("value {v} overflows uint{bits}")));
            }
            Ok(AbiValue::Uint(*v, *bits))
        }
        (AbiType::FixedBytes(len), AbiValue::FixedBytes(word, size)) => {
            if size != len || word[*len..].iter().any(|&b| b != 0) {
                return Err(Error::encoding(format!("value is not a bytes{len}")));
            }
            Ok(AbiValue::FixedBytes(*word, *len))
        }
        (AbiType::Bytes, AbiValue::Bytes(bytes)) => Ok(AbiValue::Bytes(bytes.clone())),
        (ty, value) => Err(Error::encoding(format!(
            "type mismatch: expected {ty}, got {} value",
            value.sol_type_name().unwrap_or_default()
        ))),
    }
}

/// A `bytesN` value from its leading bytes
pub fn fixed_bytes(bytes: &[u8]) -> Result<AbiValue> {
    if bytes.is_empty() || bytes.len() > WORD_SIZE {
        return Err(Error::encoding(format!("{} bytes do not fit a bytesN", bytes.len())));
    }
    Ok(AbiValue::FixedBytes(B256::right_padding_from(bytes), bytes.len()))
}
