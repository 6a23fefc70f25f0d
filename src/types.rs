//! Core types for hashcash approval
//!
//! Fundamental values shared by the search engine, the address derivator and
//! the approval builder, with validation, ABI word encoding and JSON
//! serialization.

use crate::abi::WORD_SIZE;
use crate::{Error, Result};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Required number of leading zero bits of a solution hash
///
/// Always in `[0, 256)`: a solution must satisfy `hash < 2^(256 - difficulty)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Difficulty(u8);

impl Difficulty {
    /// Hardest representable difficulty
    pub const MAX: Self = Self(u8::MAX);

    /// Create a new difficulty
    pub const fn new(bits: u8) -> Self {
        Self(bits)
    }

    /// Get the number of required leading zero bits
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Expected number of hash evaluations to meet this difficulty
    pub fn expected_hashes(&self) -> f64 {
        2f64.powi(i32::from(self.0))
    }
}

impl TryFrom<U256> for Difficulty {
    type Error = Error;

    fn try_from(value: U256) -> Result<Self> {
        u8::try_from(value)
            .map(Self)
            .map_err(|_| Error::encoding(format!("difficulty {value} is out of range [0, 256)")))
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hashcash trial counter, starts at zero and only moves forward
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrialNonce(u64);

impl TrialNonce {
    /// Create a new trial nonce
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the nonce value
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Increment nonce
    pub fn increment(&mut self) {
        self.0 += 1;
    }
}

impl fmt::Display for TrialNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Replay-protection nonce tracked by the trusted forwarder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SenderNonce(U256);

impl SenderNonce {
    /// Create a new sender nonce
    pub const fn new(value: U256) -> Self {
        Self(value)
    }

    /// Get the nonce value
    pub fn value(&self) -> U256 {
        self.0
    }
}

impl From<u64> for SenderNonce {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl fmt::Display for SenderNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// CREATE2 salt, always a full 32-byte big-endian word
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Salt(B256);

impl Salt {
    /// The zero salt
    pub const ZERO: Self = Self(B256::ZERO);

    /// Create a salt from a raw word
    pub const fn new(word: B256) -> Self {
        Self(word)
    }

    /// Get the salt word
    pub fn as_b256(&self) -> &B256 {
        &self.0
    }

    /// Get the salt bytes
    pub fn as_bytes(&self) -> &[u8; WORD_SIZE] {
        &self.0 .0
    }
}

impl From<u64> for Salt {
    fn from(value: u64) -> Self {
        Self::from(U256::from(value))
    }
}

impl From<U256> for Salt {
    fn from(value: U256) -> Self {
        Self(B256::from(value.to_be_bytes::<WORD_SIZE>()))
    }
}

impl fmt::Display for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A hashcash solution: the hash found and the trial nonce that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Solution {
    /// `keccak256(abi.encode(sender, senderNonce, trialNonce))`
    pub hash: B256,
    /// Trial nonce of the solution
    pub trial_nonce: TrialNonce,
}

impl Solution {
    /// Encoded approval data size: `(bytes32, uint256)`
    pub const APPROVAL_DATA_SIZE: usize = 2 * WORD_SIZE;

    /// Create a new solution
    pub fn new(hash: B256, trial_nonce: TrialNonce) -> Self {
        Self { hash, trial_nonce }
    }

    /// ABI-encoded `(bytes32 hash, uint256 trialNonce)` approval data
    pub fn approval_data(&self) -> Bytes {
        ApprovalPayload::from(*self).encode()
    }

    /// Decode approval data produced by [`Solution::approval_data`]
    pub fn from_approval_data(data: &[u8]) -> Result<Self> {
        let payload = ApprovalPayload::decode(data)?;
        payload
            .solution()
            .ok_or_else(|| Error::encoding(format!("trial nonce {} out of range", payload.trial_nonce)))
    }
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}@{}", self.hash, self.trial_nonce)
    }
}

/// Decoded approval data, `(bytes32 hash, uint256 trialNonce)`
///
/// Unlike [`Solution`] the trial nonce spans the full `uint256` range the
/// verifying contract accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalPayload {
    pub hash: B256,
    pub trial_nonce: U256,
}

impl ApprovalPayload {
    /// Decode exactly two canonical words
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != Solution::APPROVAL_DATA_SIZE {
            return Err(Error::encoding(format!(
                "approval data must be {} bytes, got {}",
                Solution::APPROVAL_DATA_SIZE,
                data.len()
            )));
        }
        let (hash, trial_nonce) = <(B256, U256)>::abi_decode_params(data)
            .map_err(|e| Error::encoding(format!("approval data is not (bytes32, uint256): {e}")))?;
        Ok(Self { hash, trial_nonce })
    }

    /// Encoded approval data
    pub fn encode(&self) -> Bytes {
        (self.hash, self.trial_nonce).abi_encode_params().into()
    }

    /// The payload as a search solution, when the trial nonce fits
    pub fn solution(&self) -> Option<Solution> {
        u64::try_from(self.trial_nonce)
            .ok()
            .map(|trial_nonce| Solution::new(self.hash, TrialNonce::new(trial_nonce)))
    }
}

impl From<Solution> for ApprovalPayload {
    fn from(solution: Solution) -> Self {
        Self {
            hash: solution.hash,
            trial_nonce: U256::from(solution.trial_nonce.value()),
        }
    }
}

/// Sender identity of an outgoing relay request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelayRequestIdentity {
    /// Address of the original sender
    pub sender: Address,
    /// Sender nonce the forwarder will check
    pub sender_nonce: SenderNonce,
}

impl RelayRequestIdentity {
    /// Create a new relay request identity
    pub fn new(sender: Address, sender_nonce: SenderNonce) -> Self {
        Self {
            sender,
            sender_nonce,
        }
    }
}

/// An outgoing call before proxy routing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayedCall {
    /// Signer of the call
    pub from: Address,
    /// Call target
    pub to: Address,
    /// Call data
    pub data: Bytes,
}

impl RelayedCall {
    /// Create a new relayed call
    pub fn new(from: Address, to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            from,
            to,
            data: data.into(),
        }
    }
}

/// Parse a `0x`-prefixed (or bare) 40 hex digit address, any case
pub fn parse_address(s: &str) -> Result<Address> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.len() != 40 {
        return Err(Error::encoding(format!(
            "Invalid address length: expected 40 hex chars, got {}",
            digits.len()
        )));
    }
    let bytes = hex::decode(digits).map_err(|e| Error::encoding(format!("Invalid hex in address: {e}")))?;
    Ok(Address::from_slice(&bytes))
}

/// Canonical lowercase `0x`-prefixed address
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

impl FromStr for Difficulty {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bits: u16 = s
            .trim()
            .parse()
            .map_err(|e| Error::invalid_parameter(format!("Invalid difficulty: {e}")))?;
        u8::try_from(bits)
            .map(Self)
            .map_err(|_| Error::invalid_parameter("Difficulty must be 0-255"))
    }
}
