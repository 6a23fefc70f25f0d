//! Off-chain mirror of the paymaster's approval check
//!
//! Rejections carry the same revert reasons the contract uses, so a request
//! can be checked before it is relayed.

use crate::crypto::{hashcash_hash, meets_difficulty};
use crate::{ApprovalPayload, Difficulty, RelayRequestIdentity, Solution};
use thiserror::Error;

/// Reason approval data would be rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Approval data is not exactly two words
    #[error("no hash in approvalData")]
    MissingHash,

    /// Hash does not match the request (includes a stale sender nonce)
    #[error("wrong hash")]
    WrongHash,

    /// Hash is above the difficulty target
    #[error("difficulty not met")]
    DifficultyNotMet,
}

/// Check approval data against a relay request and required difficulty
///
/// The trial nonce is hashed as a full `uint256`, so payloads the search
/// would never produce are still accepted when the contract would.
pub fn verify(
    approval_data: &[u8],
    request: &RelayRequestIdentity,
    required: Difficulty,
) -> Result<ApprovalPayload, Rejection> {
    if approval_data.len() != Solution::APPROVAL_DATA_SIZE {
        return Err(Rejection::MissingHash);
    }
    let payload = ApprovalPayload::decode(approval_data).map_err(|_| Rejection::MissingHash)?;

    if hashcash_hash(request.sender, request.sender_nonce, payload.trial_nonce) != payload.hash {
        return Err(Rejection::WrongHash);
    }
    if !meets_difficulty(&payload.hash, required) {
        return Err(Rejection::DifficultyNotMet);
    }
    Ok(payload)
}
