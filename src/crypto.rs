//! Keccak-256 digest and difficulty checks
//!
//! The hash is the original Keccak-256 the EVM's `KECCAK256` opcode computes,
//! not the standardized SHA3-256 (the two differ only in padding, which is
//! enough to break agreement with the verifying contract).

use crate::abi::WORD_SIZE;
use crate::{Difficulty, SenderNonce, TrialNonce};
use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolValue;
use byteorder::{BigEndian, ByteOrder};

/// Keccak-256 of the given bytes
pub fn keccak256(data: impl AsRef<[u8]>) -> B256 {
    alloy_primitives::keccak256(data)
}

/// Number of leading zero bits of a hash read as a big-endian integer
pub fn leading_zero_bits(hash: &B256) -> u32 {
    let mut bits = 0;
    for byte in hash.iter() {
        if *byte == 0 {
            bits += 8;
        } else {
            return bits + byte.leading_zeros();
        }
    }
    bits
}

/// `keccak256(abi.encode(sender, senderNonce, trialNonce))` over the full
/// `uint256` trial nonce range
pub fn hashcash_hash(sender: Address, sender_nonce: SenderNonce, trial_nonce: U256) -> B256 {
    keccak256((sender, sender_nonce.value(), trial_nonce).abi_encode_params())
}

/// Check `hash < 2^(256 - difficulty)`
///
/// Equivalent to requiring `difficulty` leading zero bits; difficulty 0
/// accepts every hash.
pub fn meets_difficulty(hash: &B256, difficulty: Difficulty) -> bool {
    leading_zero_bits(hash) >= u32::from(difficulty.bits())
}

/// Reusable hasher for the hashcash preimage
///
/// Holds `abi.encode(sender, senderNonce, trialNonce)` and rewrites only the
/// trial nonce word between hashes.
#[derive(Debug, Clone)]
pub struct KeccakHasher {
    preimage: Vec<u8>,
}

impl KeccakHasher {
    /// Encoded preimage size: three words
    pub const PREIMAGE_SIZE: usize = 3 * WORD_SIZE;

    /// Create a hasher for one sender and sender nonce
    pub fn new(sender: Address, sender_nonce: SenderNonce) -> Self {
        let preimage = (sender, sender_nonce.value(), U256::ZERO).abi_encode_params();
        Self { preimage }
    }

    /// Write the trial nonce into the last word
    pub fn inject_trial_nonce(&mut self, trial_nonce: TrialNonce) {
        // upper 24 bytes of the word stay zero
        BigEndian::write_u64(&mut self.preimage[Self::PREIMAGE_SIZE - 8..], trial_nonce.value());
    }

    /// Current preimage bytes
    pub fn preimage(&self) -> &[u8] {
        &self.preimage
    }

    /// Hash the preimage for the given trial nonce
    pub fn hash(&mut self, trial_nonce: TrialNonce) -> B256 {
        self.inject_trial_nonce(trial_nonce);
        keccak256(&self.preimage)
    }

    /// Hash and check against a difficulty
    pub fn hash_and_check(&mut self, trial_nonce: TrialNonce, difficulty: Difficulty) -> (bool, B256) {
        let hash = self.hash(trial_nonce);
        (meets_difficulty(&hash, difficulty), hash)
    }
}
