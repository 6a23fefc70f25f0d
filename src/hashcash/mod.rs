//! Hashcash search engine
//!
//! Finds the smallest trial nonce whose
//! `keccak256(abi.encode(sender, senderNonce, trialNonce))` has the required
//! number of leading zero bits, exactly as the verifying paymaster recomputes
//! it on-chain.
//!
//! The search is a tight CPU-bound loop. Its only suspension point is the
//! optional [`Checkpoint`], polled every `checkpoint_interval` unsuccessful
//! trials, which can report progress, yield to the runtime or abort.

use crate::crypto::KeccakHasher;
use crate::types::format_address;
use crate::utils::{format_duration, format_hash_rate};
use crate::{Difficulty, Error, Result, SenderNonce, Solution, TrialNonce};
use alloy_primitives::Address;
use std::num::NonZeroU64;
use std::time::{Duration, Instant};
use tracing::{debug, info, Instrument, Span};

pub mod checkpoint;
pub mod pool;
pub mod verify;

pub use checkpoint::{checkpoint_fn, CancellationCheckpoint, Checkpoint, FnCheckpoint, SearchProgress, StatsCheckpoint};
pub use pool::SearchPool;
pub use verify::{verify, Rejection};

/// Statistics of a search
#[derive(Debug, Clone, Default)]
pub struct SearchStats {
    /// Total hashes computed
    pub total_hashes: u64,
    /// Number of checkpoints reached
    pub checkpoints: u64,
    /// Time spent searching
    pub elapsed: Duration,
    /// Average hash rate (hashes per second)
    pub hash_rate: f64,
}

/// Checkpoint interval used by searches that must stay cancellable
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 10_000;

/// Inputs of a search, captured once at start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchParams {
    /// Sender address
    pub sender: Address,
    /// Sender nonce the solution is bound to
    pub sender_nonce: SenderNonce,
    /// Required difficulty
    pub difficulty: Difficulty,
    checkpoint_interval: Option<NonZeroU64>,
}

impl SearchParams {
    /// Create search parameters without checkpoints
    pub fn new(sender: Address, sender_nonce: SenderNonce, difficulty: Difficulty) -> Self {
        Self {
            sender,
            sender_nonce,
            difficulty,
            checkpoint_interval: None,
        }
    }

    /// Poll the checkpoint every `interval` unsuccessful trials
    pub fn with_checkpoint_interval(mut self, interval: u64) -> Result<Self> {
        let interval = NonZeroU64::new(interval)
            .ok_or_else(|| Error::invalid_parameter("Checkpoint interval must be greater than 0"))?;
        self.checkpoint_interval = Some(interval);
        Ok(self)
    }

    /// Get the checkpoint interval
    pub fn checkpoint_interval(&self) -> Option<u64> {
        self.checkpoint_interval.map(NonZeroU64::get)
    }
}

/// One hashcash search with its own trial counter
///
/// Trial nonces are scanned in increasing order from zero, so the first
/// solution found is the smallest one. Calling [`HashcashSearch::run`] again
/// after an abort resumes at the next untried nonce.
#[derive(Debug, Clone)]
pub struct HashcashSearch {
    params: SearchParams,
    hasher: KeccakHasher,
    trial_nonce: TrialNonce,
    iterations: u64,
    since_checkpoint: u64,
    checkpoints: u64,
    elapsed: Duration,
}

impl HashcashSearch {
    /// Create a new search
    pub fn new(params: SearchParams) -> Self {
        Self {
            hasher: KeccakHasher::new(params.sender, params.sender_nonce),
            params,
            trial_nonce: TrialNonce::default(),
            iterations: 0,
            since_checkpoint: 0,
            checkpoints: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Get the search parameters
    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    /// Number of hashes computed so far
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Number of checkpoints reached so far
    pub fn checkpoints(&self) -> u64 {
        self.checkpoints
    }

    /// Next trial nonce to try
    pub fn next_trial_nonce(&self) -> TrialNonce {
        self.trial_nonce
    }

    /// Current search statistics
    pub fn stats(&self) -> SearchStats {
        SearchStats {
            total_hashes: self.iterations,
            checkpoints: self.checkpoints,
            elapsed: self.elapsed,
            hash_rate: compute_hash_rate(self.iterations, self.elapsed),
        }
    }

    /// Run until a solution is found or the checkpoint aborts
    ///
    /// Returns `None` only when the checkpoint asked to stop. Without a
    /// checkpoint the search cannot be aborted and has no time bound.
    pub async fn run(&mut self, checkpoint: Option<&mut dyn Checkpoint>) -> Option<Solution> {
        let span = search_span(&self.params);
        self.run_inner(checkpoint).instrument(span).await
    }

    /// Run to completion on the current thread, without checkpoints
    pub fn solve(&mut self) -> Solution {
        let started = Instant::now();
        let solution = loop {
            if let Some(solution) = self.step() {
                break solution;
            }
        };
        self.elapsed += started.elapsed();
        solution
    }

    async fn run_inner(&mut self, mut checkpoint: Option<&mut dyn Checkpoint>) -> Option<Solution> {
        let difficulty = self.params.difficulty;
        let mut started = Instant::now();

        debug!(
            "Starting hashcash search at trial nonce {} (expected {} hashes)",
            self.trial_nonce,
            difficulty.expected_hashes()
        );

        loop {
            if let Some(solution) = self.step() {
                self.elapsed += started.elapsed();
                if let Some(checkpoint) = checkpoint.as_deref_mut() {
                    checkpoint.solved(difficulty).await;
                }
                info!(
                    "Hashcash solution found at trial nonce {} after {} hashes in {} ({})",
                    solution.trial_nonce,
                    self.iterations,
                    format_duration(self.elapsed),
                    format_hash_rate(self.stats().hash_rate)
                );
                return Some(solution);
            }

            let Some(interval) = self.params.checkpoint_interval else {
                continue;
            };
            self.since_checkpoint += 1;
            if self.since_checkpoint < interval.get() {
                continue;
            }
            self.since_checkpoint = 0;
            self.checkpoints += 1;

            if let Some(checkpoint) = checkpoint.as_deref_mut() {
                debug!("Checkpoint {} at trial nonce {}", self.checkpoints, self.trial_nonce);
                self.elapsed += started.elapsed();
                let proceed = checkpoint.progress(difficulty, self.trial_nonce).await;
                started = Instant::now();
                if !proceed {
                    info!(
                        "Hashcash search aborted at trial nonce {} after {} hashes",
                        self.trial_nonce, self.iterations
                    );
                    return None;
                }
            }
        }
    }

    /// Hash the current trial nonce; advance it unless it solves
    fn step(&mut self) -> Option<Solution> {
        let trial_nonce = self.trial_nonce;
        let (meets_target, hash) = self.hasher.hash_and_check(trial_nonce, self.params.difficulty);
        self.iterations += 1;
        if meets_target {
            return Some(Solution::new(hash, trial_nonce));
        }
        self.trial_nonce.increment();
        None
    }
}

/// Search for a hashcash solution
///
/// The checkpoint, when present, is invoked with the next trial nonce every
/// `checkpoint_interval` unsuccessful trials (`false` aborts and yields
/// `None`), and once more without a nonce just before the solution is
/// returned.
pub async fn search(
    sender: Address,
    sender_nonce: SenderNonce,
    difficulty: Difficulty,
    checkpoint_interval: Option<u64>,
    checkpoint: Option<&mut dyn Checkpoint>,
) -> Result<Option<Solution>> {
    let mut params = SearchParams::new(sender, sender_nonce, difficulty);
    if let Some(interval) = checkpoint_interval {
        params = params.with_checkpoint_interval(interval)?;
    }
    Ok(HashcashSearch::new(params).run(checkpoint).await)
}

/// Compute hash rate over a time period
pub fn compute_hash_rate(hashes: u64, elapsed: Duration) -> f64 {
    if elapsed.as_secs_f64() > 0.0 {
        hashes as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    }
}

/// Create a tracing span for a search
pub fn search_span(params: &SearchParams) -> Span {
    tracing::info_span!(
        "hashcash",
        sender = %format_address(&params.sender),
        sender_nonce = %params.sender_nonce,
        difficulty = params.difficulty.bits(),
    )
}
