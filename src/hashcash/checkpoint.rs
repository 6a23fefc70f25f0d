//! Search checkpoints
//!
//! A checkpoint is polled by a running search every `checkpoint_interval`
//! unsuccessful trials. Returning `false` aborts the search.

use super::compute_hash_rate;
use crate::{Difficulty, TrialNonce};
use async_trait::async_trait;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Progress observer and abort hook for a search
#[async_trait]
pub trait Checkpoint: Send {
    /// Called with the next trial nonce to try; `false` aborts the search
    async fn progress(&mut self, difficulty: Difficulty, trial_nonce: TrialNonce) -> bool;

    /// Called once just before a solution is returned
    async fn solved(&mut self, _difficulty: Difficulty) {}
}

/// Checkpoint backed by a closure
///
/// The closure receives the next trial nonce on progress and `None` when the
/// search has been solved (its return value is then ignored).
pub struct FnCheckpoint<F> {
    callback: F,
}

/// Wrap a closure as a [`Checkpoint`]
pub fn checkpoint_fn<F>(callback: F) -> FnCheckpoint<F>
where
    F: FnMut(Difficulty, Option<TrialNonce>) -> bool + Send,
{
    FnCheckpoint { callback }
}

#[async_trait]
impl<F> Checkpoint for FnCheckpoint<F>
where
    F: FnMut(Difficulty, Option<TrialNonce>) -> bool + Send,
{
    async fn progress(&mut self, difficulty: Difficulty, trial_nonce: TrialNonce) -> bool {
        (self.callback)(difficulty, Some(trial_nonce))
    }

    async fn solved(&mut self, difficulty: Difficulty) {
        let _ = (self.callback)(difficulty, None);
    }
}

/// Yields to the runtime at every checkpoint and stops once cancelled
#[derive(Debug, Clone)]
pub struct CancellationCheckpoint {
    cancellation: CancellationToken,
}

impl CancellationCheckpoint {
    pub fn new(cancellation: CancellationToken) -> Self {
        Self { cancellation }
    }
}

#[async_trait]
impl Checkpoint for CancellationCheckpoint {
    async fn progress(&mut self, _difficulty: Difficulty, _trial_nonce: TrialNonce) -> bool {
        tokio::task::yield_now().await;
        !self.cancellation.is_cancelled()
    }
}

/// Progress report sent by [`StatsCheckpoint`]
#[derive(Debug, Clone, PartialEq)]
pub struct SearchProgress {
    /// Difficulty being searched
    pub difficulty: Difficulty,
    /// Next trial nonce, `None` once solved
    pub trial_nonce: Option<TrialNonce>,
    /// Hashes per second since the search started
    pub hash_rate: f64,
}

/// Streams progress reports over a channel and never aborts
#[derive(Debug)]
pub struct StatsCheckpoint {
    sender: mpsc::UnboundedSender<SearchProgress>,
    started: Instant,
}

impl StatsCheckpoint {
    pub fn new(sender: mpsc::UnboundedSender<SearchProgress>) -> Self {
        Self {
            sender,
            started: Instant::now(),
        }
    }
}

#[async_trait]
impl Checkpoint for StatsCheckpoint {
    async fn progress(&mut self, difficulty: Difficulty, trial_nonce: TrialNonce) -> bool {
        let _ = self.sender.send(SearchProgress {
            difficulty,
            trial_nonce: Some(trial_nonce),
            hash_rate: compute_hash_rate(trial_nonce.value(), self.started.elapsed()),
        });
        true
    }

    async fn solved(&mut self, difficulty: Difficulty) {
        let _ = self.sender.send(SearchProgress {
            difficulty,
            trial_nonce: None,
            hash_rate: 0.0,
        });
    }
}

/// Both checkpoints are always polled; the search continues only if both agree
#[async_trait]
impl<A, B> Checkpoint for (A, B)
where
    A: Checkpoint,
    B: Checkpoint,
{
    async fn progress(&mut self, difficulty: Difficulty, trial_nonce: TrialNonce) -> bool {
        let first = self.0.progress(difficulty, trial_nonce).await;
        let second = self.1.progress(difficulty, trial_nonce).await;
        first && second
    }

    async fn solved(&mut self, difficulty: Difficulty) {
        self.0.solved(difficulty).await;
        self.1.solved(difficulty).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashcash::{HashcashSearch, SearchParams};
    use crate::SenderNonce;
    use alloy_primitives::Address;

    fn params(difficulty: u8, interval: u64) -> SearchParams {
        SearchParams::new(Address::repeat_byte(0x11), SenderNonce::from(1), Difficulty::new(difficulty))
            .with_checkpoint_interval(interval)
            .unwrap()
    }

    #[tokio::test]
    async fn test_cancellation_checkpoint() {
        let token = CancellationToken::new();
        let mut checkpoint = CancellationCheckpoint::new(token.clone());
        assert!(checkpoint.progress(Difficulty::new(1), TrialNonce::new(10)).await);

        token.cancel();
        let mut search = HashcashSearch::new(params(40, 10));
        assert!(search.run(Some(&mut checkpoint)).await.is_none());
        assert_eq!(search.iterations(), 10);
    }

    #[tokio::test]
    async fn test_stats_checkpoint_reports_progress() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut checkpoint = StatsCheckpoint::new(tx);

        let solution = HashcashSearch::new(params(8, 100))
            .run(Some(&mut checkpoint))
            .await
            .unwrap();
        assert_eq!(solution.trial_nonce, TrialNonce::new(477));

        let mut reports = Vec::new();
        while let Ok(report) = rx.try_recv() {
            reports.push(report);
        }
        let nonces: Vec<_> = reports.iter().map(|r| r.trial_nonce.map(|n| n.value())).collect();
        assert_eq!(nonces, vec![Some(100), Some(200), Some(300), Some(400), None]);
        assert!(reports.iter().all(|r| r.difficulty == Difficulty::new(8)));
    }

    #[tokio::test]
    async fn test_stats_checkpoint_survives_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut checkpoint = StatsCheckpoint::new(tx);
        assert!(checkpoint.progress(Difficulty::new(3), TrialNonce::new(1)).await);
    }

    #[tokio::test]
    async fn test_paired_checkpoints() {
        let mut seen = 0u32;
        let counter = checkpoint_fn(|_, nonce| {
            if nonce.is_some() {
                seen += 1;
            }
            true
        });
        let limit = checkpoint_fn(|_, nonce| nonce.map_or(true, |n| n.value() < 20));
        let mut pair = (counter, limit);

        let mut search = HashcashSearch::new(params(40, 5));
        assert!(search.run(Some(&mut pair)).await.is_none());
        drop(pair);
        assert_eq!(seen, 4);
        assert_eq!(search.iterations(), 20);
    }
}
