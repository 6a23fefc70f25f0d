//! Approval data for outgoing relay requests
//!
//! A relay transport asks an [`ApprovalDataSource`] for the opaque approval
//! payload of each outgoing request. Two sources are provided:
//!
//! - [`ApprovalBuilder`] reads the current difficulty from the paymaster and
//!   the sender nonce from the trusted forwarder, then searches.
//! - [`HashcashApproval`] searches at a fixed difficulty for the nonce carried
//!   by the request itself.
//!
//! Each build is an [`ApprovalAttempt`] walking
//! `Idle -> FetchingParameters -> Searching -> Solved | Aborted`, or `Failed`
//! when a read fails. Terminal attempts are never retried; a new attempt
//! re-reads the parameters.

use crate::client::ChainReader;
use crate::config::Config;
use crate::hashcash::{CancellationCheckpoint, Checkpoint, HashcashSearch, SearchParams, DEFAULT_CHECKPOINT_INTERVAL};
use crate::types::format_address;
use crate::{Difficulty, Error, RelayRequestIdentity, Result, SenderNonce, Solution};
use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Approval-data hook of a relay transport, invoked once per relayed call
///
/// `Ok(None)` means the search was cancelled and no payload is available.
#[async_trait]
pub trait ApprovalDataSource: Send + Sync {
    async fn approval_data(&self, request: &RelayRequestIdentity) -> Result<Option<Bytes>>;
}

/// State of one approval attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    FetchingParameters,
    Searching {
        difficulty: Difficulty,
        sender_nonce: SenderNonce,
    },
    Solved(Solution),
    Aborted,
    /// A parameter read failed; carries the error description
    Failed(String),
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Solved(_) | Self::Aborted | Self::Failed(_))
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::FetchingParameters => write!(f, "fetching parameters"),
            Self::Searching {
                difficulty,
                sender_nonce,
            } => write!(f, "searching (difficulty {difficulty}, nonce {sender_nonce})"),
            Self::Solved(solution) => write!(f, "solved ({solution})"),
            Self::Aborted => write!(f, "aborted"),
            Self::Failed(message) => write!(f, "failed ({message})"),
        }
    }
}

/// Builds approval data from on-chain parameters
pub struct ApprovalBuilder<R> {
    reader: R,
    paymaster: Address,
    forwarder: Address,
    checkpoint_interval: u64,
    cancellation: CancellationToken,
}

impl<R: ChainReader> ApprovalBuilder<R> {
    /// Create a builder reading from `paymaster` and `forwarder`
    pub fn new(reader: R, paymaster: Address, forwarder: Address) -> Self {
        Self {
            reader,
            paymaster,
            forwarder,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            cancellation: CancellationToken::new(),
        }
    }

    /// Create a builder from validated configuration
    pub fn from_config(reader: R, config: &Config) -> Result<Self> {
        Self::new(reader, config.paymaster_address()?, config.forwarder_address()?)
            .with_checkpoint_interval(config.checkpoint_interval)
    }

    /// Poll checkpoints every `interval` unsuccessful trials
    pub fn with_checkpoint_interval(mut self, interval: u64) -> Result<Self> {
        if interval == 0 {
            return Err(Error::invalid_parameter("Checkpoint interval must be greater than 0"));
        }
        self.checkpoint_interval = interval;
        Ok(self)
    }

    /// Cancel searches started through [`ApprovalDataSource`]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Start a fresh attempt for `sender`
    pub fn attempt(&self, sender: Address) -> ApprovalAttempt<'_, R> {
        ApprovalAttempt {
            builder: self,
            sender,
            sender_nonce: None,
            state: AttemptState::Idle,
        }
    }

    /// Read the current parameters and search
    pub async fn prepare_approval(
        &self,
        sender: Address,
        checkpoint: Option<&mut dyn Checkpoint>,
    ) -> Result<Option<Solution>> {
        self.attempt(sender).run(checkpoint).await
    }

    /// Approval data for a relay request, `None` if the search was cancelled
    ///
    /// Only the sender is taken from the request; the nonce is read from the
    /// forwarder.
    pub async fn build(&self, request: &RelayRequestIdentity) -> Result<Option<Bytes>> {
        self.approval_data(request).await
    }
}

#[async_trait]
impl<R: ChainReader> ApprovalDataSource for ApprovalBuilder<R> {
    async fn approval_data(&self, request: &RelayRequestIdentity) -> Result<Option<Bytes>> {
        let mut checkpoint = CancellationCheckpoint::new(self.cancellation.clone());
        let mut attempt = self.attempt(request.sender);
        let solution = attempt.run(Some(&mut checkpoint)).await?;

        if let Some(forwarder_nonce) = attempt.sender_nonce().filter(|nonce| *nonce != request.sender_nonce) {
            warn!(
                "Request nonce {} differs from forwarder nonce {}, approval is bound to the forwarder's",
                request.sender_nonce, forwarder_nonce
            );
        }
        Ok(solution.map(|solution| solution.approval_data()))
    }
}

/// One pass through the approval state machine
pub struct ApprovalAttempt<'a, R> {
    builder: &'a ApprovalBuilder<R>,
    sender: Address,
    sender_nonce: Option<SenderNonce>,
    state: AttemptState,
}

impl<R: ChainReader> ApprovalAttempt<'_, R> {
    pub fn sender(&self) -> Address {
        self.sender
    }

    pub fn state(&self) -> &AttemptState {
        &self.state
    }

    /// Sender nonce the search ran with, once known
    pub fn sender_nonce(&self) -> Option<SenderNonce> {
        self.sender_nonce
    }

    /// Fetch parameters and search
    pub async fn run(&mut self, checkpoint: Option<&mut dyn Checkpoint>) -> Result<Option<Solution>> {
        if self.state != AttemptState::Idle {
            return Err(Error::invalid_state(format!(
                "Approval attempt for {} already {}",
                format_address(&self.sender),
                self.state
            )));
        }

        self.transition(AttemptState::FetchingParameters);
        let params = match self.fetch_parameters().await {
            Ok(params) => params,
            Err(e) => {
                self.transition(AttemptState::Failed(e.to_string()));
                return Err(e);
            }
        };

        self.transition(AttemptState::Searching {
            difficulty: params.difficulty,
            sender_nonce: params.sender_nonce,
        });
        self.sender_nonce = Some(params.sender_nonce);

        match HashcashSearch::new(params).run(checkpoint).await {
            Some(solution) => {
                self.transition(AttemptState::Solved(solution));
                Ok(Some(solution))
            }
            None => {
                self.transition(AttemptState::Aborted);
                Ok(None)
            }
        }
    }

    async fn fetch_parameters(&self) -> Result<SearchParams> {
        let difficulty = self.builder.reader.difficulty(self.builder.paymaster).await?;
        let sender_nonce = self
            .builder
            .reader
            .sender_nonce(self.builder.forwarder, self.sender)
            .await?;

        SearchParams::new(self.sender, sender_nonce, difficulty).with_checkpoint_interval(self.builder.checkpoint_interval)
    }

    fn transition(&mut self, next: AttemptState) {
        info!(
            "Approval attempt for {}: {} -> {}",
            format_address(&self.sender),
            self.state,
            next
        );
        self.state = next;
    }
}

/// Approval data at a fixed difficulty for the request's own nonce
#[derive(Debug, Clone)]
pub struct HashcashApproval {
    difficulty: Difficulty,
    checkpoint_interval: u64,
    cancellation: CancellationToken,
}

impl HashcashApproval {
    pub fn new(difficulty: Difficulty) -> Self {
        Self {
            difficulty,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            cancellation: CancellationToken::new(),
        }
    }

    /// Poll checkpoints every `interval` unsuccessful trials
    pub fn with_checkpoint_interval(mut self, interval: u64) -> Result<Self> {
        if interval == 0 {
            return Err(Error::invalid_parameter("Checkpoint interval must be greater than 0"));
        }
        self.checkpoint_interval = interval;
        Ok(self)
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    /// Search for `request` with a caller-supplied checkpoint
    pub async fn calculate(
        &self,
        request: &RelayRequestIdentity,
        checkpoint: Option<&mut dyn Checkpoint>,
    ) -> Result<Option<Solution>> {
        let params = SearchParams::new(request.sender, request.sender_nonce, self.difficulty)
            .with_checkpoint_interval(self.checkpoint_interval)?;
        Ok(HashcashSearch::new(params).run(checkpoint).await)
    }
}

#[async_trait]
impl ApprovalDataSource for HashcashApproval {
    async fn approval_data(&self, request: &RelayRequestIdentity) -> Result<Option<Bytes>> {
        let mut checkpoint = CancellationCheckpoint::new(self.cancellation.clone());
        let solution = self.calculate(request, Some(&mut checkpoint)).await?;
        Ok(solution.map(|solution| solution.approval_data()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashcash::{checkpoint_fn, verify};
    use crate::TrialNonce;
    use alloy_primitives::address;
    use assert_matches::assert_matches;

    const PAYMASTER: Address = address!("0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a");
    const FORWARDER: Address = address!("0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f");

    struct StaticReader {
        difficulty: u8,
        nonce: Option<u64>,
    }

    #[async_trait]
    impl ChainReader for StaticReader {
        async fn difficulty(&self, _paymaster: Address) -> Result<Difficulty> {
            Ok(Difficulty::new(self.difficulty))
        }

        async fn sender_nonce(&self, forwarder: Address, _sender: Address) -> Result<SenderNonce> {
            self.nonce
                .map(SenderNonce::from)
                .ok_or_else(|| Error::external_read("getNonce(address)", forwarder, "execution reverted"))
        }

        async fn calculate_address(&self, factory: Address, _owner: Address) -> Result<Address> {
            Err(Error::external_read("calculateAddress(address)", factory, "unsupported"))
        }
    }

    fn builder(difficulty: u8, nonce: Option<u64>) -> ApprovalBuilder<StaticReader> {
        ApprovalBuilder::new(StaticReader { difficulty, nonce }, PAYMASTER, FORWARDER)
    }

    fn sender() -> Address {
        Address::repeat_byte(0x11)
    }

    #[tokio::test]
    async fn test_attempt_solves() {
        let builder = builder(8, Some(1));
        let mut attempt = builder.attempt(sender());
        assert_eq!(attempt.state(), &AttemptState::Idle);

        let solution = attempt.run(None).await.unwrap().unwrap();
        assert_eq!(solution.trial_nonce, TrialNonce::new(477));
        assert_eq!(attempt.state(), &AttemptState::Solved(solution));
        assert_eq!(attempt.sender_nonce(), Some(SenderNonce::from(1)));
    }

    #[tokio::test]
    async fn test_terminal_attempt_is_not_rerun() {
        let builder = builder(1, Some(1));
        let mut attempt = builder.attempt(sender());
        attempt.run(None).await.unwrap();

        let err = attempt.run(None).await.unwrap_err();
        assert_matches!(err, Error::InvalidState { .. });

        // a fresh attempt starts over
        assert!(builder.attempt(sender()).run(None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_read_is_terminal() {
        let builder = builder(8, None);
        let mut attempt = builder.attempt(sender());

        let err = attempt.run(None).await.unwrap_err();
        assert_matches!(&err, Error::ExternalRead { read, address, .. } if read == "getNonce(address)" && *address == FORWARDER);
        assert_matches!(attempt.state(), AttemptState::Failed(message) if message.contains("getNonce"));
        assert!(attempt.state().is_terminal());
    }

    #[tokio::test]
    async fn test_checkpoint_abort() {
        let builder = builder(40, Some(1)).with_checkpoint_interval(10).unwrap();
        let mut attempt = builder.attempt(sender());
        let mut stop = checkpoint_fn(|_, _| false);

        assert_eq!(attempt.run(Some(&mut stop)).await.unwrap(), None);
        assert_eq!(attempt.state(), &AttemptState::Aborted);
    }

    #[tokio::test]
    async fn test_build_produces_verifiable_data() {
        let builder = builder(6, Some(3));
        let request = RelayRequestIdentity::new(sender(), SenderNonce::from(3));

        let data = builder.build(&request).await.unwrap().unwrap();
        assert_eq!(data.len(), Solution::APPROVAL_DATA_SIZE);
        assert!(verify(&data, &request, Difficulty::new(6)).is_ok());
    }

    #[tokio::test]
    async fn test_build_uses_forwarder_nonce() {
        let builder = builder(4, Some(5));
        let data = builder
            .build(&RelayRequestIdentity::new(sender(), SenderNonce::from(4)))
            .await
            .unwrap()
            .unwrap();
        let current = RelayRequestIdentity::new(sender(), SenderNonce::from(5));
        assert!(verify(&data, &current, Difficulty::new(4)).is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_build() {
        let token = CancellationToken::new();
        token.cancel();
        let builder = builder(40, Some(1))
            .with_checkpoint_interval(10)
            .unwrap()
            .with_cancellation(token);
        let request = RelayRequestIdentity::new(sender(), SenderNonce::from(1));

        assert_eq!(builder.approval_data(&request).await.unwrap(), None);
        assert_eq!(builder.build(&request).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cancelled_build_without_interval() {
        let token = CancellationToken::new();
        token.cancel();
        let builder = builder(64, Some(1)).with_cancellation(token);
        let request = RelayRequestIdentity::new(sender(), SenderNonce::from(1));

        let data = tokio::time::timeout(std::time::Duration::from_secs(5), builder.build(&request))
            .await
            .expect("cancelled build should stop at the first checkpoint");
        assert_eq!(data.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        assert!(builder(1, Some(1)).with_checkpoint_interval(0).is_err());
        assert!(HashcashApproval::new(Difficulty::new(1)).with_checkpoint_interval(0).is_err());
    }

    #[tokio::test]
    async fn test_hashcash_approval_uses_request_nonce() {
        let source = HashcashApproval::new(Difficulty::new(8));
        let request = RelayRequestIdentity::new(sender(), SenderNonce::from(1));

        let data = source.approval_data(&request).await.unwrap().unwrap();
        let solution = Solution::from_approval_data(&data).unwrap();
        assert_eq!(solution.trial_nonce, TrialNonce::new(477));
        assert_eq!(verify(&data, &request, Difficulty::new(8)), Ok(solution.into()));
    }

    #[tokio::test]
    async fn test_hashcash_approval_cancel() {
        let token = CancellationToken::new();
        let source = HashcashApproval::new(Difficulty::new(64))
            .with_checkpoint_interval(100)
            .unwrap()
            .with_cancellation(token.clone());
        token.cancel();

        let request = RelayRequestIdentity::new(sender(), SenderNonce::from(1));
        assert_eq!(source.approval_data(&request).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_hashcash_approval_cancel_without_interval() {
        let token = CancellationToken::new();
        token.cancel();
        let source = HashcashApproval::new(Difficulty::new(64)).with_cancellation(token);
        let request = RelayRequestIdentity::new(sender(), SenderNonce::from(1));

        let data = tokio::time::timeout(std::time::Duration::from_secs(5), source.approval_data(&request))
            .await
            .expect("cancelled search should stop at the first checkpoint");
        assert_eq!(data.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sources_as_trait_objects() {
        let sources: Vec<Box<dyn ApprovalDataSource>> = vec![
            Box::new(builder(2, Some(1))),
            Box::new(HashcashApproval::new(Difficulty::new(2))),
        ];
        let request = RelayRequestIdentity::new(sender(), SenderNonce::from(1));
        for source in &sources {
            let data = source.approval_data(&request).await.unwrap().unwrap();
            assert!(verify(&data, &request, Difficulty::new(2)).is_ok());
        }
    }
}
