//! Read-only chain access for approval parameters
//!
//! [`ChainReader`] abstracts the three contract reads the approval flow
//! depends on. [`RpcClient`] implements them with `eth_call` through an alloy
//! HTTP provider, with optional exponential backoff.

use crate::abi::contracts::{IForwarder, IHashcashPaymaster, IProxyFactory};
use crate::types::format_address;
use crate::{Difficulty, Error, Result, SenderNonce};
use alloy_eips::BlockId;
use alloy_primitives::{Address, Bytes};
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_types::{TransactionInput, TransactionRequest};
use alloy_sol_types::SolCall;
use alloy_transport::{RpcError, TransportError, TransportErrorKind};
use alloy_transport_http::Http;
use async_trait::async_trait;
use reqwest::ClientBuilder;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};
use url::Url;

/// Read-only contract calls needed before a search can start
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Difficulty currently required by a paymaster
    async fn difficulty(&self, paymaster: Address) -> Result<Difficulty>;

    /// Replay-protection nonce the forwarder tracks for `sender`
    async fn sender_nonce(&self, forwarder: Address, sender: Address) -> Result<SenderNonce>;

    /// Proxy address a factory will deploy for `owner`
    async fn calculate_address(&self, factory: Address, owner: Address) -> Result<Address>;
}

#[async_trait]
impl<T: ChainReader + ?Sized> ChainReader for Arc<T> {
    async fn difficulty(&self, paymaster: Address) -> Result<Difficulty> {
        (**self).difficulty(paymaster).await
    }

    async fn sender_nonce(&self, forwarder: Address, sender: Address) -> Result<SenderNonce> {
        (**self).sender_nonce(forwarder, sender).await
    }

    async fn calculate_address(&self, factory: Address, owner: Address) -> Result<Address> {
        (**self).calculate_address(factory, owner).await
    }
}

/// Exponential backoff configuration
///
/// Retries are disabled by default; read failures surface immediately.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_retries: usize,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            max_retries: 0,
        }
    }
}

/// Contract reader over an Ethereum JSON-RPC node
#[derive(Debug, Clone)]
pub struct RpcClient {
    provider: RootProvider,
    url: Url,
    backoff_config: BackoffConfig,
}

impl RpcClient {
    /// Create a new RPC client
    pub fn new(url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url.as_ref()).map_err(|e| Error::config(format!("Invalid RPC URL: {}", e)))?;

        let client = ClientBuilder::new().timeout(timeout).build().map_err(Error::from)?;
        let transport = Http::with_client(client, url.clone());
        let provider = RootProvider::new(alloy_rpc_client::RpcClient::new(transport, false));

        Ok(Self {
            provider,
            url,
            backoff_config: BackoffConfig::default(),
        })
    }

    /// Set custom backoff configuration
    pub fn with_backoff_config(mut self, config: BackoffConfig) -> Self {
        self.backoff_config = config;
        self
    }

    /// Get the node URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Underlying alloy provider
    pub fn provider(&self) -> &RootProvider {
        &self.provider
    }

    /// `eth_call` against the latest block, retrying transient transport failures
    #[instrument(skip(self, to, data), fields(to = %format_address(&to)))]
    pub async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        debug!("eth_call with {} bytes of call data", data.len());

        let request = TransactionRequest::default()
            .to(to)
            .input(TransactionInput::both(data));
        let mut delay = self.backoff_config.initial_delay;
        let mut attempts = 0;

        loop {
            let error = match self.provider.call(request.clone()).block(BlockId::latest()).await {
                Ok(output) => return Ok(output),
                Err(e) => e,
            };
            if !is_transient(&error) || attempts >= self.backoff_config.max_retries {
                return Err(Error::from(error));
            }

            warn!(
                "RPC request failed, retrying in {:?} (attempt {}/{}): {}",
                delay,
                attempts + 1,
                self.backoff_config.max_retries,
                error
            );
            sleep(delay).await;

            delay = Duration::from_millis(((delay.as_millis() as f64) * self.backoff_config.multiplier) as u64)
                .min(self.backoff_config.max_delay);

            attempts += 1;
        }
    }

    /// Call a read and decode its return value, naming the read on failure
    async fn read<C: SolCall + Send>(&self, to: Address, call: C) -> Result<C::Return> {
        let output = self
            .call(to, call.abi_encode().into())
            .await
            .map_err(|e| Error::external_read(C::SIGNATURE, to, e.to_string()))?;
        if output.is_empty() {
            return Err(Error::external_read(
                C::SIGNATURE,
                to,
                "empty result, contract does not implement this read",
            ));
        }
        C::abi_decode_returns(&output).map_err(|e| Error::external_read(C::SIGNATURE, to, e.to_string()))
    }
}

/// Failures worth retrying: unreachable node, rate limits and server errors
pub(crate) fn is_transient(error: &TransportError) -> bool {
    match error {
        RpcError::Transport(TransportErrorKind::HttpError(e)) => e.status >= 500 || e.status == 429,
        RpcError::Transport(TransportErrorKind::BackendGone) => true,
        RpcError::Transport(TransportErrorKind::Custom(_)) => true,
        _ => false,
    }
}

#[async_trait]
impl ChainReader for RpcClient {
    #[instrument(skip(self))]
    async fn difficulty(&self, paymaster: Address) -> Result<Difficulty> {
        let value = self.read(paymaster, IHashcashPaymaster::difficultyCall {}).await?;
        Difficulty::try_from(value)
            .map_err(|e| Error::external_read(IHashcashPaymaster::difficultyCall::SIGNATURE, paymaster, e.to_string()))
    }

    #[instrument(skip(self))]
    async fn sender_nonce(&self, forwarder: Address, sender: Address) -> Result<SenderNonce> {
        let value = self.read(forwarder, IForwarder::getNonceCall { from: sender }).await?;
        Ok(SenderNonce::new(value))
    }

    #[instrument(skip(self))]
    async fn calculate_address(&self, factory: Address, owner: Address) -> Result<Address> {
        self.read(factory, IProxyFactory::calculateAddressCall { owner }).await
    }
}
