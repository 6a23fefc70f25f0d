//! Hashcash Approval
//!
//! Client-side proof-of-work for gas-subsidizing relay paymasters:
//! - Hashcash search over `keccak256(abi.encode(sender, senderNonce, trialNonce))`
//!   with cooperative checkpoints, cancellation and a parallel pool
//! - Approval data for relay transports, from on-chain or fixed parameters
//! - Off-chain verification mirroring the paymaster's checks
//! - CREATE2 proxy address derivation and proxy call routing

pub mod abi;
pub mod approval;
pub mod client;
pub mod config;
pub mod crypto;
pub mod derive;
pub mod error;
pub mod hashcash;
pub mod proxy;
pub mod types;
pub mod utils;

pub use approval::{ApprovalAttempt, ApprovalBuilder, ApprovalDataSource, AttemptState, HashcashApproval};
pub use client::{ChainReader, RpcClient};
pub use config::Config;
pub use derive::{derive_address, derive_from_hash, derive_precomputed, InitCode};
pub use error::{Error, Result};
pub use hashcash::{search, verify, Checkpoint, HashcashSearch, Rejection, SearchParams, SearchPool};
pub use proxy::{ProxyAccounts, ProxyDeployment, ProxyRouter};
pub use types::*;

/// Application information
pub const APP_NAME: &str = "hashcash-approval";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
