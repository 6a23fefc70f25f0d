//! Routing calls through per-owner proxy accounts
//!
//! Every signer owns a proxy deployed by a factory at a CREATE2 address.
//! Outgoing calls are rewritten to `proxy.execute(0, to, 0, data)` so the
//! proxy acts on the signer's behalf, whether or not it is deployed yet.

use crate::abi::contracts::IProxyIdentity;
use crate::abi::{AbiType, AbiValue};
use crate::client::ChainReader;
use crate::derive::{derive_address, InitCode};
use crate::types::format_address;
use crate::{RelayedCall, Result, Salt};
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Where and how proxies are deployed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyDeployment {
    /// Factory performing the CREATE2 deployment
    pub factory: Address,
    /// Proxy creation code, without constructor arguments
    pub creation_code: Bytes,
    /// Salt the factory deploys with
    pub salt: Salt,
}

impl ProxyDeployment {
    /// Deployment with the zero salt
    pub fn new(factory: Address, creation_code: impl Into<Bytes>) -> Self {
        Self {
            factory,
            creation_code: creation_code.into(),
            salt: Salt::ZERO,
        }
    }

    pub fn with_salt(mut self, salt: Salt) -> Self {
        self.salt = salt;
        self
    }

    /// Creation code followed by the encoded owner
    pub fn init_code(&self, owner: Address) -> Result<InitCode> {
        InitCode::new(self.creation_code.clone()).with_constructor_args(&[(AbiType::Address, AbiValue::Address(owner))])
    }

    /// Derive the proxy address of `owner` locally
    pub fn proxy_address(&self, owner: Address) -> Result<Address> {
        Ok(derive_address(self.factory, &self.salt, &self.init_code(owner)?))
    }

    /// Ask the factory for the proxy address of `owner`
    pub async fn precomputed_address<R>(&self, reader: &R, owner: Address) -> Result<Address>
    where
        R: ChainReader + ?Sized,
    {
        crate::derive::derive_precomputed(reader, self.factory, owner).await
    }
}

/// Proxy/owner lookup table for a set of accounts
#[derive(Debug, Clone, Default)]
pub struct ProxyAccounts {
    owners: HashMap<Address, Address>,
    proxies: HashMap<Address, Address>,
}

impl ProxyAccounts {
    /// Build the table for `owners` from scratch
    pub fn rebuild<I>(deployment: &ProxyDeployment, owners: I) -> Result<Self>
    where
        I: IntoIterator<Item = Address>,
    {
        let mut accounts = Self::default();
        for owner in owners {
            accounts.insert(owner, deployment.proxy_address(owner)?);
        }
        Ok(accounts)
    }

    pub fn insert(&mut self, owner: Address, proxy: Address) {
        if let Some(previous) = self.proxies.insert(owner, proxy) {
            self.owners.remove(&previous);
        }
        self.owners.insert(proxy, owner);
    }

    pub fn owner_of(&self, proxy: &Address) -> Option<Address> {
        self.owners.get(proxy).copied()
    }

    pub fn proxy_of(&self, owner: &Address) -> Option<Address> {
        self.proxies.get(owner).copied()
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Iterate `(owner, proxy)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Address)> {
        self.proxies.iter()
    }
}

/// Rewrites calls to go through the signer's proxy
#[derive(Debug)]
pub struct ProxyRouter {
    deployment: ProxyDeployment,
    accounts: RwLock<ProxyAccounts>,
}

impl ProxyRouter {
    pub fn new(deployment: ProxyDeployment) -> Self {
        Self {
            deployment,
            accounts: RwLock::new(ProxyAccounts::default()),
        }
    }

    pub fn deployment(&self) -> &ProxyDeployment {
        &self.deployment
    }

    /// Replace the lookup table with one for `owners`
    pub fn rebuild_accounts<I>(&self, owners: I) -> Result<()>
    where
        I: IntoIterator<Item = Address>,
    {
        let accounts = ProxyAccounts::rebuild(&self.deployment, owners)?;
        debug!("Rebuilt proxy table with {} accounts", accounts.len());
        *self.accounts.write() = accounts;
        Ok(())
    }

    /// Snapshot of the current lookup table
    pub fn accounts(&self) -> ProxyAccounts {
        self.accounts.read().clone()
    }

    /// Proxy of `owner`, derived and remembered on first use
    pub fn proxy_of(&self, owner: Address) -> Result<Address> {
        if let Some(proxy) = self.accounts.read().proxy_of(&owner) {
            return Ok(proxy);
        }
        let proxy = self.deployment.proxy_address(owner)?;
        self.accounts.write().insert(owner, proxy);
        Ok(proxy)
    }

    /// Owner of a known proxy
    pub fn owner_of(&self, proxy: &Address) -> Option<Address> {
        self.accounts.read().owner_of(proxy)
    }

    /// Rewrite `call` to execute through the sender's proxy
    pub fn route(&self, call: &RelayedCall) -> Result<RelayedCall> {
        let proxy = self.proxy_of(call.from)?;
        let data = encode_execute(call.to, &call.data);
        debug!(
            "Routing call from {} to {} through proxy {}",
            format_address(&call.from),
            format_address(&call.to),
            format_address(&proxy)
        );
        Ok(RelayedCall::new(call.from, proxy, data))
    }
}

/// `execute(0, to, 0, data)` call data
pub fn encode_execute(to: Address, data: &Bytes) -> Vec<u8> {
    IProxyIdentity::executeCall {
        operationType: U256::ZERO,
        to,
        value: U256::ZERO,
        data: data.clone(),
    }
    .abi_encode()
}
