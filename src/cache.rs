//! Balance Cache
//!
//! Read-through cache for balances and allowances, keyed by chain, token,
//! owner and (for allowances) spender. Entries never expire on their own; the
//! flows invalidate the affected entries after every mutating transaction.

use ethereum_types::{Address, U256};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::FlowResult;

/// What a cached amount measures.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum CacheKind {
    /// `balanceOf(owner)`, or the native balance for the native sentinel
    Balance,
    /// `allowance(owner, spender)`
    Allowance { spender: Address },
}

/// Identifies one cached amount.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct CacheKey {
    pub chain_id: u64,
    pub token: Address,
    pub owner: Address,
    pub kind: CacheKind,
}

impl CacheKey {
    pub fn balance(chain_id: u64, token: Address, owner: Address) -> Self {
        Self {
            chain_id,
            token,
            owner,
            kind: CacheKind::Balance,
        }
    }

    pub fn allowance(chain_id: u64, token: Address, owner: Address, spender: Address) -> Self {
        Self {
            chain_id,
            token,
            owner,
            kind: CacheKind::Allowance { spender },
        }
    }
}

/// Shared read-through cache. Clones share the same state.
#[derive(Clone, Default)]
pub struct BalanceCache {
    state: Arc<RwLock<HashMap<CacheKey, U256>>>,
}

impl BalanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value or fetches, stores and returns it.
    ///
    /// Fetch errors are returned as-is and nothing is cached.
    pub async fn get_or_fetch<F, Fut>(&self, key: CacheKey, fetch: F) -> FlowResult<U256>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FlowResult<U256>>,
    {
        if let Some(value) = self.get(&key).await {
            debug!("Cache hit for {:?}", key);
            return Ok(value);
        }

        let value = fetch().await?;
        self.state.write().await.insert(key, value);
        Ok(value)
    }

    pub async fn get(&self, key: &CacheKey) -> Option<U256> {
        self.state.read().await.get(key).copied()
    }

    /// Drops the balance and every allowance of `owner` for `token`.
    pub async fn invalidate_token(&self, chain_id: u64, token: Address, owner: Address) {
        let mut state = self.state.write().await;
        state.retain(|k, _| !(k.chain_id == chain_id && k.token == token && k.owner == owner));
    }

    /// Drops everything cached for `owner` on `chain_id`.
    pub async fn invalidate_owner(&self, chain_id: u64, owner: Address) {
        let mut state = self.state.write().await;
        state.retain(|k, _| !(k.chain_id == chain_id && k.owner == owner));
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.is_empty()
    }
}
