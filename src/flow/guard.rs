//! Single-flight guard
//!
//! At most one flow (deposit, resume, withdraw, early withdraw) may run per
//! wallet. Orchestrators that share a [`FlightGuard`] refuse a second flow
//! with [`FlowError::FlowInProgress`] until the first one's ticket drops.

use ethereum_types::Address;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::chains::format_address;
use crate::error::{FlowError, FlowResult};

/// Set of wallets with a flow in flight. Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct FlightGuard {
    active: Arc<Mutex<HashSet<Address>>>,
}

/// Held for the lifetime of a flow; releases the wallet on drop.
#[derive(Debug)]
pub struct FlightTicket {
    guard: FlightGuard,
    wallet: Address,
}

impl FlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<Address>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claims `wallet` for a new flow.
    ///
    /// # Returns
    ///
    /// * `Ok(FlightTicket)` - The wallet was free
    /// * `Err(FlowError::FlowInProgress)` - Another flow holds the wallet
    pub fn try_acquire(&self, wallet: Address) -> FlowResult<FlightTicket> {
        if !self.lock().insert(wallet) {
            return Err(FlowError::FlowInProgress(format_address(&wallet)));
        }
        debug!("Flight acquired for {}", format_address(&wallet));
        Ok(FlightTicket {
            guard: self.clone(),
            wallet,
        })
    }

    pub fn is_busy(&self, wallet: &Address) -> bool {
        self.lock().contains(wallet)
    }
}

impl Drop for FlightTicket {
    fn drop(&mut self) {
        self.guard.lock().remove(&self.wallet);
        debug!("Flight released for {}", format_address(&self.wallet));
    }
}
