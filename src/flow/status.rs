//! Flow status tracking
//!
//! Each orchestrator owns a [`StatusTrack`]: the current step, the full
//! transition history since creation, and the last error. Observers (the CLI,
//! tests) hold clones and read it while the flow runs.

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

use crate::error::FlowError;

/// Steps of the swap-and-deposit flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepositStatus {
    #[default]
    None,
    SwapApprove,
    Swapping,
    DepositApprove,
    Depositing,
    Done,
}

impl fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DepositStatus::None => "NONE",
            DepositStatus::SwapApprove => "SWAP_APPROVE",
            DepositStatus::Swapping => "SWAPPING",
            DepositStatus::DepositApprove => "DEPOSIT_APPROVE",
            DepositStatus::Depositing => "DEPOSITING",
            DepositStatus::Done => "DONE",
        };
        f.write_str(label)
    }
}

/// Steps of the withdraw and early-withdraw flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawStatus {
    #[default]
    None,
    Approving,
    Withdraw,
    Done,
}

impl fmt::Display for WithdrawStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WithdrawStatus::None => "NONE",
            WithdrawStatus::Approving => "APPROVING",
            WithdrawStatus::Withdraw => "WITHDRAW",
            WithdrawStatus::Done => "DONE",
        };
        f.write_str(label)
    }
}

#[derive(Debug)]
struct StatusLog<S> {
    current: S,
    history: Vec<S>,
    last_error: Option<FlowError>,
}

/// Shared, observable flow status.
#[derive(Debug)]
pub struct StatusTrack<S> {
    name: &'static str,
    inner: Arc<Mutex<StatusLog<S>>>,
}

impl<S> Clone for StatusTrack<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Copy + Default + PartialEq + fmt::Display> StatusTrack<S> {
    /// Starts at the idle status with a one-entry history.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(Mutex::new(StatusLog {
                current: S::default(),
                history: vec![S::default()],
                last_error: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatusLog<S>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Moves to `status`. Setting the current status again is a no-op.
    pub fn set(&self, status: S) {
        let mut log = self.lock();
        if log.current == status {
            return;
        }
        info!("{} status: {} -> {}", self.name, log.current, status);
        log.current = status;
        log.history.push(status);
    }

    /// Back to idle.
    pub fn reset(&self) {
        self.set(S::default());
    }

    pub fn current(&self) -> S {
        self.lock().current
    }

    pub fn history(&self) -> Vec<S> {
        self.lock().history.clone()
    }

    pub fn is_idle(&self) -> bool {
        self.current() == S::default()
    }

    /// Clears the recorded error; called when a new flow starts.
    pub fn begin(&self) {
        self.lock().last_error = None;
    }

    pub fn record_error(&self, error: &FlowError) {
        self.lock().last_error = Some(error.clone());
    }

    pub fn last_error(&self) -> Option<FlowError> {
        self.lock().last_error.clone()
    }
}
