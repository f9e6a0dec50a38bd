//! Flow Error Taxonomy
//!
//! Typed errors raised by the vault flows and the chain traits. Raw wallet and
//! node errors are classified once, where they enter the crate, by
//! [`classify_provider_error`]; the flows only ever see [`FlowError`].

use ethereum_types::U256;
use thiserror::Error;

use crate::chains::VaultStatus;

/// EIP-1193 "user rejected request" error code.
pub const USER_REJECTED_CODE: i64 = 4001;

/// Revert reason the vault uses when a deposit would overflow its capacity.
pub const PRODUCT_FULL_REASON: &str = "Product is full";

const CAPACITY_MESSAGE: &str = "Your deposit results in excess of max capacity.";
const PENDING_TX_MESSAGE: &str = "There is already a pending transaction.";
const REVERT_MARKER: &str = "execution reverted";

pub type FlowResult<T> = std::result::Result<T, FlowError>;

/// Errors surfaced by the deposit, withdraw and early-withdraw flows.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    #[error("User denied transaction")]
    UserRejected,

    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("Deposit of {deposit} on top of {current} exceeds max capacity {max}")]
    CapacityExceeded { current: U256, deposit: U256, max: U256 },

    #[error("Contract reverted: {}", .reason.as_deref().unwrap_or("no reason given"))]
    ContractReverted { reason: Option<String> },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Vault is not accepting deposits (status {0})")]
    VaultNotAccepting(VaultStatus),

    #[error("Nothing can be withdrawn while the vault is {0}")]
    WithdrawUnavailable(VaultStatus),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Token {0} is not supported on this chain")]
    UnsupportedToken(String),

    #[error("Chain {0} is not configured")]
    UnsupportedChain(u64),

    #[error("No wallet connected")]
    WalletUnavailable,

    #[error("Swap route unavailable: {0}")]
    RouteUnavailable(String),

    #[error("Transaction {0} failed on-chain")]
    TransactionFailed(String),

    #[error("Another flow is already running for wallet {0}")]
    FlowInProgress(String),

    #[error("Unwind quote expired, request a new one")]
    QuoteExpired,

    #[error("Select at least one balance to withdraw")]
    NothingSelected,

    #[error("Invalid block count {requested}: {available} block(s) available")]
    InvalidBlocks { requested: u64, available: u64 },

    #[error("Deposit intent {0} not found")]
    IntentNotFound(String),

    #[error("Deposit intent {id} cannot be resumed: {reason}")]
    NotResumable { id: String, reason: String },

    #[error("Ledger error: {0}")]
    Ledger(String),
}

impl FlowError {
    /// Message suitable for showing to the wallet owner.
    ///
    /// A revert without a reason is reported as a pending-transaction clash.
    pub fn user_message(&self) -> String {
        match self {
            FlowError::UserRejected => "User denied transaction".to_string(),
            FlowError::InsufficientBalance(msg) => msg.clone(),
            FlowError::CapacityExceeded { .. } => CAPACITY_MESSAGE.to_string(),
            FlowError::ContractReverted { reason: Some(reason) } if reason == PRODUCT_FULL_REASON => {
                CAPACITY_MESSAGE.to_string()
            }
            FlowError::ContractReverted { reason: Some(reason) } => reason.clone(),
            FlowError::ContractReverted { reason: None } => PENDING_TX_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    /// Whether the wallet owner cancelled the action.
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, FlowError::UserRejected)
    }
}

/// Maps a raw wallet/node error onto the flow taxonomy.
///
/// # Arguments
///
/// * `code` - JSON-RPC / EIP-1193 error code, if the provider returned one
/// * `message` - Raw error message (may carry `execution reverted: <reason>`)
///
/// # Returns
///
/// The classified [`FlowError`]. Anything unrecognised becomes `Network`.
pub fn classify_provider_error(code: Option<i64>, message: &str) -> FlowError {
    let lower = message.to_lowercase();

    if code == Some(USER_REJECTED_CODE)
        || message.contains("ACTION_REJECTED")
        || lower.contains("user rejected")
        || lower.contains("user denied")
    {
        return FlowError::UserRejected;
    }

    if lower.contains("insufficient funds") {
        return FlowError::InsufficientBalance("Not enough balance".to_string());
    }

    if message.contains("Insufficient") {
        return FlowError::InsufficientBalance(message.to_string());
    }

    if let Some(idx) = find_ignore_ascii_case(message, REVERT_MARKER) {
        let rest = &message[idx + REVERT_MARKER.len()..];
        return FlowError::ContractReverted {
            reason: extract_revert_reason(rest),
        };
    }

    if lower.contains("revert") {
        return FlowError::ContractReverted { reason: None };
    }

    FlowError::Network(message.to_string())
}

/// Byte offset of the first match of the ASCII `needle` in `haystack`, ignoring ASCII case.
///
/// Offsets are taken from `haystack` itself, so slicing at them stays on a char boundary.
fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    let bytes = haystack.as_bytes();
    let needle = needle.as_bytes();
    haystack.char_indices().map(|(idx, _)| idx).find(|&idx| {
        bytes
            .get(idx..idx + needle.len())
            .is_some_and(|window| window.eq_ignore_ascii_case(needle))
    })
}

/// Extracts `<reason>` from the text following `execution reverted`.
///
/// Only alphanumerics and spaces are kept, matching how the vault contracts
/// phrase their require messages.
fn extract_revert_reason(rest: &str) -> Option<String> {
    let after_colon = rest.strip_prefix(':')?.trim_start();
    let reason: String = after_colon
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect();
    let reason = reason.trim_end();
    if reason.is_empty() {
        None
    } else {
        Some(reason.to_string())
    }
}
