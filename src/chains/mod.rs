//! Chain access
//!
//! Traits the flows depend on (wallet, ERC-20, vault contract) and the
//! JSON-RPC implementation used in production. Tests substitute in-memory
//! implementations of the same traits.

pub mod abi;
pub mod evm;

use ethereum_types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FlowResult;

pub use evm::EvmClient;

/// Sentinel address aggregators use for the chain's native coin.
pub const NATIVE_TOKEN: &str = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE";

/// The native coin sentinel as an [`Address`].
pub fn native_token() -> Address {
    Address::repeat_byte(0xee)
}

/// Whether `token` is the native coin sentinel.
pub fn is_native(token: &Address) -> bool {
    *token == native_token()
}

/// Parses a `0x`-prefixed 20-byte hex address (checksum casing is ignored).
pub fn parse_address(value: &str) -> anyhow::Result<Address> {
    let stripped = value
        .trim()
        .strip_prefix("0x")
        .ok_or_else(|| anyhow::anyhow!("address must be 0x-prefixed hex"))?;
    let bytes = hex::decode(stripped).map_err(|_| anyhow::anyhow!("address is not valid hex"))?;
    if bytes.len() != 20 {
        anyhow::bail!("invalid address length: expected 20 bytes, got {}", bytes.len());
    }
    Ok(Address::from_slice(&bytes))
}

/// Lowercase `0x`-prefixed rendering of an address.
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_bytes()))
}

/// Lowercase `0x`-prefixed rendering of a transaction hash.
pub fn format_hash(hash: &H256) -> String {
    format!("0x{}", hex::encode(hash.as_bytes()))
}

/// Lifecycle status reported by a vault's `status()` view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VaultStatus {
    /// Deployed, not yet open
    Pending,
    /// Open for deposits; principal can still be withdrawn
    Accepting,
    /// Funds are locked until issuance
    Locked,
    /// Structured product issued
    Issued,
    /// Product has matured
    Matured,
    /// A status code this client does not know
    Unknown(u64),
}

impl VaultStatus {
    pub fn from_raw(code: u64) -> Self {
        match code {
            0 => VaultStatus::Pending,
            1 => VaultStatus::Accepting,
            2 => VaultStatus::Locked,
            3 => VaultStatus::Issued,
            4 => VaultStatus::Matured,
            other => VaultStatus::Unknown(other),
        }
    }

    pub fn code(&self) -> u64 {
        match self {
            VaultStatus::Pending => 0,
            VaultStatus::Accepting => 1,
            VaultStatus::Locked => 2,
            VaultStatus::Issued => 3,
            VaultStatus::Matured => 4,
            VaultStatus::Unknown(code) => *code,
        }
    }

    pub fn accepts_deposits(&self) -> bool {
        matches!(self, VaultStatus::Accepting)
    }

    /// Principal can only come back out while the vault is still open.
    pub fn allows_principal_withdraw(&self) -> bool {
        matches!(self, VaultStatus::Accepting)
    }

    /// Coupon and option payouts can be claimed once the vault has opened.
    pub fn allows_yield_withdraw(&self) -> bool {
        matches!(
            self,
            VaultStatus::Accepting | VaultStatus::Locked | VaultStatus::Issued | VaultStatus::Matured
        )
    }
}

impl fmt::Display for VaultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VaultStatus::Pending => write!(f, "PENDING"),
            VaultStatus::Accepting => write!(f, "ACCEPTING"),
            VaultStatus::Locked => write!(f, "LOCKED"),
            VaultStatus::Issued => write!(f, "ISSUED"),
            VaultStatus::Matured => write!(f, "MATURED"),
            VaultStatus::Unknown(code) => write!(f, "UNKNOWN({})", code),
        }
    }
}

/// A transaction for the wallet to sign and broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub from: Address,
    pub to: Address,
    pub data: Vec<u8>,
    pub value: U256,
    pub gas: Option<U256>,
}

/// Mined transaction outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub transaction_hash: H256,
    /// `false` when the transaction reverted
    pub success: bool,
    pub block_number: Option<u64>,
}

// ============================================================================
// CHAIN TRAITS
// ============================================================================

/// The connected wallet and its node.
#[allow(async_fn_in_trait)]
pub trait WalletProvider {
    /// Connected wallet, if any.
    fn address(&self) -> Option<Address>;
    /// Active chain, if the wallet is connected to one.
    fn chain_id(&self) -> Option<u64>;
    async fn native_balance(&self, owner: Address) -> FlowResult<U256>;
    async fn estimate_gas(&self, tx: &TxRequest) -> FlowResult<U256>;
    /// Signs and broadcasts; returns once the transaction has a hash.
    async fn send_transaction(&self, tx: &TxRequest) -> FlowResult<H256>;
    /// Blocks until the transaction is mined.
    async fn wait_for_receipt(&self, tx_hash: H256) -> FlowResult<TxReceipt>;
}

/// ERC-20 reads and approvals.
#[allow(async_fn_in_trait)]
pub trait Erc20Token {
    async fn balance_of(&self, token: Address, owner: Address) -> FlowResult<U256>;
    async fn decimals(&self, token: Address) -> FlowResult<u8>;
    async fn symbol(&self, token: Address) -> FlowResult<String>;
    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> FlowResult<U256>;
    /// Submits `approve(spender, amount)` from the connected wallet.
    async fn approve(&self, token: Address, spender: Address, amount: U256) -> FlowResult<H256>;
}

/// The vault contract surface used by the flows.
#[allow(async_fn_in_trait)]
pub trait VaultContract {
    async fn vault_status(&self, vault: Address) -> FlowResult<VaultStatus>;
    /// Deposit currency (`currency()`).
    async fn vault_currency(&self, vault: Address) -> FlowResult<Address>;
    /// Receipt token minted on deposit (`tokenAddress()`).
    async fn vault_token(&self, vault: Address) -> FlowResult<Address>;
    /// Principal-protected token held by the vault (`PT()`).
    async fn principal_token(&self, vault: Address) -> FlowResult<Address>;
    async fn current_capacity(&self, vault: Address) -> FlowResult<U256>;
    async fn principal_balance(&self, vault: Address, owner: Address) -> FlowResult<U256>;
    async fn coupon_balance(&self, vault: Address, owner: Address) -> FlowResult<U256>;
    async fn option_balance(&self, vault: Address, owner: Address) -> FlowResult<U256>;
    /// Coupon in basis points, the first field of `issuanceCycle()`.
    async fn coupon_rate(&self, vault: Address) -> FlowResult<U256>;
    async fn deposit(&self, vault: Address, amount: U256) -> FlowResult<H256>;
    async fn withdraw_principal(&self, vault: Address) -> FlowResult<H256>;
    async fn withdraw_coupon(&self, vault: Address) -> FlowResult<H256>;
    async fn withdraw_option(&self, vault: Address) -> FlowResult<H256>;
    async fn early_withdraw(&self, vault: Address, blocks: u64) -> FlowResult<H256>;
    /// Admin-only `coupon(address[], uint256[])`.
    async fn distribute_coupon(
        &self,
        vault: Address,
        holders: &[Address],
        amounts: &[U256],
    ) -> FlowResult<H256>;
}

/// Everything a flow needs from the chain.
pub trait ChainGateway: WalletProvider + Erc20Token + VaultContract {}

impl<T: WalletProvider + Erc20Token + VaultContract> ChainGateway for T {}
