//! Vault Client Library
//!
//! Wallet-side orchestration for structured-product vaults on EVM chains:
//! swap-and-deposit, withdrawal of principal/coupon/option balances, and
//! quoted early withdrawal (unwind).

pub mod admin;
pub mod amount;
pub mod backend;
pub mod cache;
pub mod chains;
pub mod config;
pub mod error;
pub mod flow;
pub mod ledger;
pub mod swap;

pub use backend::{Backend, BackendClient};
pub use cache::BalanceCache;
pub use chains::{ChainGateway, Erc20Token, EvmClient, VaultContract, VaultStatus, WalletProvider};
pub use config::ClientConfig;
pub use error::{FlowError, FlowResult};
pub use flow::deposit::{DepositIntent, DepositOrchestrator, DepositRequest};
pub use flow::guard::FlightGuard;
pub use flow::preview::QuotePreviewer;
pub use flow::unwind::EarlyWithdrawOrchestrator;
pub use flow::withdraw::{WithdrawOrchestrator, WithdrawSelection};
pub use flow::FlowSettings;
pub use ledger::IntentLedger;
pub use swap::{AggregatorClient, SwapAggregator};
