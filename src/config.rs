//! Configuration Management Module
//!
//! This module handles loading and managing configuration for the vault client.
//! Configuration includes backend and swap aggregator endpoints, flow tuning
//! constants, the wallet address, and per-chain RPC and token settings.

use ethereum_types::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

use crate::chains::parse_address;

/// Environment variable that overrides the default config path.
pub const CONFIG_PATH_ENV: &str = "VAULT_CLIENT_CONFIG_PATH";
/// Default config path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/vault-client.toml";

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure containing all vault client settings.
///
/// This structure holds configuration for:
/// - Backend and swap aggregator connection
/// - Flow tuning (slippage, gas margin, approval buffer, timings)
/// - Wallet address used as `from` for every transaction
/// - Chains (one or more, each with its supported token list)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Service configuration (backend URL, aggregator URL, polling)
    pub service: ServiceConfig,
    /// Flow tuning constants
    #[serde(default)]
    pub flow: FlowConfig,
    /// Wallet configuration
    pub wallet: WalletConfig,
    /// Chain configurations (use [[chain]] in TOML for multiple)
    #[serde(default)]
    pub chain: Vec<ChainConfig>,
}

/// Service-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Product backend base URL (e.g., "https://api.example.com")
    pub backend_url: String,
    /// Swap aggregator base URL (e.g., "https://aggregator-api.kyberswap.com")
    pub swap_aggregator_url: String,
    /// Interval between receipt polls in milliseconds
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
    /// Path of the JSON deposit intent ledger; in-memory only when unset
    #[serde(default)]
    pub ledger_path: Option<String>,
}

/// Flow tuning constants. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowConfig {
    /// Slippage tolerance used when quoting a route (basis points)
    #[serde(default = "default_quote_slippage_bps")]
    pub quote_slippage_bps: u32,
    /// Slippage tolerance used when building the route calldata (basis points)
    #[serde(default = "default_build_slippage_bps")]
    pub build_slippage_bps: u32,
    /// Gas estimate margin in percent (50 means estimate * 1.5)
    #[serde(default = "default_gas_margin_pct")]
    pub gas_margin_pct: u64,
    /// Extra allowance granted on top of the deposit amount (basis points)
    #[serde(default = "default_approve_buffer_bps")]
    pub approve_buffer_bps: u32,
    /// How long a flow stays in DONE before resetting to NONE
    #[serde(default = "default_done_display_ms")]
    pub done_display_ms: u64,
    /// Route deadline offset from now (seconds)
    #[serde(default = "default_route_deadline_secs")]
    pub route_deadline_secs: u64,
    /// Routes older than this are re-quoted once before executing
    #[serde(default = "default_max_route_age_secs")]
    pub max_route_age_secs: u64,
    /// Lifetime of an unwind quote (seconds)
    #[serde(default = "default_unwind_quote_ttl_secs")]
    pub unwind_quote_ttl_secs: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            quote_slippage_bps: default_quote_slippage_bps(),
            build_slippage_bps: default_build_slippage_bps(),
            gas_margin_pct: default_gas_margin_pct(),
            approve_buffer_bps: default_approve_buffer_bps(),
            done_display_ms: default_done_display_ms(),
            route_deadline_secs: default_route_deadline_secs(),
            max_route_age_secs: default_max_route_age_secs(),
            unwind_quote_ttl_secs: default_unwind_quote_ttl_secs(),
        }
    }
}

/// Wallet configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Wallet address (0x-prefixed hex). The RPC node holds the key.
    pub address: String,
}

/// Configuration for an EVM chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Human-readable name; also the swap aggregator's path segment (e.g. "ethereum", "base")
    pub name: String,
    /// Chain ID (e.g., 8453 for Base)
    pub chain_id: u64,
    /// RPC endpoint URL
    pub rpc_url: String,
    /// Block explorer base URL, used for printing transaction links
    #[serde(default)]
    pub explorer_url: Option<String>,
    /// Supported input tokens (use [[chain.token]] in TOML)
    #[serde(default, rename = "token")]
    pub tokens: Vec<TokenConfig>,
}

/// A supported token as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Display label (e.g., "USDC"); used to decide whether a swap is needed
    pub label: String,
    /// Token address; the 0xEeee... sentinel denotes the native coin
    pub address: String,
    /// Token decimals
    pub decimals: u8,
}

/// A supported token with its address parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedToken {
    pub label: String,
    pub address: Address,
    pub decimals: u8,
}

fn default_receipt_poll_interval_ms() -> u64 {
    1000
}

fn default_quote_slippage_bps() -> u32 {
    100
}

fn default_build_slippage_bps() -> u32 {
    15
}

fn default_gas_margin_pct() -> u64 {
    50
}

fn default_approve_buffer_bps() -> u32 {
    5
}

fn default_done_display_ms() -> u64 {
    1500
}

fn default_route_deadline_secs() -> u64 {
    1800
}

fn default_max_route_age_secs() -> u64 {
    60
}

fn default_unwind_quote_ttl_secs() -> u64 {
    60
}

impl ChainConfig {
    /// Parses this chain's token list.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<SupportedToken>)` - Tokens with parsed addresses
    /// * `Err(anyhow::Error)` - A token address is not valid hex
    pub fn supported_tokens(&self) -> anyhow::Result<Vec<SupportedToken>> {
        self.tokens
            .iter()
            .map(|t| {
                Ok(SupportedToken {
                    label: t.label.clone(),
                    address: parse_address(&t.address).map_err(|e| {
                        anyhow::anyhow!("Invalid address for token {} on {}: {}", t.label, self.name, e)
                    })?,
                    decimals: t.decimals,
                })
            })
            .collect()
    }

    /// Explorer link for a transaction, if an explorer is configured.
    pub fn tx_link(&self, tx_hash: &str) -> Option<String> {
        self.explorer_url
            .as_ref()
            .map(|base| format!("{}/tx/{}", base.trim_end_matches('/'), tx_hash))
    }
}

impl ClientConfig {
    /// Loads configuration from a TOML file.
    ///
    /// This function:
    /// 1. Uses the provided path, else VAULT_CLIENT_CONFIG_PATH, else config/vault-client.toml
    /// 2. If it exists, loads and parses the configuration
    /// 3. Validates the configuration
    /// 4. If it doesn't exist, returns an error asking user to copy template
    ///
    /// # Arguments
    ///
    /// * `path` - Optional path to config file. If None, uses VAULT_CLIENT_CONFIG_PATH env var or default.
    ///
    /// # Returns
    ///
    /// * `Ok(ClientConfig)` - Successfully loaded and validated configuration
    /// * `Err(anyhow::Error)` - Failed to load configuration, file doesn't exist, or validation failed
    pub fn load_from_path(path: Option<&str>) -> anyhow::Result<Self> {
        let config_path = path
            .map(|p| p.to_string())
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        if std::path::Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: ClientConfig = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Err(anyhow::anyhow!(
                "Configuration file '{}' not found. Please copy the template:\n\
                cp config/vault-client.template.toml config/vault-client.toml\n\
                Then edit config/vault-client.toml with your actual values.",
                config_path
            ))
        }
    }

    /// Loads configuration from the default location.
    ///
    /// This is equivalent to calling `load_from_path(None)`.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from_path(None)
    }

    /// Get chain config by chain ID
    pub fn chain_by_id(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chain.iter().find(|c| c.chain_id == chain_id)
    }

    /// Parsed wallet address.
    pub fn wallet_address(&self) -> anyhow::Result<Address> {
        parse_address(&self.wallet.address)
            .map_err(|e| anyhow::anyhow!("Invalid wallet address '{}': {}", self.wallet.address, e))
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// Checks:
    /// - At least one chain is configured
    /// - Chain IDs are unique
    /// - Every chain has at least one token, token labels are unique per chain
    /// - Wallet and token addresses are 20-byte hex
    /// - The receipt poll interval is positive
    /// - Slippage and buffer values are below 100%
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Configuration is valid
    /// * `Err(anyhow::Error)` - Validation failed with error message
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chain.is_empty() {
            anyhow::bail!("Configuration error: At least one [[chain]] must be configured");
        }

        let mut seen_ids = HashSet::new();
        for chain in &self.chain {
            if !seen_ids.insert(chain.chain_id) {
                anyhow::bail!(
                    "Configuration error: Chain ID {} is configured more than once",
                    chain.chain_id
                );
            }

            if chain.tokens.is_empty() {
                anyhow::bail!(
                    "Configuration error: Chain {} ({}) has no [[chain.token]] entries",
                    chain.name,
                    chain.chain_id
                );
            }

            let mut labels = HashSet::new();
            for token in &chain.tokens {
                if !labels.insert(token.label.to_uppercase()) {
                    anyhow::bail!(
                        "Configuration error: Token label {} appears twice on chain {}",
                        token.label,
                        chain.chain_id
                    );
                }
            }
            chain.supported_tokens()?;

            reqwest::Url::from_str(&chain.rpc_url).map_err(|e| {
                anyhow::anyhow!("Configuration error: Invalid rpc_url for chain {}: {}", chain.chain_id, e)
            })?;
        }

        self.wallet_address()?;

        if self.service.receipt_poll_interval_ms == 0 {
            anyhow::bail!("Configuration error: service.receipt_poll_interval_ms must be positive");
        }

        for (name, bps) in [
            ("quote_slippage_bps", self.flow.quote_slippage_bps),
            ("build_slippage_bps", self.flow.build_slippage_bps),
            ("approve_buffer_bps", self.flow.approve_buffer_bps),
        ] {
            if bps >= 10_000 {
                anyhow::bail!("Configuration error: flow.{} must be below 10000, got {}", name, bps);
            }
        }

        Ok(())
    }
}
