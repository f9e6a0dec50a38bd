//! Vault Client CLI
//!
//! Command-line front end for the vault flows and backend reads.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin vaultctl -- --config config/vault-client.toml products
//! cargo run --bin vaultctl -- deposit --vault 0x... --token USDT --amount 250
//! ```
//!
//! Or set the config path via environment variable:
//!
//! ```bash
//! VAULT_CLIENT_CONFIG_PATH=config/vault-client.toml cargo run --bin vaultctl -- positions
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ethereum_types::{Address, U256};
use std::io::BufRead;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use vault_client::admin;
use vault_client::amount::{decimal_to_units, format_units};
use vault_client::chains::{format_address, format_hash, parse_address};
use vault_client::config::{ChainConfig, ClientConfig, SupportedToken};
use vault_client::flow::withdraw::read_position;
use vault_client::{
    AggregatorClient, BackendClient, BalanceCache, DepositIntent, DepositOrchestrator, DepositRequest,
    EarlyWithdrawOrchestrator, Erc20Token, EvmClient, FlightGuard, FlowSettings, IntentLedger,
    QuotePreviewer, VaultContract, WithdrawOrchestrator, WithdrawSelection,
};

#[derive(Parser, Debug)]
#[command(name = "vaultctl")]
#[command(about = "Structured-product vault client - deposit, withdraw and early withdraw")]
struct Args {
    /// Path to configuration file (default: config/vault-client.toml or VAULT_CLIENT_CONFIG_PATH env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Chain to operate on (default: first configured chain)
    #[arg(long)]
    chain_id: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List products on the active chain
    Products,
    /// Show one product
    Product {
        #[arg(long)]
        vault: String,
    },
    /// Products the wallet holds a position in
    Positions,
    /// Deposit/withdraw history of the wallet
    History,
    /// On-chain transaction history of the wallet
    Transactions,
    /// Preview a deposit: wallet balance and expected swap output
    Quote {
        #[arg(long)]
        vault: String,
        /// Token label (e.g. USDC) or address
        #[arg(long)]
        token: String,
        #[arg(long)]
        amount: String,
    },
    /// Deposit into a vault, swapping first if needed
    Deposit {
        #[arg(long)]
        vault: String,
        /// Token label (e.g. USDC) or address
        #[arg(long)]
        token: String,
        #[arg(long)]
        amount: String,
    },
    /// Complete a deposit whose swap went through but whose deposit did not
    Resume {
        #[arg(long)]
        id: String,
    },
    /// List tracked deposit intents
    Intents {
        /// Only resumable intents
        #[arg(long)]
        stuck: bool,
    },
    /// Withdraw principal, coupon and/or option payouts
    Withdraw {
        #[arg(long)]
        vault: String,
        #[arg(long)]
        principal: bool,
        #[arg(long)]
        coupon: bool,
        #[arg(long)]
        option: bool,
    },
    /// Price an early withdrawal
    UnwindQuote {
        #[arg(long)]
        vault: String,
        #[arg(long)]
        blocks: u64,
    },
    /// Quote and execute an early withdrawal
    EarlyWithdraw {
        #[arg(long)]
        vault: String,
        #[arg(long)]
        blocks: u64,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Whether the wallet has redeemed a ref-code
    Whitelist,
    /// Redeem a ref-code
    SignUp {
        #[arg(long)]
        refcode: String,
    },
    /// Admin: pay the current coupon to all vault-token holders
    DistributeCoupon {
        #[arg(long)]
        vault: String,
    },
    /// Admin: set the unwind margin used for early-withdraw pricing
    SetUnwindMargin {
        #[arg(long)]
        vault: String,
        #[arg(long)]
        margin: f64,
    },
    /// Admin: enable or disable early withdrawal
    SetEarlyWithdraw {
        #[arg(long)]
        vault: String,
        #[arg(long)]
        enabled: bool,
    },
}

/// Everything a command may need, built once from the config.
struct Session {
    chain_config: ChainConfig,
    wallet: Address,
    chain: Arc<EvmClient>,
    backend: Arc<BackendClient>,
    swap: Arc<AggregatorClient>,
    settings: Arc<FlowSettings>,
    ledger: IntentLedger,
    cache: BalanceCache,
    guard: FlightGuard,
}

impl Session {
    async fn build(config: &ClientConfig, chain_id: Option<u64>) -> Result<Self> {
        let chain_config = match chain_id {
            Some(id) => config
                .chain_by_id(id)
                .with_context(|| format!("Chain {} is not configured", id))?,
            None => config.chain.first().context("No chain configured")?,
        }
        .clone();

        let wallet = config.wallet_address()?;
        let chain = EvmClient::new(&chain_config, Some(wallet), config.service.receipt_poll_interval_ms)?;
        chain.verify_chain_id().await?;

        let ledger = match &config.service.ledger_path {
            Some(path) => IntentLedger::open(path)?,
            None => IntentLedger::in_memory(),
        };

        Ok(Self {
            wallet,
            chain: Arc::new(chain),
            backend: Arc::new(BackendClient::new(config.service.backend_url.clone())?),
            swap: Arc::new(AggregatorClient::new(&config.service.swap_aggregator_url, &chain_config.name)?),
            settings: Arc::new(FlowSettings::from_config(config)?),
            ledger,
            cache: BalanceCache::new(),
            guard: FlightGuard::new(),
            chain_config,
        })
    }

    fn chain_id(&self) -> u64 {
        self.chain_config.chain_id
    }

    /// Resolves a token given as label or address.
    fn token(&self, value: &str) -> Result<SupportedToken> {
        let tokens = self.settings.tokens_for(self.chain_id())?;
        let found = match parse_address(value) {
            Ok(address) => tokens.iter().find(|t| t.address == address),
            Err(_) => tokens.iter().find(|t| t.label.eq_ignore_ascii_case(value)),
        };
        found
            .cloned()
            .with_context(|| format!("Token {} is not supported on {}", value, self.chain_config.name))
    }

    fn link(&self, tx: &ethereum_types::H256) -> String {
        let hash = format_hash(tx);
        self.chain_config.tx_link(&hash).unwrap_or(hash)
    }

    /// Max capacity of `vault` in currency base units, from backend metadata.
    async fn max_capacity(&self, vault: &Address) -> Result<U256> {
        let product = self.backend.product(vault, self.chain_id()).await?;
        let currency = self.chain.vault_currency(*vault).await?;
        let decimals = match self.settings.find_token(self.chain_id(), &currency) {
            Some(token) => token.decimals,
            None => self.chain.decimals(currency).await?,
        };
        Ok(decimal_to_units(product.max_capacity, decimals)?)
    }

    fn deposit_orchestrator(&self) -> DepositOrchestrator<EvmClient, AggregatorClient, BackendClient> {
        DepositOrchestrator::new(
            Arc::clone(&self.chain),
            Arc::clone(&self.swap),
            Arc::clone(&self.backend),
            Arc::clone(&self.settings),
        )
        .with_cache(self.cache.clone())
        .with_guard(self.guard.clone())
        .with_ledger(self.ledger.clone())
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Asks for confirmation on stdin; gives up when the quote expires.
async fn confirm_prompt(question: String, within: std::time::Duration) -> Result<bool> {
    let answer = tokio::task::spawn_blocking(move || {
        println!("{} [y/N]", question);
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).map(|_| line)
    });
    match tokio::time::timeout(within, answer).await {
        Ok(joined) => {
            let line = joined.context("Prompt task failed")??;
            Ok(matches!(line.trim(), "y" | "Y" | "yes"))
        }
        Err(_) => {
            warn!("Quote expired before confirmation");
            Ok(false)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = if let Some(path) = &args.config {
        info!("Loading configuration from: {}", path);
        ClientConfig::load_from_path(Some(path))?
    } else {
        ClientConfig::load()?
    };
    let ctx = Session::build(&config, args.chain_id).await?;
    info!(
        "Wallet {} on {} (chain ID: {})",
        format_address(&ctx.wallet),
        ctx.chain_config.name,
        ctx.chain_id()
    );

    match args.command {
        Command::Products => print_json(&ctx.backend.products(ctx.chain_id()).await?)?,
        Command::Product { vault } => {
            let vault = parse_address(&vault)?;
            print_json(&ctx.backend.product(&vault, ctx.chain_id()).await?)?;
            let position = read_position(&ctx.settings, ctx.chain.as_ref(), ctx.chain_id(), vault, ctx.wallet).await?;
            let d = position.currency_decimals;
            println!("Status: {}", position.status);
            println!("Principal: {}", format_units(position.principal, d));
            println!("Coupon: {}", format_units(position.coupon, d));
            println!("Option: {}", format_units(position.option, d));
            println!("Withdrawable: {}", position.withdrawable().label());
        }
        Command::Positions => print_json(&ctx.backend.positions(&ctx.wallet).await?)?,
        Command::History => print_json(&ctx.backend.history(&ctx.wallet).await?)?,
        Command::Transactions => {
            print_json(&ctx.backend.transaction_history(&ctx.wallet, ctx.chain_id()).await?)?
        }
        Command::Quote { vault, token, amount } => {
            let vault = parse_address(&vault)?;
            let input = ctx.token(&token)?;
            let intent = DepositIntent {
                input_token: input.address,
                input_amount: amount,
                target_currency: ctx.chain.vault_currency(vault).await?,
                vault,
            };
            let previewer = QuotePreviewer::new(
                Arc::clone(&ctx.chain),
                Arc::clone(&ctx.swap),
                Arc::clone(&ctx.settings),
            )
            .with_cache(ctx.cache.clone());
            let preview = previewer.refresh(&intent).await?;
            println!("Balance: {} {}", format_units(preview.wallet_balance, preview.input_decimals), input.label);
            if preview.needs_swap {
                println!("Swap needed; expected output: {} (base units)", preview.expected_amount);
                if let Some(usd) = preview.amount_out_usd {
                    println!("Expected output: ${:.2}", usd);
                }
            } else {
                println!("No swap needed");
            }
        }
        Command::Deposit { vault, token, amount } => {
            let vault = parse_address(&vault)?;
            let input = ctx.token(&token)?;
            let request = DepositRequest {
                intent: DepositIntent {
                    input_token: input.address,
                    input_amount: amount,
                    target_currency: ctx.chain.vault_currency(vault).await?,
                    vault,
                },
                max_capacity: ctx.max_capacity(&vault).await?,
            };
            let receipt = ctx.deposit_orchestrator().deposit(&request).await.map_err(|e| {
                anyhow::anyhow!("{}", e.user_message())
            })?;
            if let Some(swap_tx) = receipt.swap_tx {
                println!("Swap: {}", ctx.link(&swap_tx));
            }
            println!("Deposit: {}", ctx.link(&receipt.deposit_tx));
            println!("Intent: {}", receipt.record_id);
        }
        Command::Resume { id } => {
            let record = ctx
                .ledger
                .get(&id)
                .await
                .with_context(|| format!("Deposit intent {} not found", id))?;
            let max_capacity = ctx.max_capacity(&record.vault).await?;
            let receipt = ctx
                .deposit_orchestrator()
                .resume(&id, max_capacity)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e.user_message()))?;
            println!("Deposit: {}", ctx.link(&receipt.deposit_tx));
        }
        Command::Intents { stuck } => {
            let records = if stuck { ctx.ledger.resumable().await } else { ctx.ledger.list().await };
            print_json(&records)?;
        }
        Command::Withdraw {
            vault,
            principal,
            coupon,
            option,
        } => {
            let vault = parse_address(&vault)?;
            let selection = WithdrawSelection {
                principal,
                coupon,
                option,
            };
            info!("{}", selection.label());
            let outcome = WithdrawOrchestrator::new(Arc::clone(&ctx.chain), Arc::clone(&ctx.settings))
                .with_cache(ctx.cache.clone())
                .with_guard(ctx.guard.clone())
                .withdraw(vault, selection)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e.user_message()))?;
            for (what, tx) in [
                ("Principal", outcome.principal_tx),
                ("Option", outcome.option_tx),
                ("Coupon", outcome.coupon_tx),
            ] {
                if let Some(tx) = tx {
                    println!("{}: {}", what, ctx.link(&tx));
                }
            }
            if outcome.is_empty() {
                println!("Nothing to withdraw");
            }
        }
        Command::UnwindQuote { vault, blocks } => {
            let vault = parse_address(&vault)?;
            let product = ctx.backend.product(&vault, ctx.chain_id()).await?;
            let orchestrator = EarlyWithdrawOrchestrator::new(
                Arc::clone(&ctx.chain),
                Arc::clone(&ctx.backend),
                Arc::clone(&ctx.settings),
            );
            let quote = orchestrator.quote(vault, blocks, &product.issuance_cycle).await?;
            println!(
                "{} of {} block(s) (block size {})",
                quote.blocks, quote.sizing.total_blocks, quote.sizing.block_size
            );
            println!("Principal token: {}", quote.amount_token);
            println!("Option: {}", quote.amount_option);
            println!("Valid for {}s", quote.remaining().as_secs());
        }
        Command::EarlyWithdraw { vault, blocks, yes } => {
            let vault = parse_address(&vault)?;
            let product = ctx.backend.product(&vault, ctx.chain_id()).await?;
            let orchestrator = EarlyWithdrawOrchestrator::new(
                Arc::clone(&ctx.chain),
                Arc::clone(&ctx.backend),
                Arc::clone(&ctx.settings),
            )
            .with_cache(ctx.cache.clone())
            .with_guard(ctx.guard.clone());
            let quote = orchestrator.quote(vault, blocks, &product.issuance_cycle).await?;

            if !yes {
                let question = format!(
                    "Unwind {} block(s) for {} principal token + {} option?",
                    quote.blocks, quote.amount_token, quote.amount_option
                );
                if !confirm_prompt(question, quote.remaining()).await? {
                    println!("Cancelled");
                    return Ok(());
                }
            }
            let tx = orchestrator
                .execute(&quote)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e.user_message()))?;
            println!("Early withdraw: {}", ctx.link(&tx));
        }
        Command::Whitelist => {
            let listed = ctx.backend.check_whitelist(&ctx.wallet).await?;
            println!("{}", if listed { "Whitelisted" } else { "Not whitelisted" });
        }
        Command::SignUp { refcode } => {
            if ctx.backend.sign_up(&refcode, &ctx.wallet).await? {
                println!("Ref-code accepted");
            } else {
                anyhow::bail!("Ref-code {} was rejected", refcode);
            }
        }
        Command::DistributeCoupon { vault } => {
            let vault = parse_address(&vault)?;
            match admin::distribute_coupon(ctx.chain.as_ref(), &ctx.backend, ctx.chain_id(), vault).await? {
                Some(tx) => println!("Coupon: {}", ctx.link(&tx)),
                None => println!("No holders"),
            }
        }
        Command::SetUnwindMargin { vault, margin } => {
            let vault = parse_address(&vault)?;
            ctx.backend.set_unwind_margin(ctx.chain_id(), &vault, margin).await?;
            println!("Unwind margin set to {}", margin);
        }
        Command::SetEarlyWithdraw { vault, enabled } => {
            let vault = parse_address(&vault)?;
            ctx.backend.set_early_withdraw(ctx.chain_id(), &vault, enabled).await?;
            println!("Early withdraw {}", if enabled { "enabled" } else { "disabled" });
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments first (before initializing logging)
    let args = Args::parse();

    tracing_subscriber::fmt::init();

    tokio::select! {
        result = run(args) => result,
        _ = signal::ctrl_c() => {
            warn!("Interrupted; transactions already sent may still be mined");
            Ok(())
        }
    }
}
