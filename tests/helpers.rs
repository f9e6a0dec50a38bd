//! Shared test helpers for vault client tests
//!
//! This module provides constants, default builders and in-memory
//! implementations of the chain, aggregator and backend traits.

#![allow(dead_code)]

use ethereum_types::{Address, H256, U256};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use vault_client::backend::{Backend, DepositReport, UnwindPrice, WithdrawRequestReport};
use vault_client::chains::{native_token, parse_address, TxReceipt, TxRequest};
use vault_client::config::{
    ChainConfig, ClientConfig, FlowConfig, ServiceConfig, SupportedToken, TokenConfig, WalletConfig,
};
use vault_client::swap::{RouteQuote, RouteRequest, SwapRoute};
use vault_client::{
    DepositOrchestrator, Erc20Token, FlowError, FlowResult, FlowSettings, SwapAggregator, VaultContract,
    VaultStatus, WalletProvider,
};

// ============================================================================
// CONSTANTS
// ============================================================================

// -------------------------------- CHAIN ---------------------------------

/// Dummy chain ID
pub const DUMMY_CHAIN_ID: u64 = 1;

/// Dummy chain name (also the aggregator path segment)
pub const DUMMY_CHAIN_NAME: &str = "ethereum";

// -------------------------------- USERS ---------------------------------

/// Dummy connected wallet (EVM format, 40 hex characters)
pub const DUMMY_WALLET_ADDR: &str = "0x000000000000000000000000000000000000000a";

/// Dummy second wallet (EVM format, 40 hex characters)
pub const DUMMY_OTHER_WALLET_ADDR: &str = "0x000000000000000000000000000000000000000b";

// ------------------------- TOKENS AND CONTRACTS -------------------------

/// Dummy vault contract
pub const DUMMY_VAULT_ADDR: &str = "0x000000000000000000000000000000000000000c";

/// Dummy USDC token (the vault currency, 6 decimals)
pub const DUMMY_USDC_ADDR: &str = "0x000000000000000000000000000000000000000d";

/// Dummy USDT token (swap input, 6 decimals)
pub const DUMMY_USDT_ADDR: &str = "0x000000000000000000000000000000000000000e";

/// Dummy vault receipt token (`tokenAddress()`, 6 decimals)
pub const DUMMY_VAULT_TOKEN_ADDR: &str = "0x000000000000000000000000000000000000000f";

/// Dummy principal-protected token (`PT()`)
pub const DUMMY_PT_ADDR: &str = "0x0000000000000000000000000000000000000010";

/// Dummy aggregator router
pub const DUMMY_ROUTER_ADDR: &str = "0x0000000000000000000000000000000000000011";

// -------------------------------- OTHER ---------------------------------

/// Dummy transaction hash (64 hex characters)
pub const DUMMY_TX_HASH: &str = "0x0000000000000000000000000000000000000000000000000000000000000012";

/// Default wallet balance of USDC and USDT (1000 tokens, 6 decimals)
pub const DUMMY_TOKEN_BALANCE: u64 = 1_000_000_000;

/// Gas estimate returned by the mock chain
pub const DUMMY_GAS_ESTIMATE: u64 = 200_000;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Parses one of the address constants above.
pub fn addr(value: &str) -> Address {
    parse_address(value).unwrap()
}

pub fn wallet() -> Address {
    addr(DUMMY_WALLET_ADDR)
}

pub fn vault() -> Address {
    addr(DUMMY_VAULT_ADDR)
}

pub fn usdc() -> Address {
    addr(DUMMY_USDC_ADDR)
}

pub fn usdt() -> Address {
    addr(DUMMY_USDT_ADDR)
}

pub fn vault_token() -> Address {
    addr(DUMMY_VAULT_TOKEN_ADDR)
}

pub fn router() -> Address {
    addr(DUMMY_ROUTER_ADDR)
}

/// `amount` whole tokens in 6-decimal base units.
pub fn units6(amount: u64) -> U256 {
    U256::from(amount) * U256::exp10(6)
}

/// Create the default supported token list (USDC, USDT, native ETH).
pub fn create_default_tokens() -> Vec<SupportedToken> {
    vec![
        SupportedToken {
            label: "USDC".to_string(),
            address: usdc(),
            decimals: 6,
        },
        SupportedToken {
            label: "USDT".to_string(),
            address: usdt(),
            decimals: 6,
        },
        SupportedToken {
            label: "ETH".to_string(),
            address: native_token(),
            decimals: 18,
        },
    ]
}

/// Create flow settings with test values.
/// The DONE display delay is zero so flows finish immediately.
pub fn create_default_flow_config() -> FlowConfig {
    FlowConfig {
        done_display_ms: 0,
        ..FlowConfig::default()
    }
}

pub fn create_default_settings() -> Arc<FlowSettings> {
    create_settings(create_default_flow_config())
}

pub fn create_settings(flow: FlowConfig) -> Arc<FlowSettings> {
    let mut tokens = HashMap::new();
    tokens.insert(DUMMY_CHAIN_ID, create_default_tokens());
    Arc::new(FlowSettings::new(flow, tokens))
}

/// Create a default chain config with test values.
/// This can be customized using Rust's struct update syntax:
/// ```
/// let chain = ChainConfig {
///     chain_id: 8453,
///     ..create_default_chain_config()
/// };
/// ```
pub fn create_default_chain_config() -> ChainConfig {
    ChainConfig {
        name: DUMMY_CHAIN_NAME.to_string(),
        chain_id: DUMMY_CHAIN_ID,
        rpc_url: "http://127.0.0.1:8545".to_string(),
        explorer_url: Some("https://etherscan.io".to_string()),
        tokens: vec![
            TokenConfig {
                label: "USDC".to_string(),
                address: DUMMY_USDC_ADDR.to_string(),
                decimals: 6,
            },
            TokenConfig {
                label: "USDT".to_string(),
                address: DUMMY_USDT_ADDR.to_string(),
                decimals: 6,
            },
        ],
    }
}

/// Create a minimal valid client config.
pub fn create_default_client_config() -> ClientConfig {
    ClientConfig {
        service: ServiceConfig {
            backend_url: "http://127.0.0.1:3000".to_string(),
            swap_aggregator_url: "http://127.0.0.1:3001".to_string(),
            receipt_poll_interval_ms: 1000,
            ledger_path: None,
        },
        flow: FlowConfig::default(),
        wallet: WalletConfig {
            address: DUMMY_WALLET_ADDR.to_string(),
        },
        chain: vec![create_default_chain_config()],
    }
}

// ============================================================================
// CALL LOG
// ============================================================================

/// Ordered log of mock calls, shared by the chain, aggregator and backend mocks.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

/// Calls that submit a transaction.
pub const TX_CALLS: &[&str] = &[
    "approve",
    "send_transaction",
    "deposit",
    "withdraw_principal",
    "withdraw_coupon",
    "withdraw_option",
    "early_withdraw",
    "distribute_coupon",
];

impl CallLog {
    pub fn record(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == name).count()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.as_str() == name)
    }

    /// Transaction-submitting calls, in order.
    pub fn tx_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| TX_CALLS.contains(&c.as_str()))
            .collect()
    }

    pub fn last(&self) -> Option<String> {
        self.calls().last().cloned()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

// ============================================================================
// MOCK CHAIN
// ============================================================================

#[derive(Debug)]
pub struct ChainState {
    pub wallet: Option<Address>,
    pub chain_id: Option<u64>,
    pub status: VaultStatus,
    pub currency: Address,
    pub vault_token: Address,
    pub principal_token: Address,
    pub capacity: U256,
    pub coupon_rate: U256,
    pub principal: U256,
    pub coupon: U256,
    pub option: U256,
    /// (token, owner) -> balance
    pub balances: HashMap<(Address, Address), U256>,
    pub native: HashMap<Address, U256>,
    /// (token, owner, spender) -> allowance
    pub allowances: HashMap<(Address, Address, Address), U256>,
    pub decimals: HashMap<Address, u8>,
    pub symbols: HashMap<Address, String>,
    /// Call name -> error returned by that call
    pub failures: HashMap<String, FlowError>,
    /// Calls whose transactions are mined but revert
    pub reverting: HashSet<String>,
    /// Calls whose receipts cannot be fetched, with the error returned
    pub receipt_failures: HashMap<String, FlowError>,
    /// Submitted transactions that revert
    pub reverted: HashSet<H256>,
    /// Transaction hash -> submitting call
    pub submitted: HashMap<H256, String>,
    pub approvals: Vec<(Address, Address, U256)>,
    pub deposits: Vec<(Address, U256)>,
    pub sent: Vec<TxRequest>,
    pub early_withdraws: Vec<(Address, u64)>,
    pub coupons: Vec<(Vec<Address>, Vec<U256>)>,
    next_tx: u64,
}

/// In-memory chain: a wallet, one vault and a handful of tokens.
#[derive(Debug, Clone)]
pub struct MockChain {
    pub log: CallLog,
    state: Arc<Mutex<ChainState>>,
}

impl MockChain {
    pub fn new(log: CallLog) -> Self {
        let owner = wallet();
        let mut balances = HashMap::new();
        balances.insert((usdc(), owner), U256::from(DUMMY_TOKEN_BALANCE));
        balances.insert((usdt(), owner), U256::from(DUMMY_TOKEN_BALANCE));
        let mut native = HashMap::new();
        native.insert(owner, U256::exp10(19));
        let mut decimals = HashMap::new();
        decimals.insert(usdc(), 6);
        decimals.insert(usdt(), 6);
        decimals.insert(vault_token(), 6);
        let mut symbols = HashMap::new();
        symbols.insert(usdc(), "USDC".to_string());
        symbols.insert(usdt(), "USDT".to_string());

        Self {
            log,
            state: Arc::new(Mutex::new(ChainState {
                wallet: Some(owner),
                chain_id: Some(DUMMY_CHAIN_ID),
                status: VaultStatus::Accepting,
                currency: usdc(),
                vault_token: vault_token(),
                principal_token: addr(DUMMY_PT_ADDR),
                capacity: U256::zero(),
                coupon_rate: U256::from(150u64),
                principal: U256::zero(),
                coupon: U256::zero(),
                option: U256::zero(),
                balances,
                native,
                allowances: HashMap::new(),
                decimals,
                symbols,
                failures: HashMap::new(),
                reverting: HashSet::new(),
                receipt_failures: HashMap::new(),
                reverted: HashSet::new(),
                submitted: HashMap::new(),
                approvals: Vec::new(),
                deposits: Vec::new(),
                sent: Vec::new(),
                early_withdraws: Vec::new(),
                coupons: Vec::new(),
                next_tx: 1,
            })),
        }
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().unwrap()
    }

    pub fn with_status(self, status: VaultStatus) -> Self {
        self.state().status = status;
        self
    }

    pub fn with_capacity(self, capacity: U256) -> Self {
        self.state().capacity = capacity;
        self
    }

    pub fn with_balance(self, token: Address, amount: U256) -> Self {
        self.state().balances.insert((token, wallet()), amount);
        self
    }

    pub fn with_allowance(self, token: Address, spender: Address, amount: U256) -> Self {
        self.state().allowances.insert((token, wallet(), spender), amount);
        self
    }

    pub fn with_positions(self, principal: U256, coupon: U256, option: U256) -> Self {
        {
            let mut state = self.state();
            state.principal = principal;
            state.coupon = coupon;
            state.option = option;
        }
        self
    }

    pub fn without_wallet(self) -> Self {
        self.state().wallet = None;
        self
    }

    /// Makes `call` fail with `error`.
    pub fn fail_on(&self, call: &str, error: FlowError) {
        self.state().failures.insert(call.to_string(), error);
    }

    /// Makes transactions sent by `call` revert on-chain.
    pub fn revert_on(&self, call: &str) {
        self.state().reverting.insert(call.to_string());
    }

    /// Makes receipt lookups for transactions sent by `call` fail with `error`.
    pub fn fail_receipt_of(&self, call: &str, error: FlowError) {
        self.state().receipt_failures.insert(call.to_string(), error);
    }

    /// Clears injected failures; transactions already reverted stay reverted.
    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.failures.clear();
        state.reverting.clear();
        state.receipt_failures.clear();
    }

    fn enter(&self, call: &str) -> FlowResult<()> {
        self.log.record(call);
        match self.state().failures.get(call) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn submit(&self, call: &str) -> H256 {
        let mut state = self.state();
        let hash = H256::from_low_u64_be(state.next_tx);
        state.next_tx += 1;
        state.submitted.insert(hash, call.to_string());
        if state.reverting.contains(call) {
            state.reverted.insert(hash);
        }
        hash
    }
}

impl WalletProvider for MockChain {
    fn address(&self) -> Option<Address> {
        self.state().wallet
    }

    fn chain_id(&self) -> Option<u64> {
        self.state().chain_id
    }

    async fn native_balance(&self, owner: Address) -> FlowResult<U256> {
        self.enter("native_balance")?;
        Ok(self.state().native.get(&owner).copied().unwrap_or_default())
    }

    async fn estimate_gas(&self, _tx: &TxRequest) -> FlowResult<U256> {
        self.enter("estimate_gas")?;
        Ok(U256::from(DUMMY_GAS_ESTIMATE))
    }

    async fn send_transaction(&self, tx: &TxRequest) -> FlowResult<H256> {
        self.enter("send_transaction")?;
        self.state().sent.push(tx.clone());
        Ok(self.submit("send_transaction"))
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> FlowResult<TxReceipt> {
        self.enter("wait_for_receipt")?;
        let state = self.state();
        let call = state.submitted.get(&tx_hash).cloned().unwrap_or_default();
        if let Some(error) = state.receipt_failures.get(&call) {
            return Err(error.clone());
        }
        Ok(TxReceipt {
            transaction_hash: tx_hash,
            success: !state.reverted.contains(&tx_hash),
            block_number: Some(100),
        })
    }
}

impl Erc20Token for MockChain {
    async fn balance_of(&self, token: Address, owner: Address) -> FlowResult<U256> {
        self.enter("balance_of")?;
        Ok(self.state().balances.get(&(token, owner)).copied().unwrap_or_default())
    }

    async fn decimals(&self, token: Address) -> FlowResult<u8> {
        self.enter("decimals")?;
        Ok(self.state().decimals.get(&token).copied().unwrap_or(18))
    }

    async fn symbol(&self, token: Address) -> FlowResult<String> {
        self.enter("symbol")?;
        Ok(self.state().symbols.get(&token).cloned().unwrap_or_default())
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> FlowResult<U256> {
        self.enter("allowance")?;
        Ok(self
            .state()
            .allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default())
    }

    async fn approve(&self, token: Address, spender: Address, amount: U256) -> FlowResult<H256> {
        self.enter("approve")?;
        {
            let mut state = self.state();
            let owner = state.wallet.unwrap_or_default();
            state.allowances.insert((token, owner, spender), amount);
            state.approvals.push((token, spender, amount));
        }
        Ok(self.submit("approve"))
    }
}

impl VaultContract for MockChain {
    async fn vault_status(&self, _vault: Address) -> FlowResult<VaultStatus> {
        self.enter("vault_status")?;
        Ok(self.state().status)
    }

    async fn vault_currency(&self, _vault: Address) -> FlowResult<Address> {
        self.enter("vault_currency")?;
        Ok(self.state().currency)
    }

    async fn vault_token(&self, _vault: Address) -> FlowResult<Address> {
        self.enter("vault_token")?;
        Ok(self.state().vault_token)
    }

    async fn principal_token(&self, _vault: Address) -> FlowResult<Address> {
        self.enter("principal_token")?;
        Ok(self.state().principal_token)
    }

    async fn current_capacity(&self, _vault: Address) -> FlowResult<U256> {
        self.enter("current_capacity")?;
        Ok(self.state().capacity)
    }

    async fn principal_balance(&self, _vault: Address, _owner: Address) -> FlowResult<U256> {
        self.enter("principal_balance")?;
        Ok(self.state().principal)
    }

    async fn coupon_balance(&self, _vault: Address, _owner: Address) -> FlowResult<U256> {
        self.enter("coupon_balance")?;
        Ok(self.state().coupon)
    }

    async fn option_balance(&self, _vault: Address, _owner: Address) -> FlowResult<U256> {
        self.enter("option_balance")?;
        Ok(self.state().option)
    }

    async fn coupon_rate(&self, _vault: Address) -> FlowResult<U256> {
        self.enter("coupon_rate")?;
        Ok(self.state().coupon_rate)
    }

    async fn deposit(&self, vault: Address, amount: U256) -> FlowResult<H256> {
        self.enter("deposit")?;
        {
            let mut state = self.state();
            state.capacity = state.capacity + amount;
            state.deposits.push((vault, amount));
        }
        Ok(self.submit("deposit"))
    }

    async fn withdraw_principal(&self, _vault: Address) -> FlowResult<H256> {
        self.enter("withdraw_principal")?;
        Ok(self.submit("withdraw_principal"))
    }

    async fn withdraw_coupon(&self, _vault: Address) -> FlowResult<H256> {
        self.enter("withdraw_coupon")?;
        Ok(self.submit("withdraw_coupon"))
    }

    async fn withdraw_option(&self, _vault: Address) -> FlowResult<H256> {
        self.enter("withdraw_option")?;
        Ok(self.submit("withdraw_option"))
    }

    async fn early_withdraw(&self, vault: Address, blocks: u64) -> FlowResult<H256> {
        self.enter("early_withdraw")?;
        self.state().early_withdraws.push((vault, blocks));
        Ok(self.submit("early_withdraw"))
    }

    async fn distribute_coupon(
        &self,
        _vault: Address,
        holders: &[Address],
        amounts: &[U256],
    ) -> FlowResult<H256> {
        self.enter("distribute_coupon")?;
        self.state().coupons.push((holders.to_vec(), amounts.to_vec()));
        Ok(self.submit("distribute_coupon"))
    }
}

// ============================================================================
// MOCK AGGREGATOR
// ============================================================================

/// In-memory aggregator quoting a fixed output amount.
#[derive(Debug)]
pub struct MockSwap {
    pub log: CallLog,
    pub amount_out: U256,
    /// Number of upcoming quotes that come back already stale
    pub stale_quotes: Mutex<usize>,
    pub failure: Mutex<Option<FlowError>>,
    pub build_failure: Mutex<Option<FlowError>>,
    pub requests: Mutex<Vec<RouteRequest>>,
    pub build_slippages: Mutex<Vec<u32>>,
}

impl MockSwap {
    pub fn new(log: CallLog, amount_out: U256) -> Self {
        Self {
            log,
            amount_out,
            stale_quotes: Mutex::new(0),
            failure: Mutex::new(None),
            build_failure: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            build_slippages: Mutex::new(Vec::new()),
        }
    }

    pub fn stale_for(&self, quotes: usize) {
        *self.stale_quotes.lock().unwrap() = quotes;
    }

    /// Makes route quotes fail with `error`.
    pub fn fail_with(&self, error: FlowError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    /// Makes route builds fail with `error`.
    pub fn fail_build_with(&self, error: FlowError) {
        *self.build_failure.lock().unwrap() = Some(error);
    }
}

impl SwapAggregator for MockSwap {
    async fn quote_route(&self, request: &RouteRequest) -> FlowResult<RouteQuote> {
        self.log.record("quote_route");
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        self.requests.lock().unwrap().push(request.clone());

        let fetched_at = {
            let mut stale = self.stale_quotes.lock().unwrap();
            if *stale > 0 {
                *stale -= 1;
                Instant::now()
                    .checked_sub(Duration::from_secs(120))
                    .unwrap_or_else(Instant::now)
            } else {
                Instant::now()
            }
        };

        Ok(RouteQuote {
            token_in: request.token_in,
            token_out: request.token_out,
            amount_in: request.amount_in,
            amount_out: self.amount_out,
            amount_out_usd: Some(249.5),
            deadline: request.deadline,
            route_summary: serde_json::json!({ "route": "mock" }),
            fetched_at,
        })
    }

    async fn build_route(&self, quote: &RouteQuote, _sender: Address, slippage_bps: u32) -> FlowResult<SwapRoute> {
        self.log.record("build_route");
        if let Some(error) = self.build_failure.lock().unwrap().clone() {
            return Err(error);
        }
        self.build_slippages.lock().unwrap().push(slippage_bps);
        Ok(SwapRoute {
            token_in: quote.token_in,
            token_out: quote.token_out,
            amount_in: quote.amount_in,
            amount_out: quote.amount_out,
            router_address: router(),
            call_data: vec![0xde, 0xad, 0xbe, 0xef],
            route_summary: quote.route_summary.clone(),
            fetched_at: quote.fetched_at,
        })
    }
}

// ============================================================================
// MOCK BACKEND
// ============================================================================

#[derive(Debug)]
pub struct MockBackend {
    pub log: CallLog,
    pub price: UnwindPrice,
    /// Reports fail when set (they are best-effort)
    pub fail_reports: bool,
    pub deposit_reports: Mutex<Vec<DepositReport>>,
    pub withdraw_reports: Mutex<Vec<WithdrawRequestReport>>,
}

impl MockBackend {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            price: UnwindPrice {
                amount_token: 190.5,
                amount_option: 4.25,
            },
            fail_reports: false,
            deposit_reports: Mutex::new(Vec::new()),
            withdraw_reports: Mutex::new(Vec::new()),
        }
    }
}

impl Backend for MockBackend {
    async fn report_deposit(&self, report: &DepositReport) -> anyhow::Result<()> {
        self.log.record("report_deposit");
        if self.fail_reports {
            anyhow::bail!("backend unavailable");
        }
        self.deposit_reports.lock().unwrap().push(report.clone());
        Ok(())
    }

    async fn unwind_price(
        &self,
        _chain_id: u64,
        _wallet: Address,
        _vault: Address,
        _blocks: u64,
    ) -> anyhow::Result<UnwindPrice> {
        self.log.record("unwind_price");
        Ok(self.price.clone())
    }

    async fn report_withdraw_request(&self, report: &WithdrawRequestReport) -> anyhow::Result<()> {
        self.log.record("report_withdraw_request");
        if self.fail_reports {
            anyhow::bail!("backend unavailable");
        }
        self.withdraw_reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

// ============================================================================
// HARNESS
// ============================================================================

/// Mocks wired to one shared call log.
pub struct Harness {
    pub log: CallLog,
    pub chain: Arc<MockChain>,
    pub swap: Arc<MockSwap>,
    pub backend: Arc<MockBackend>,
}

/// Create mocks with default state; swaps return 249.5 USDC.
pub fn create_default_harness() -> Harness {
    create_harness(|chain| chain)
}

/// Create mocks, customizing the chain before it is shared.
pub fn create_harness(customize: impl FnOnce(MockChain) -> MockChain) -> Harness {
    let log = CallLog::default();
    Harness {
        chain: Arc::new(customize(MockChain::new(log.clone()))),
        swap: Arc::new(MockSwap::new(log.clone(), U256::from(249_500_000u64))),
        backend: Arc::new(MockBackend::new(log.clone())),
        log,
    }
}

impl Harness {
    pub fn deposit_orchestrator(&self) -> DepositOrchestrator<MockChain, MockSwap, MockBackend> {
        self.deposit_orchestrator_with(create_default_settings())
    }

    pub fn deposit_orchestrator_with(
        &self,
        settings: Arc<FlowSettings>,
    ) -> DepositOrchestrator<MockChain, MockSwap, MockBackend> {
        DepositOrchestrator::new(
            Arc::clone(&self.chain),
            Arc::clone(&self.swap),
            Arc::clone(&self.backend),
            settings,
        )
    }
}
