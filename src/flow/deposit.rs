//! Swap-and-Deposit Orchestrator
//!
//! Turns a user's choice of input token and amount into a vault deposit,
//! swapping through the aggregator first when the input token is not the
//! vault's currency.
//!
//! Status: `NONE → {SWAP_APPROVE → SWAPPING}? → DEPOSIT_APPROVE? → DEPOSITING
//! → DONE → NONE`. Approval steps are skipped when the allowance already
//! covers the amount; any failure resets to NONE.
//!
//! Every deposit is tracked in the [`IntentLedger`]. If the deposit leg fails
//! after the swap leg was mined, the record is marked Stuck and
//! [`DepositOrchestrator::resume`] deposits the swapped amount later. A Stuck
//! record whose deposit was already sent is settled from that transaction's
//! receipt first; a new deposit is only sent if the old one reverted.

use ethereum_types::{Address, H256, U256};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};

use super::guard::FlightGuard;
use super::status::{DepositStatus, StatusTrack};
use super::{
    active_wallet, best_effort, cached_allowance, cached_balance, confirm, needs_swap, token_decimals,
    token_label, FlowSettings,
};
use crate::amount::{apply_bps_buffer, format_units, parse_units, with_margin_pct};
use crate::backend::{Backend, DepositReport};
use crate::cache::BalanceCache;
use crate::chains::{format_address, format_hash, is_native, native_token, ChainGateway, TxRequest};
use crate::error::{FlowError, FlowResult};
use crate::ledger::{DepositPhase, IntentLedger, NewDeposit};
use crate::swap::{RouteRequest, SwapAggregator, SwapRoute};

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositIntent {
    pub input_token: Address,
    /// Decimal string in input token units (e.g. "250.5")
    pub input_amount: String,
    pub target_currency: Address,
    pub vault: Address,
}

/// A deposit intent plus the vault's max capacity in currency base units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositRequest {
    pub intent: DepositIntent,
    pub max_capacity: U256,
}

/// Outcome of a completed deposit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositReceipt {
    pub record_id: String,
    /// Deposited amount in currency base units
    pub deposit_amount: U256,
    pub deposit_tx: H256,
    pub swap_tx: Option<H256>,
    /// Approval transactions, in submission order
    pub approvals: Vec<H256>,
}

/// Tracks what has happened so far so a failure can be filed correctly.
#[derive(Debug, Default)]
struct Progress {
    record_id: Option<String>,
    swapped: Option<(U256, H256)>,
    /// Set as soon as the deposit transaction is submitted
    deposit_tx: Option<H256>,
}

/// Runs swap-and-deposit flows for the connected wallet.
pub struct DepositOrchestrator<C, S, B> {
    chain: Arc<C>,
    swap: Arc<S>,
    backend: Arc<B>,
    settings: Arc<FlowSettings>,
    cache: BalanceCache,
    guard: FlightGuard,
    ledger: IntentLedger,
    status: StatusTrack<DepositStatus>,
}

impl<C, S, B> DepositOrchestrator<C, S, B>
where
    C: ChainGateway,
    S: SwapAggregator,
    B: Backend,
{
    pub fn new(chain: Arc<C>, swap: Arc<S>, backend: Arc<B>, settings: Arc<FlowSettings>) -> Self {
        Self {
            chain,
            swap,
            backend,
            settings,
            cache: BalanceCache::new(),
            guard: FlightGuard::new(),
            ledger: IntentLedger::in_memory(),
            status: StatusTrack::new("deposit"),
        }
    }

    /// Shares a balance cache with other orchestrators.
    pub fn with_cache(mut self, cache: BalanceCache) -> Self {
        self.cache = cache;
        self
    }

    /// Shares a flight guard with other orchestrators.
    pub fn with_guard(mut self, guard: FlightGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_ledger(mut self, ledger: IntentLedger) -> Self {
        self.ledger = ledger;
        self
    }

    /// Observable status of this orchestrator.
    pub fn status(&self) -> StatusTrack<DepositStatus> {
        self.status.clone()
    }

    pub fn ledger(&self) -> &IntentLedger {
        &self.ledger
    }

    // ========================================================================
    // ENTRY POINTS
    // ========================================================================

    /// Executes a deposit, swapping first when needed.
    ///
    /// # Arguments
    ///
    /// * `request` - Intent plus the vault's max capacity
    ///
    /// # Returns
    ///
    /// * `Ok(DepositReceipt)` - Deposit mined; status has gone DONE → NONE
    /// * `Err(FlowError)` - Flow aborted; status is NONE and the error is recorded
    pub async fn deposit(&self, request: &DepositRequest) -> FlowResult<DepositReceipt> {
        let (wallet, chain_id) = match active_wallet(self.chain.as_ref()) {
            Ok(ctx) => ctx,
            Err(e) => return Err(self.abort(e, &Progress::default()).await),
        };
        let _ticket = self.acquire(wallet)?;
        self.status.begin();

        let mut progress = Progress::default();
        match self.run_deposit(request, wallet, chain_id, &mut progress).await {
            Ok(receipt) => {
                self.finish().await;
                Ok(receipt)
            }
            Err(e) => Err(self.abort(e, &progress).await),
        }
    }

    /// Deposits the swapped output of a Stuck (or Swapped) ledger record.
    ///
    /// No swap is repeated: the recorded swap output is deposited as-is. When
    /// the record carries an unconfirmed deposit, its receipt is checked first
    /// and a mined deposit completes the record without sending another.
    ///
    /// # Arguments
    ///
    /// * `record_id` - Ledger record to complete
    /// * `max_capacity` - The vault's max capacity in currency base units
    pub async fn resume(&self, record_id: &str, max_capacity: U256) -> FlowResult<DepositReceipt> {
        let (wallet, chain_id) = match active_wallet(self.chain.as_ref()) {
            Ok(ctx) => ctx,
            Err(e) => return Err(self.abort(e, &Progress::default()).await),
        };
        let _ticket = self.acquire(wallet)?;
        self.status.begin();

        let mut progress = Progress::default();
        match self.run_resume(record_id, max_capacity, wallet, chain_id, &mut progress).await {
            Ok(receipt) => {
                self.finish().await;
                Ok(receipt)
            }
            Err(e) => Err(self.abort(e, &progress).await),
        }
    }

    fn acquire(&self, wallet: Address) -> FlowResult<super::guard::FlightTicket> {
        self.guard.try_acquire(wallet).map_err(|e| {
            // Another flow owns the status; leave it untouched
            warn!("Deposit refused: {}", e);
            e
        })
    }

    async fn finish(&self) {
        self.status.set(DepositStatus::Done);
        tokio::time::sleep(self.settings.done_delay()).await;
        self.status.reset();
    }

    async fn abort(&self, e: FlowError, progress: &Progress) -> FlowError {
        error!("Deposit failed: {} ({})", e.user_message(), e);
        self.status.record_error(&e);
        self.status.reset();

        if let Some(id) = &progress.record_id {
            let phase = match progress.swapped {
                Some((swapped_amount, swap_tx)) => DepositPhase::Stuck {
                    swapped_amount,
                    swap_tx,
                    deposit_tx: progress.deposit_tx,
                    reason: e.user_message(),
                },
                None => {
                    if let Some(deposit_tx) = progress.deposit_tx {
                        warn!("Deposit {} for intent {} is unconfirmed", format_hash(&deposit_tx), id);
                    }
                    DepositPhase::Failed {
                        reason: e.user_message(),
                    }
                }
            };
            if let Err(ledger_err) = self.ledger.set_phase(id, phase).await {
                error!("Failed to record deposit failure for {}: {}", id, ledger_err);
            }
        }
        e
    }

    // ========================================================================
    // FLOW STEPS
    // ========================================================================

    async fn run_deposit(
        &self,
        request: &DepositRequest,
        wallet: Address,
        chain_id: u64,
        progress: &mut Progress,
    ) -> FlowResult<DepositReceipt> {
        let intent = &request.intent;
        let tokens = self.settings.tokens_for(chain_id)?;
        let input = tokens
            .iter()
            .find(|t| t.address == intent.input_token)
            .ok_or_else(|| FlowError::UnsupportedToken(format_address(&intent.input_token)))?
            .clone();

        let amount_in = parse_units(&intent.input_amount, input.decimals)?;
        if amount_in.is_zero() {
            return Err(FlowError::InvalidAmount("amount must be greater than zero".to_string()));
        }

        let vault_status = self.chain.vault_status(intent.vault).await?;
        if !vault_status.accepts_deposits() {
            return Err(FlowError::VaultNotAccepting(vault_status));
        }

        let currency = self.chain.vault_currency(intent.vault).await?;
        if currency != intent.target_currency {
            warn!(
                "Vault {} takes {}, not {}; depositing in the vault's currency",
                format_address(&intent.vault),
                format_address(&currency),
                format_address(&intent.target_currency)
            );
        }

        let balance = cached_balance(&self.cache, self.chain.as_ref(), chain_id, input.address, wallet).await?;
        if balance < amount_in {
            return Err(FlowError::InsufficientBalance(format!(
                "Insufficient balance. Required: {} {}, Available: {}",
                format_units(amount_in, input.decimals),
                input.label,
                format_units(balance, input.decimals)
            )));
        }

        let currency_label = token_label(&self.settings, self.chain.as_ref(), chain_id, currency).await?;
        let route = if needs_swap(&input.label, &currency_label) {
            info!("Input {} differs from vault currency {}; swapping first", input.label, currency_label);
            Some(self.plan_route(chain_id, wallet, input.address, currency, amount_in).await?)
        } else {
            None
        };

        let expected = route.as_ref().map(|r| r.amount_out).unwrap_or(amount_in);
        self.check_capacity(intent.vault, expected, request.max_capacity).await?;

        let record = self
            .ledger
            .create(NewDeposit {
                wallet,
                chain_id,
                vault: intent.vault,
                input_token: input.address,
                input_amount: intent.input_amount.clone(),
            })
            .await?;
        progress.record_id = Some(record.id.clone());

        let mut approvals = Vec::new();
        let (deposit_amount, swap_tx) = match route {
            Some(route) => {
                let route = self.ensure_fresh(route, chain_id, wallet).await?;
                let (amount_out, swap_tx) = self.execute_swap(&route, chain_id, wallet, &mut approvals).await?;
                progress.swapped = Some((amount_out, swap_tx));
                self.ledger
                    .set_phase(
                        &record.id,
                        DepositPhase::Swapped {
                            output_amount: amount_out,
                            swap_tx,
                        },
                    )
                    .await?;
                self.check_capacity(intent.vault, amount_out, request.max_capacity).await?;
                (amount_out, Some(swap_tx))
            }
            None => (amount_in, None),
        };

        let deposit_tx = self
            .deposit_leg(
                chain_id,
                wallet,
                intent.vault,
                currency,
                deposit_amount,
                &mut approvals,
                &mut progress.deposit_tx,
            )
            .await?;

        self.complete(&record.id, chain_id, wallet, intent.vault, input.address, deposit_amount, deposit_tx, swap_tx)
            .await?;

        Ok(DepositReceipt {
            record_id: record.id,
            deposit_amount,
            deposit_tx,
            swap_tx,
            approvals,
        })
    }

    async fn run_resume(
        &self,
        record_id: &str,
        max_capacity: U256,
        wallet: Address,
        chain_id: u64,
        progress: &mut Progress,
    ) -> FlowResult<DepositReceipt> {
        let record = self
            .ledger
            .get(record_id)
            .await
            .ok_or_else(|| FlowError::IntentNotFound(record_id.to_string()))?;

        let (amount, swap_tx) = record.phase.resumable_amount().ok_or_else(|| FlowError::NotResumable {
            id: record_id.to_string(),
            reason: format!("record is {}", record.phase.name()),
        })?;
        if record.wallet != wallet || record.chain_id != chain_id {
            return Err(FlowError::NotResumable {
                id: record_id.to_string(),
                reason: format!(
                    "record belongs to {} on chain {}",
                    format_address(&record.wallet),
                    record.chain_id
                ),
            });
        }
        progress.record_id = Some(record.id.clone());
        progress.swapped = Some((amount, swap_tx));
        progress.deposit_tx = record.phase.unconfirmed_deposit();

        info!("Resuming deposit intent {} with {} swapped", record.id, amount);

        if let Some(sent) = progress.deposit_tx {
            self.status.set(DepositStatus::Depositing);
            let receipt = self.chain.wait_for_receipt(sent).await?;
            self.cache.invalidate_owner(chain_id, wallet).await;
            if receipt.success {
                info!("Deposit {} for intent {} was already mined", format_hash(&sent), record.id);
                self.complete(&record.id, chain_id, wallet, record.vault, record.input_token, amount, sent, Some(swap_tx))
                    .await?;
                return Ok(DepositReceipt {
                    record_id: record.id,
                    deposit_amount: amount,
                    deposit_tx: sent,
                    swap_tx: Some(swap_tx),
                    approvals: Vec::new(),
                });
            }
            warn!("Deposit {} for intent {} reverted; depositing again", format_hash(&sent), record.id);
            progress.deposit_tx = None;
        }

        let vault_status = self.chain.vault_status(record.vault).await?;
        if !vault_status.accepts_deposits() {
            return Err(FlowError::VaultNotAccepting(vault_status));
        }
        let currency = self.chain.vault_currency(record.vault).await?;
        self.check_capacity(record.vault, amount, max_capacity).await?;

        let mut approvals = Vec::new();
        let deposit_tx = self
            .deposit_leg(
                chain_id,
                wallet,
                record.vault,
                currency,
                amount,
                &mut approvals,
                &mut progress.deposit_tx,
            )
            .await?;

        self.complete(&record.id, chain_id, wallet, record.vault, record.input_token, amount, deposit_tx, Some(swap_tx))
            .await?;

        Ok(DepositReceipt {
            record_id: record.id,
            deposit_amount: amount,
            deposit_tx,
            swap_tx: Some(swap_tx),
            approvals,
        })
    }

    /// Quotes then builds a route for `amount_in` of `token_in` into `currency`.
    async fn plan_route(
        &self,
        chain_id: u64,
        wallet: Address,
        token_in: Address,
        currency: Address,
        amount_in: U256,
    ) -> FlowResult<SwapRoute> {
        let flow = &self.settings.flow;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let request = RouteRequest {
            chain_id,
            token_in,
            token_out: currency,
            amount_in,
            slippage_bps: flow.quote_slippage_bps,
            deadline: now + flow.route_deadline_secs,
        };

        let quote = self.swap.quote_route(&request).await?;
        self.swap.build_route(&quote, wallet, flow.build_slippage_bps).await
    }

    /// Re-plans a route that aged past `max_route_age_secs`, once.
    async fn ensure_fresh(&self, route: SwapRoute, chain_id: u64, wallet: Address) -> FlowResult<SwapRoute> {
        let max_age = Duration::from_secs(self.settings.flow.max_route_age_secs);
        if route.age() <= max_age {
            return Ok(route);
        }

        warn!("Swap route is {:?} old; re-quoting", route.age());
        let fresh = self
            .plan_route(chain_id, wallet, route.token_in, route.token_out, route.amount_in)
            .await?;
        if fresh.age() > max_age {
            return Err(FlowError::RouteUnavailable("route went stale before execution".to_string()));
        }
        Ok(fresh)
    }

    /// Approves the router if needed and executes the swap.
    ///
    /// # Returns
    ///
    /// * `Ok((amount_out, swap_tx))` - Swap mined successfully
    async fn execute_swap(
        &self,
        route: &SwapRoute,
        chain_id: u64,
        wallet: Address,
        approvals: &mut Vec<H256>,
    ) -> FlowResult<(U256, H256)> {
        if route.is_native_in() {
            let native = cached_balance(&self.cache, self.chain.as_ref(), chain_id, native_token(), wallet).await?;
            if native < route.amount_in {
                return Err(FlowError::InsufficientBalance(format!(
                    "Insufficient balance. Required: {} ETH, Available: {}",
                    format_units(route.amount_in, 18),
                    format_units(native, 18)
                )));
            }
        } else {
            let allowance = cached_allowance(
                &self.cache,
                self.chain.as_ref(),
                chain_id,
                route.token_in,
                wallet,
                route.router_address,
            )
            .await?;
            if allowance < route.amount_in {
                self.status.set(DepositStatus::SwapApprove);
                let tx = self
                    .chain
                    .approve(route.token_in, route.router_address, U256::MAX)
                    .await?;
                confirm(self.chain.as_ref(), tx).await?;
                self.cache.invalidate_token(chain_id, route.token_in, wallet).await;
                approvals.push(tx);
            }
        }

        self.status.set(DepositStatus::Swapping);
        let mut tx = TxRequest {
            from: wallet,
            to: route.router_address,
            data: route.call_data.clone(),
            value: if route.is_native_in() { route.amount_in } else { U256::zero() },
            gas: None,
        };
        let estimate = self.chain.estimate_gas(&tx).await?;
        tx.gas = Some(with_margin_pct(estimate, self.settings.flow.gas_margin_pct));

        let swap_tx = self.chain.send_transaction(&tx).await?;
        let result = confirm(self.chain.as_ref(), swap_tx).await;
        self.cache.invalidate_token(chain_id, route.token_in, wallet).await;
        self.cache.invalidate_token(chain_id, route.token_out, wallet).await;
        result?;

        info!("Swap {} mined: {} out", format_hash(&swap_tx), route.amount_out);
        Ok((route.amount_out, swap_tx))
    }

    /// Approves the vault if needed and deposits `amount` of `currency`.
    ///
    /// `submitted` receives the deposit hash before its receipt is awaited.
    #[allow(clippy::too_many_arguments)]
    async fn deposit_leg(
        &self,
        chain_id: u64,
        wallet: Address,
        vault: Address,
        currency: Address,
        amount: U256,
        approvals: &mut Vec<H256>,
        submitted: &mut Option<H256>,
    ) -> FlowResult<H256> {
        if is_native(&currency) {
            return Err(FlowError::UnsupportedToken(format_address(&currency)));
        }

        let allowance = cached_allowance(&self.cache, self.chain.as_ref(), chain_id, currency, wallet, vault).await?;
        if allowance < amount {
            self.status.set(DepositStatus::DepositApprove);
            let approve_amount = apply_bps_buffer(amount, self.settings.flow.approve_buffer_bps);
            let tx = self.chain.approve(currency, vault, approve_amount).await?;
            confirm(self.chain.as_ref(), tx).await?;
            self.cache.invalidate_token(chain_id, currency, wallet).await;
            approvals.push(tx);
        }

        self.status.set(DepositStatus::Depositing);
        let deposit_tx = self.chain.deposit(vault, amount).await?;
        *submitted = Some(deposit_tx);
        let result = confirm(self.chain.as_ref(), deposit_tx).await;
        self.cache.invalidate_token(chain_id, currency, wallet).await;
        result?;

        info!("Deposit {} mined: {} into {}", format_hash(&deposit_tx), amount, format_address(&vault));
        Ok(deposit_tx)
    }

    /// Fails with CapacityExceeded if `amount` would push the vault past `max`.
    async fn check_capacity(&self, vault: Address, amount: U256, max: U256) -> FlowResult<()> {
        let current = self.chain.current_capacity(vault).await?;
        if current.saturating_add(amount) > max {
            return Err(FlowError::CapacityExceeded {
                current,
                deposit: amount,
                max,
            });
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn complete(
        &self,
        record_id: &str,
        chain_id: u64,
        wallet: Address,
        vault: Address,
        input_token: Address,
        amount: U256,
        deposit_tx: H256,
        swap_tx: Option<H256>,
    ) -> FlowResult<()> {
        self.ledger
            .set_phase(record_id, DepositPhase::Completed { deposit_tx, amount })
            .await?;

        let report = DepositReport {
            chain_id,
            product: format_address(&vault),
            address: format_address(&wallet),
            txid: format_hash(&deposit_tx),
            amount: amount.to_string(),
            input_token: format_address(&input_token),
            swap_txid: swap_tx.as_ref().map(format_hash),
        };
        best_effort("Deposit report", self.backend.report_deposit(&report).await);
        Ok(())
    }
}

/// Decimals of the vault currency, for display.
pub async fn currency_decimals<C: ChainGateway>(
    settings: &FlowSettings,
    chain: &C,
    chain_id: u64,
    vault: Address,
) -> FlowResult<u8> {
    let currency = chain.vault_currency(vault).await?;
    token_decimals(settings, chain, chain_id, currency).await
}
