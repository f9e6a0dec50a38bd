//! Unit tests for early withdraw quoting and execution

use std::sync::Arc;
use std::time::Duration;
use vault_client::backend::IssuanceCycle;
use vault_client::config::FlowConfig;
use vault_client::flow::status::WithdrawStatus;
use vault_client::flow::unwind::EarlyWithdrawOrchestrator;
use vault_client::{FlightGuard, FlowError};

#[path = "helpers.rs"]
mod test_helpers;
use test_helpers::{
    create_default_flow_config, create_default_settings, create_harness, create_settings, units6, vault,
    vault_token, wallet, Harness, MockBackend, MockChain,
};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Spot 2000, min order 1.0: one block is 200 currency units.
fn cycle() -> IssuanceCycle {
    IssuanceCycle {
        underlying_spot_ref: 2000.0,
        option_min_order_size: 1.0,
        ..Default::default()
    }
}

/// Harness whose wallet holds 1000 vault tokens (5 blocks).
fn harness() -> Harness {
    create_harness(|chain| chain.with_balance(vault_token(), units6(1000)))
}

fn orchestrator(h: &Harness) -> EarlyWithdrawOrchestrator<MockChain, MockBackend> {
    EarlyWithdrawOrchestrator::new(Arc::clone(&h.chain), Arc::clone(&h.backend), create_default_settings())
}

// ============================================================================
// QUOTE TESTS
// ============================================================================

/// What is tested: Block sizing splits the vault-token balance into whole blocks
/// Why: Only whole blocks can be unwound
#[tokio::test]
async fn test_sizing() {
    let h = harness();
    let sizing = orchestrator(&h).sizing(vault(), &cycle()).await.unwrap();

    assert_eq!(sizing.block_size, 200.0);
    assert_eq!(sizing.total_blocks, 5);
    assert_eq!(sizing.token, vault_token());
    assert_eq!(sizing.amount_for(2).unwrap(), units6(400));
}

/// What is tested: Block counts outside 1..=total are rejected without asking the backend
/// Why: The backend would price an impossible unwind
#[tokio::test]
async fn test_quote_rejects_invalid_blocks() {
    let h = harness();
    let early = orchestrator(&h);

    for blocks in [0, 6] {
        let err = early.quote(vault(), blocks, &cycle()).await.unwrap_err();
        assert_eq!(
            err,
            FlowError::InvalidBlocks {
                requested: blocks,
                available: 5
            }
        );
    }
    assert_eq!(h.log.count("unwind_price"), 0);
}

/// What is tested: A quote carries the backend prices and a 60 s validity window
/// Why: The user confirms against these numbers
#[tokio::test]
async fn test_quote_prices_and_ttl() {
    let h = harness();
    let quote = orchestrator(&h).quote(vault(), 2, &cycle()).await.unwrap();

    assert_eq!(quote.blocks, 2);
    assert_eq!(quote.amount_token, 190.5);
    assert_eq!(quote.amount_option, 4.25);
    assert_eq!(quote.expires_at - quote.quoted_at, Duration::from_secs(60));
    assert!(!quote.is_expired());
}

// ============================================================================
// EXECUTION TESTS
// ============================================================================

/// What is tested: A fresh quote approves the vault token, unwinds and reports
/// Why: This is the full early-withdraw sequence
#[tokio::test]
async fn test_execute_fresh_quote() {
    let h = harness();
    let early = orchestrator(&h);
    let quote = early.quote(vault(), 2, &cycle()).await.unwrap();

    let tx = early.execute(&quote).await.unwrap();

    assert_eq!(h.chain.state().approvals, vec![(vault_token(), vault(), units6(400))]);
    assert_eq!(h.chain.state().early_withdraws, vec![(vault(), 2)]);
    assert_eq!(h.log.tx_calls(), vec!["approve", "early_withdraw"]);

    let reports = h.backend.withdraw_reports.lock().unwrap().clone();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].txid, vault_client::chains::format_hash(&tx));
    assert_eq!(reports[0].amount_pt_unwind_price, 190.5);
    assert_eq!(reports[0].amount_option_unwind_price, 4.25);

    assert_eq!(
        early.status().history(),
        vec![
            WithdrawStatus::None,
            WithdrawStatus::Approving,
            WithdrawStatus::Withdraw,
            WithdrawStatus::Done,
            WithdrawStatus::None,
        ]
    );
}

/// What is tested: An expired quote is rejected before any transaction
/// Why: The unwind price is only honoured within its window
#[tokio::test]
async fn test_expired_quote_rejected_before_any_transaction() {
    let h = harness();
    let settings = create_settings(FlowConfig {
        unwind_quote_ttl_secs: 0,
        ..create_default_flow_config()
    });
    let early = EarlyWithdrawOrchestrator::new(Arc::clone(&h.chain), Arc::clone(&h.backend), settings);
    let quote = early.quote(vault(), 1, &cycle()).await.unwrap();
    assert!(quote.is_expired());

    let err = early.execute(&quote).await.unwrap_err();

    assert_eq!(err, FlowError::QuoteExpired);
    assert!(h.log.tx_calls().is_empty());
    assert_eq!(h.log.count("report_withdraw_request"), 0);
    assert_eq!(early.status().current(), WithdrawStatus::None);
    assert_eq!(early.status().last_error(), Some(FlowError::QuoteExpired));
}

/// What is tested: A failing withdraw report does not fail the unwind
/// Why: Bookkeeping is best-effort
#[tokio::test]
async fn test_report_failure_is_ignored() {
    let mut h = harness();
    let mut backend = MockBackend::new(h.log.clone());
    backend.fail_reports = true;
    h.backend = Arc::new(backend);
    let early = orchestrator(&h);
    let quote = early.quote(vault(), 1, &cycle()).await.unwrap();

    assert!(early.execute(&quote).await.is_ok());
    assert_eq!(h.log.count("report_withdraw_request"), 1);
}

/// What is tested: Early withdraw is refused while another flow holds the wallet
/// Why: The flight guard covers every flow
#[tokio::test]
async fn test_execute_refused_while_busy() {
    let h = harness();
    let guard = FlightGuard::new();
    let early = orchestrator(&h).with_guard(guard.clone());
    let quote = early.quote(vault(), 1, &cycle()).await.unwrap();
    let _ticket = guard.try_acquire(wallet()).unwrap();

    let err = early.execute(&quote).await.unwrap_err();

    assert!(matches!(err, FlowError::FlowInProgress(_)));
    assert!(h.log.tx_calls().is_empty());
}
