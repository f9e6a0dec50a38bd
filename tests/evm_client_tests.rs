//! Unit tests for the EVM JSON-RPC client

use ethereum_types::{H256, U256};
use serde_json::json;
use vault_client::chains::TxRequest;
use vault_client::config::ChainConfig;
use vault_client::{Erc20Token, EvmClient, FlowError, VaultContract, VaultStatus, WalletProvider};
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "helpers.rs"]
mod test_helpers;
use test_helpers::{create_default_chain_config, router, usdc, vault, wallet, DUMMY_TX_HASH, DUMMY_USDC_ADDR};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn chain_config(server: &MockServer) -> ChainConfig {
    ChainConfig {
        rpc_url: server.uri(),
        ..create_default_chain_config()
    }
}

fn client(server: &MockServer) -> EvmClient {
    EvmClient::new(&chain_config(server), Some(wallet()), 10).unwrap()
}

/// 32-byte ABI word holding `value`.
fn word(value: u64) -> String {
    format!("0x{:064x}", value)
}

async fn mount_result(server: &MockServer, rpc_method: &str, result: serde_json::Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "result": result,
            "id": 1
        })))
        .mount(server)
        .await;
}

async fn mount_error(server: &MockServer, rpc_method: &str, error: serde_json::Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "error": error,
            "id": 1
        })))
        .mount(server)
        .await;
}

fn swap_tx() -> TxRequest {
    TxRequest {
        from: wallet(),
        to: router(),
        data: vec![0xde, 0xad],
        value: U256::zero(),
        gas: Some(U256::from(300_000u64)),
    }
}

// ============================================================================
// READ TESTS
// ============================================================================

/// What is tested: verify_chain_id() accepts a matching node and rejects another chain
/// Why: Sending transactions to the wrong chain would be unrecoverable
#[tokio::test]
async fn test_verify_chain_id() {
    let server = MockServer::start().await;
    mount_result(&server, "eth_chainId", json!("0x1")).await;
    assert!(client(&server).verify_chain_id().await.is_ok());

    let other = MockServer::start().await;
    mount_result(&other, "eth_chainId", json!("0x89")).await;
    let err = client(&other).verify_chain_id().await.unwrap_err();
    assert!(err.to_string().contains("serves chain 137"));
}

/// What is tested: balance_of() sends balanceOf calldata and decodes the returned word
/// Why: Balances gate every deposit
#[tokio::test]
async fn test_balance_of() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "eth_call",
            "params": [{ "to": DUMMY_USDC_ADDR }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "result": word(1_000_000_000),
            "id": 1
        })))
        .mount(&server)
        .await;

    let balance = client(&server).balance_of(usdc(), wallet()).await.unwrap();

    assert_eq!(balance, U256::from(1_000_000_000u64));
}

/// What is tested: vault_status() maps the raw status code
/// Why: Status decides which actions are offered
#[tokio::test]
async fn test_vault_status() {
    let server = MockServer::start().await;
    mount_result(&server, "eth_call", json!(word(2))).await;

    let status = client(&server).vault_status(vault()).await.unwrap();

    assert_eq!(status, VaultStatus::Locked);
}

/// What is tested: A short eth_call result is a Network error
/// Why: Calling a non-contract address returns "0x"
#[tokio::test]
async fn test_empty_call_result() {
    let server = MockServer::start().await;
    mount_result(&server, "eth_call", json!("0x")).await;

    let err = client(&server).current_capacity(vault()).await.unwrap_err();

    assert!(matches!(err, FlowError::Network(_)));
}

// ============================================================================
// TRANSACTION TESTS
// ============================================================================

/// What is tested: send_transaction() returns the hash from eth_sendTransaction
/// Why: The flows wait on that hash
#[tokio::test]
async fn test_send_transaction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "eth_sendTransaction",
            "params": [{ "data": "0xdead", "gas": "0x493e0" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "result": DUMMY_TX_HASH,
            "id": 1
        })))
        .mount(&server)
        .await;

    let hash = client(&server).send_transaction(&swap_tx()).await.unwrap();

    assert_eq!(hash, H256::from_low_u64_be(0x12));
}

/// What is tested: Error code 4001 is classified as a user rejection
/// Why: Rejections are shown differently from failures
#[tokio::test]
async fn test_user_rejection() {
    let server = MockServer::start().await;
    mount_error(
        &server,
        "eth_sendTransaction",
        json!({ "code": 4001, "message": "MetaMask Tx Signature: User denied transaction signature." }),
    )
    .await;

    let err = client(&server).approve(usdc(), vault(), U256::MAX).await.unwrap_err();

    assert_eq!(err, FlowError::UserRejected);
    assert!(err.is_user_rejection());
}

/// What is tested: "Product is full" reverts map to the capacity message
/// Why: This is how the vault refuses over-capacity deposits
#[tokio::test]
async fn test_deposit_revert_product_full() {
    let server = MockServer::start().await;
    mount_error(
        &server,
        "eth_sendTransaction",
        json!({ "code": 3, "message": "execution reverted: Product is full" }),
    )
    .await;

    let err = client(&server).deposit(vault(), U256::from(1u64)).await.unwrap_err();

    assert_eq!(
        err,
        FlowError::ContractReverted {
            reason: Some("Product is full".to_string())
        }
    );
    assert_eq!(err.user_message(), "Your deposit results in excess of max capacity.");
}

/// What is tested: Revert reasons carried only in the error data are decoded
/// Why: Some nodes return a bare "execution reverted" message with Error(string) data
#[tokio::test]
async fn test_revert_reason_from_data() {
    let server = MockServer::start().await;
    mount_error(
        &server,
        "eth_estimateGas",
        json!({
            "code": 3,
            "message": "execution reverted",
            "data": "0x08c379a0\
                     0000000000000000000000000000000000000000000000000000000000000020\
                     000000000000000000000000000000000000000000000000000000000000000b\
                     4e6f742073746172746564000000000000000000000000000000000000000000"
        }),
    )
    .await;

    let err = client(&server).estimate_gas(&swap_tx()).await.unwrap_err();

    assert_eq!(
        err,
        FlowError::ContractReverted {
            reason: Some("Not started".to_string())
        }
    );
}

/// What is tested: Transactions without a connected wallet fail before any request
/// Why: There is no `from` address to send from
#[tokio::test]
async fn test_transact_without_wallet() {
    let server = MockServer::start().await;
    let read_only = EvmClient::new(&chain_config(&server), None, 10).unwrap();

    let err = read_only.withdraw_coupon(vault()).await.unwrap_err();

    assert_eq!(err, FlowError::WalletUnavailable);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

// ============================================================================
// RECEIPT TESTS
// ============================================================================

/// What is tested: wait_for_receipt() polls until the receipt exists and reads its status
/// Why: A mined-but-reverted transaction must not count as success
#[tokio::test]
async fn test_wait_for_receipt_polls_and_reads_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_getTransactionReceipt" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "result": null,
            "id": 1
        })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_result(
        &server,
        "eth_getTransactionReceipt",
        json!({
            "transactionHash": DUMMY_TX_HASH,
            "status": "0x0",
            "blockNumber": "0x10"
        }),
    )
    .await;

    let receipt = client(&server)
        .wait_for_receipt(H256::from_low_u64_be(0x12))
        .await
        .unwrap();

    assert!(!receipt.success);
    assert_eq!(receipt.block_number, Some(16));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}
