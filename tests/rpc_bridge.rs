// JsonRpcBridge against an in-process JSON-RPC node stub.

use axum::{extract::State, routing::post, Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use storymint::config::WalletConfig;
use storymint::wallet::{BridgeError, PaymentBridge, WalletConnection, WalletState};
use storymint::wallet_rpc::{encode_call, function_selector, JsonRpcBridge, PURCHASE_CHAPTER_SIG};

const ACCOUNT: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";
const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
const TX_HASH: &str = "0x4e3a3754410177e6937ef1f84bba68ea139e8d1a2258c5f85db9f1cd715a1bdd";

#[derive(Default)]
struct Node {
    reject_sends: bool,
    revert: bool,
    pending_polls: u32,
    sent: Vec<Value>,
    methods: Vec<String>,
}

type Shared = Arc<Mutex<Node>>;

async fn rpc(State(node): State<Shared>, Json(req): Json<Value>) -> Json<Value> {
    let id = req["id"].clone();
    let method = req["method"].as_str().unwrap_or_default().to_string();
    let mut node = node.lock().unwrap();
    node.methods.push(method.clone());

    let outcome: Result<Value, (i64, &str)> = match method.as_str() {
        "eth_requestAccounts" => Err((-32601, "method not found")),
        "eth_accounts" => Ok(json!([ACCOUNT])),
        "eth_chainId" => Ok(json!("0x7a69")),
        "eth_sendTransaction" if node.reject_sends => Err((4001, "User denied transaction signature")),
        "eth_sendTransaction" => {
            node.sent.push(req["params"][0].clone());
            Ok(json!(TX_HASH))
        }
        "eth_getTransactionReceipt" if node.pending_polls > 0 => {
            node.pending_polls -= 1;
            Ok(Value::Null)
        }
        "eth_getTransactionReceipt" => Ok(json!({
            "transactionHash": TX_HASH,
            "blockNumber": "0x10",
            "status": if node.revert { "0x0" } else { "0x1" },
        })),
        "eth_call" => Ok(json!(format!("0x{:064x}", 1))),
        _ => Err((-32601, "method not found")),
    };

    Json(match outcome {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err((code, message)) => {
            json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
        }
    })
}

async fn start_node(node: Node) -> (Shared, JsonRpcBridge) {
    let shared = Arc::new(Mutex::new(node));
    let app = Router::new().route("/", post(rpc)).with_state(shared.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = WalletConfig {
        rpc_url: format!("http://{addr}"),
        contract_address: CONTRACT.to_string(),
        expected_chain_id: Some(31337),
        confirmation_timeout_secs: 5,
        poll_interval_ms: 10,
    };
    (shared, JsonRpcBridge::from_config(&config).unwrap())
}

#[tokio::test]
async fn connect_falls_back_to_eth_accounts() {
    let (node, bridge) = start_node(Node::default()).await;
    let mut wallet = WalletConnection::new(Arc::new(bridge), Some(31337));

    wallet.connect().await.unwrap();
    assert_eq!(
        *wallet.state(),
        WalletState::Ready {
            account: ACCOUNT.to_string(),
            chain_id: 31337
        }
    );
    let methods = node.lock().unwrap().methods.clone();
    assert_eq!(methods, vec!["eth_requestAccounts", "eth_accounts", "eth_chainId"]);
}

#[tokio::test]
async fn wrong_network_leaves_wallet_in_error() {
    let (_node, bridge) = start_node(Node::default()).await;
    let mut wallet = WalletConnection::new(Arc::new(bridge), Some(1));

    assert!(wallet.connect().await.is_err());
    assert!(matches!(wallet.state(), WalletState::Error(_)));
    assert!(wallet.ready_handle().is_err());
}

#[tokio::test]
async fn payment_waits_for_the_receipt() {
    let (node, bridge) = start_node(Node {
        pending_polls: 2,
        ..Node::default()
    })
    .await;

    let receipt = bridge
        .submit_payment(ACCOUNT, 7, 70, 1_000_000_000_000_000)
        .await
        .unwrap();
    assert_eq!(receipt.transaction_hash, TX_HASH);
    assert_eq!(receipt.block_number, Some(16));

    let node = node.lock().unwrap();
    let tx = &node.sent[0];
    assert_eq!(tx["from"], ACCOUNT);
    assert_eq!(tx["to"], CONTRACT);
    assert_eq!(tx["value"], "0x38d7ea4c68000");
    let selector = hex::encode(function_selector(PURCHASE_CHAPTER_SIG));
    assert!(tx["data"].as_str().unwrap().starts_with(&format!("0x{selector}")));
    assert_eq!(
        node.methods
            .iter()
            .filter(|m| *m == "eth_getTransactionReceipt")
            .count(),
        3
    );
}

#[tokio::test]
async fn reverted_payment_is_an_error() {
    let (_node, bridge) = start_node(Node {
        revert: true,
        ..Node::default()
    })
    .await;

    let result = bridge.submit_payment(ACCOUNT, 7, 70, 1).await;
    match result {
        Err(BridgeError::Reverted { tx_hash }) => assert_eq!(tx_hash, TX_HASH),
        other => panic!("expected Reverted, got {other:?}"),
    }
}

#[tokio::test]
async fn user_rejection_is_classified() {
    let (node, bridge) = start_node(Node {
        reject_sends: true,
        ..Node::default()
    })
    .await;

    let result = bridge.submit_payment(ACCOUNT, 7, 70, 1).await;
    assert!(matches!(result, Err(BridgeError::UserRejected)));
    assert!(node.lock().unwrap().sent.is_empty());
}

#[tokio::test]
async fn ledger_lookup_reads_the_returned_word() {
    let (_node, bridge) = start_node(Node::default()).await;
    assert!(bridge.has_purchased(ACCOUNT, 7, 70).await.unwrap());
}

#[test]
fn call_data_is_selector_plus_words() {
    let data = encode_call(PURCHASE_CHAPTER_SIG, &[[0u8; 32], [0u8; 32]]);
    assert_eq!(data.len(), 2 + 8 + 128);
}
