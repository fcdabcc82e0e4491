// JSON-RPC transport layer implementation
// This file implements the Ethereum JSON-RPC client used for venue reads,
// transaction submission through the node's signer and receipt polling
//
// Numan Thabit 2025 Nov

use crate::errors::AggrError;
use crate::metrics::{REQ_ERRORS, REQ_LATENCY};
use crate::router::routes::EncodedRoute;
use crate::transport::{ChainBroadcaster, ChainReader, Confirmation, TxStatus};
use alloy_primitives::{Address, Bytes, TxHash};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct JsonRpc {
    http: Client,
    url: String,
    /// Account whose signer authorises submitted calls
    sender: Address,
    poll_interval: Duration,
    next_id: AtomicU64,
}

impl JsonRpc {
    pub fn new(url: impl Into<String>, sender: Address) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
            sender,
            poll_interval: Duration::from_millis(500),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.url
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    /// Issue one request; a JSON `null` result comes back as `None`.
    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, AggrError> {
        let _timer = REQ_LATENCY
            .with_label_values(&["jsonrpc", method])
            .start_timer();
        let payload = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });
        let resp = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                REQ_ERRORS.with_label_values(&["jsonrpc", method]).inc();
                AggrError::Transport(format!("jsonrpc send: {e}"))
            })?;
        let status = resp.status();
        if !status.is_success() {
            REQ_ERRORS.with_label_values(&["jsonrpc", method]).inc();
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                AggrError::Transport(format!("http {status}"))
            } else {
                AggrError::Provider(format!("http {status}"))
            });
        }
        let body: RpcResponse<T> = resp
            .json()
            .await
            .map_err(|e| AggrError::Transport(format!("json parse: {e}")))?;
        if let Some(err) = body.error {
            REQ_ERRORS.with_label_values(&["jsonrpc", method]).inc();
            return Err(AggrError::Provider(format!(
                "{method}: {} (code {})",
                err.message, err.code
            )));
        }
        Ok(body.result)
    }

    async fn eth_call_once(&self, to: Address, data: &Bytes) -> Result<Bytes, AggrError> {
        let raw: String = self
            .request("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await?
            .ok_or_else(|| AggrError::Provider("eth_call: empty result".into()))?;
        decode_hex(&raw).map(Bytes::from)
    }

    async fn receipt(&self, tx: TxHash) -> Result<Option<RpcReceipt>, AggrError> {
        self.request("eth_getTransactionReceipt", json!([tx])).await
    }

    async fn block_timestamp_once(&self, block_number: u64) -> Result<u64, AggrError> {
        let block: RpcBlock = self
            .request(
                "eth_getBlockByNumber",
                json!([format!("{block_number:#x}"), false]),
            )
            .await?
            .ok_or_else(|| AggrError::Provider(format!("block {block_number} not found")))?;
        parse_quantity(&block.timestamp)
    }

    /// The receipt's block may not be served yet by every backend, so any failure is retried.
    async fn block_timestamp(&self, block_number: u64) -> Result<u64, AggrError> {
        retry(read_backoff(), || async move {
            self.block_timestamp_once(block_number).await.map_err(|e| {
                debug!(error = %e, block_number, "block header read failed; retrying");
                backoff::Error::transient(e)
            })
        })
        .await
    }

    async fn confirmation_from(&self, receipt: RpcReceipt) -> Result<Confirmation, AggrError> {
        let block_number = parse_quantity(&receipt.block_number)?;
        let gas_used = parse_quantity(&receipt.gas_used)?;
        let status = match receipt.status.as_deref().map(parse_quantity).transpose()? {
            Some(1) => TxStatus::Success,
            _ => TxStatus::Reverted,
        };
        // a landed receipt is reported even when its block header cannot be read
        let timestamp = match self.block_timestamp(block_number).await {
            Ok(timestamp) => timestamp,
            Err(err) => {
                warn!(block_number, error = %err, "block timestamp unavailable");
                0
            }
        };
        Ok(Confirmation {
            status,
            block_number,
            gas_used,
            timestamp,
        })
    }
}

fn read_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_millis(50),
        max_interval: Duration::from_millis(500),
        max_elapsed_time: Some(Duration::from_secs(2)),
        multiplier: 2.0,
        ..Default::default()
    }
}

#[async_trait]
impl ChainReader for JsonRpc {
    /// Reads are idempotent, so transport failures are retried with backoff.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, AggrError> {
        let data = &data;
        retry(read_backoff(), || async move {
            self.eth_call_once(to, data).await.map_err(|e| match e {
                AggrError::Transport(_) => {
                    debug!(error = %e, to = %to, "eth_call transport error; retrying");
                    backoff::Error::transient(e)
                }
                other => backoff::Error::permanent(other),
            })
        })
        .await
    }
}

#[async_trait]
impl ChainBroadcaster for JsonRpc {
    /// Submitted once; resubmission is the wallet's decision.
    async fn submit(&self, route: &EncodedRoute) -> Result<TxHash, AggrError> {
        let tx = json!({
            "from": self.sender,
            "to": route.target,
            "data": route.calldata,
            "value": route.native_value,
            "gas": format!("{:#x}", route.gas_limit),
        });
        self.request::<TxHash>("eth_sendTransaction", json!([tx]))
            .await
            .map_err(|e| AggrError::SubmissionFailed(e.to_string()))?
            .ok_or_else(|| AggrError::SubmissionFailed("eth_sendTransaction: empty result".into()))
    }

    async fn await_confirmation(
        &self,
        tx: TxHash,
        timeout: Duration,
    ) -> Result<Confirmation, AggrError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // only a receipt or the deadline ends the watch
            match self.receipt(tx).await {
                Ok(Some(receipt)) => match self.confirmation_from(receipt).await {
                    Ok(confirmation) => return Ok(confirmation),
                    Err(err) => warn!(tx = %tx, error = %err, "unreadable receipt; polling again"),
                },
                Ok(None) => debug!(tx = %tx, "receipt not yet available"),
                Err(err) => warn!(tx = %tx, error = %err, "receipt poll failed; polling again"),
            }
            if tokio::time::Instant::now() + self.poll_interval >= deadline {
                return Err(AggrError::TransactionTimeout {
                    tx,
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    status: Option<String>,
    block_number: String,
    gas_used: String,
}

#[derive(Debug, Deserialize)]
struct RpcBlock {
    timestamp: String,
}

fn decode_hex(raw: &str) -> Result<Vec<u8>, AggrError> {
    hex::decode(raw.trim_start_matches("0x"))
        .map_err(|e| AggrError::Provider(format!("bad hex payload: {e}")))
}

fn parse_quantity(raw: &str) -> Result<u64, AggrError> {
    u64::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|e| AggrError::Provider(format!("bad quantity {raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, routing::post, Json, Router};
    use std::sync::Arc;
    use std::sync::Mutex;

    #[test]
    fn quantities_and_payloads_decode() {
        assert_eq!(parse_quantity("0x1b4").unwrap(), 436);
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert!(parse_quantity("0xzz").is_err());
        assert_eq!(decode_hex("0x0102").unwrap(), vec![1, 2]);
        assert_eq!(decode_hex("0x").unwrap(), Vec::<u8>::new());
    }

    #[derive(Default)]
    struct NodeState {
        receipt_polls: Mutex<u32>,
        /// Receipt polls answered with an RPC error before the node behaves
        receipt_errors: Mutex<u32>,
        /// Block reads answered with an RPC error before the node behaves
        block_errors: Mutex<u32>,
        methods: Mutex<Vec<String>>,
    }

    fn rpc_error(id: &Value, code: i64, message: &str) -> Json<Value> {
        Json(json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } }))
    }

    fn take_failure(counter: &Mutex<u32>) -> bool {
        let mut left = counter.lock().unwrap();
        if *left > 0 {
            *left -= 1;
            true
        } else {
            false
        }
    }

    async fn node(State(state): State<Arc<NodeState>>, Json(req): Json<Value>) -> Json<Value> {
        let method = req["method"].as_str().unwrap_or_default().to_string();
        state.methods.lock().unwrap().push(method.clone());
        let result = match method.as_str() {
            "eth_call" => json!(format!("0x{}ff", "00".repeat(31))),
            "eth_sendTransaction" => json!(format!("0x{}", "ab".repeat(32))),
            "eth_getTransactionReceipt" => {
                if take_failure(&state.receipt_errors) {
                    return rpc_error(&req["id"], -32000, "header not found");
                }
                let mut polls = state.receipt_polls.lock().unwrap();
                *polls += 1;
                if *polls < 2 {
                    Value::Null
                } else {
                    json!({ "status": "0x1", "blockNumber": "0x10", "gasUsed": "0x5208" })
                }
            }
            "eth_getBlockByNumber" => {
                if take_failure(&state.block_errors) {
                    return rpc_error(&req["id"], -32000, "block not yet indexed");
                }
                json!({ "timestamp": "0x6553f100" })
            }
            _ => return rpc_error(&req["id"], -32601, "method not found"),
        };
        Json(json!({ "jsonrpc": "2.0", "id": req["id"], "result": result }))
    }

    async fn spawn_node() -> (String, Arc<NodeState>) {
        spawn_node_with(NodeState::default()).await
    }

    async fn spawn_node_with(state: NodeState) -> (String, Arc<NodeState>) {
        let state = Arc::new(state);
        let app = Router::new().route("/", post(node)).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/"), state)
    }

    fn route() -> EncodedRoute {
        EncodedRoute {
            target: Address::repeat_byte(0x42),
            calldata: Bytes::from(vec![0xde, 0xad]),
            native_value: alloy_primitives::U256::ZERO,
            gas_limit: 300_000,
            deadline: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn eth_call_returns_decoded_bytes() {
        let (url, _) = spawn_node().await;
        let rpc = JsonRpc::new(url, Address::repeat_byte(1));
        let out = rpc.call(Address::repeat_byte(2), Bytes::new()).await.unwrap();
        assert_eq!(out.len(), 32);
        assert_eq!(out[31], 0xff);
    }

    #[tokio::test]
    async fn submit_then_poll_until_receipt() {
        let (url, state) = spawn_node().await;
        let rpc = JsonRpc::new(url, Address::repeat_byte(1))
            .with_poll_interval(Duration::from_millis(10));
        let tx = rpc.submit(&route()).await.unwrap();
        assert_eq!(tx, TxHash::repeat_byte(0xab));

        let confirmation = rpc.await_confirmation(tx, Duration::from_secs(5)).await.unwrap();
        assert_eq!(confirmation.status, TxStatus::Success);
        assert_eq!(confirmation.block_number, 16);
        assert_eq!(confirmation.gas_used, 21_000);
        assert_eq!(confirmation.timestamp, 0x6553f100);
        assert_eq!(*state.receipt_polls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn block_read_failure_does_not_lose_the_receipt() {
        let (url, state) = spawn_node_with(NodeState {
            block_errors: Mutex::new(1),
            ..Default::default()
        })
        .await;
        let rpc = JsonRpc::new(url, Address::repeat_byte(1))
            .with_poll_interval(Duration::from_millis(10));
        let confirmation = rpc
            .await_confirmation(TxHash::repeat_byte(0xab), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(confirmation.status, TxStatus::Success);
        assert_eq!(confirmation.block_number, 16);
        assert_eq!(confirmation.timestamp, 0x6553f100);
        let block_reads = state
            .methods
            .lock()
            .unwrap()
            .iter()
            .filter(|m| *m == "eth_getBlockByNumber")
            .count();
        assert_eq!(block_reads, 2);
    }

    #[tokio::test]
    async fn receipt_poll_errors_keep_the_watch_alive() {
        let (url, state) = spawn_node_with(NodeState {
            receipt_errors: Mutex::new(2),
            ..Default::default()
        })
        .await;
        let rpc = JsonRpc::new(url, Address::repeat_byte(1))
            .with_poll_interval(Duration::from_millis(10));
        let confirmation = rpc
            .await_confirmation(TxHash::repeat_byte(0xab), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(confirmation.gas_used, 21_000);
        assert_eq!(*state.receipt_errors.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn failing_node_ends_the_watch_as_timeout() {
        let (url, _) = spawn_node_with(NodeState {
            receipt_errors: Mutex::new(u32::MAX),
            ..Default::default()
        })
        .await;
        let rpc = JsonRpc::new(url, Address::repeat_byte(1))
            .with_poll_interval(Duration::from_millis(10));
        let err = rpc
            .await_confirmation(TxHash::repeat_byte(0xab), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, AggrError::TransactionTimeout { timeout_ms: 100, .. }));
    }

    #[tokio::test]
    async fn rpc_errors_surface_as_provider_errors() {
        let (url, _) = spawn_node().await;
        let rpc = JsonRpc::new(url, Address::repeat_byte(1));
        let err = rpc
            .request::<Value>("eth_unknown", json!([]))
            .await
            .unwrap_err();
        assert!(matches!(err, AggrError::Provider(msg) if msg.contains("method not found")));
    }
}
