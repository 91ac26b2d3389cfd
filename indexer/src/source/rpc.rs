use std::sync::atomic::{AtomicU64, Ordering};

use anchor_lang::prelude::Pubkey;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{IndexerError, IndexerResult};
use crate::source::{EventSource, SourceTransaction};
use crate::types::Cursor;

/// Largest page `getSignaturesForAddress` accepts.
const SIGNATURE_PAGE: usize = 1000;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SignatureInfo {
    signature: String,
    slot: u64,
    #[serde(default)]
    err: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TransactionInfo {
    slot: u64,
    #[serde(default)]
    meta: Option<TransactionMeta>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionMeta {
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    log_messages: Option<Vec<String>>,
}

/// Reads the graph program's transaction history from a ledger JSON-RPC
/// node.
///
/// Signatures are listed newest first, so catching up walks back to the
/// cursor once and keeps the walked signatures as a backlog. Backlog
/// entries are dropped only once a later `fetch` names them as its cursor,
/// so a batch that failed to apply is served again.
pub struct RpcSource {
    client: reqwest::Client,
    url: String,
    program_id: Pubkey,
    commitment: String,
    next_id: AtomicU64,
    /// Oldest first
    backlog: Mutex<Vec<SignatureInfo>>,
}

impl RpcSource {
    pub fn new(url: impl Into<String>, program_id: Pubkey, commitment: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            program_id,
            commitment: commitment.into(),
            next_id: AtomicU64::new(1),
            backlog: Mutex::new(Vec::new()),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> IndexerResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response: RpcResponse = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(IndexerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        serde_json::from_value(response.result.unwrap_or(Value::Null))
            .map_err(|e| IndexerError::source_error(format!("{method}: {e}")))
    }

    /// Every signature after `after`, oldest first.
    async fn signatures_after(&self, after: Option<&Cursor>) -> IndexerResult<Vec<SignatureInfo>> {
        let mut signatures: Vec<SignatureInfo> = Vec::new();
        let mut before: Option<String> = None;
        loop {
            let mut options = json!({
                "limit": SIGNATURE_PAGE,
                "commitment": self.commitment,
            });
            if let Some(cursor) = after {
                options["until"] = json!(cursor.signature);
            }
            if let Some(before) = &before {
                options["before"] = json!(before);
            }

            let page: Vec<SignatureInfo> = self
                .call(
                    "getSignaturesForAddress",
                    json!([self.program_id.to_string(), options]),
                )
                .await?;
            let exhausted = page.len() < SIGNATURE_PAGE;
            before = page.last().map(|info| info.signature.clone());
            signatures.extend(page);
            if exhausted || before.is_none() {
                break;
            }
        }
        signatures.reverse();
        Ok(signatures)
    }

    async fn transaction(&self, signature: &str) -> IndexerResult<Option<TransactionInfo>> {
        self.call(
            "getTransaction",
            json!([
                signature,
                {
                    "encoding": "json",
                    "commitment": self.commitment,
                    "maxSupportedTransactionVersion": 0,
                }
            ]),
        )
        .await
    }

    /// Pending signatures after `after`, refilling the backlog when it runs
    /// dry.
    async fn pending(&self, after: Option<&Cursor>, limit: usize) -> IndexerResult<Vec<SignatureInfo>> {
        {
            let mut backlog = self.backlog.lock();
            if let Some(cursor) = after {
                if let Some(position) = backlog
                    .iter()
                    .position(|info| info.signature == cursor.signature)
                {
                    backlog.drain(..=position);
                }
            }
            if !backlog.is_empty() {
                return Ok(backlog.iter().take(limit).cloned().collect());
            }
        }

        let walked = self.signatures_after(after).await?;
        debug!(count = walked.len(), "listed new signatures");
        let page = walked.iter().take(limit).cloned().collect();
        *self.backlog.lock() = walked;
        Ok(page)
    }
}

#[async_trait]
impl EventSource for RpcSource {
    async fn fetch(
        &self,
        after: Option<&Cursor>,
        limit: usize,
    ) -> IndexerResult<Vec<SourceTransaction>> {
        let mut transactions = Vec::new();
        for info in self.pending(after, limit).await? {
            if info.err.is_some() {
                transactions.push(SourceTransaction {
                    slot: info.slot,
                    signature: info.signature,
                    logs: Vec::new(),
                });
                continue;
            }

            // Not yet served by this node; stop so ordering is preserved.
            let Some(tx) = self.transaction(&info.signature).await? else {
                break;
            };
            let logs = match tx.meta {
                Some(meta) if meta.err.is_none() => meta.log_messages.unwrap_or_default(),
                _ => Vec::new(),
            };
            transactions.push(SourceTransaction {
                slot: tx.slot,
                signature: info.signature,
                logs,
            });
        }
        Ok(transactions)
    }

    async fn latest_slot(&self) -> IndexerResult<u64> {
        self.call("getSlot", json!([{ "commitment": self.commitment }]))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::State;
    use axum::routing::post;
    use axum::{Json, Router};

    use super::*;

    /// Minimal ledger node: `history` is oldest first, `(signature, slot,
    /// failed)`; signatures in `unavailable` have no transaction yet.
    #[derive(Clone)]
    struct MockNode {
        history: Arc<Vec<(String, u64, bool)>>,
        unavailable: Arc<Vec<String>>,
    }

    async fn rpc(State(node): State<MockNode>, Json(request): Json<Value>) -> Json<Value> {
        let id = request["id"].clone();
        let params = &request["params"];
        let result = match request["method"].as_str().unwrap_or_default() {
            "getSignaturesForAddress" => {
                let until = params[1]["until"].as_str();
                let newest_first: Vec<Value> = node
                    .history
                    .iter()
                    .rev()
                    .take_while(|(sig, _, _)| Some(sig.as_str()) != until)
                    .map(|(sig, slot, failed)| {
                        let err = if *failed {
                            json!({"InstructionError": [0, "Custom"]})
                        } else {
                            Value::Null
                        };
                        json!({"signature": sig, "slot": slot, "err": err})
                    })
                    .collect();
                json!(newest_first)
            }
            "getTransaction" => {
                let sig = params[0].as_str().unwrap_or_default();
                if node.unavailable.iter().any(|s| s == sig) {
                    Value::Null
                } else {
                    let slot = node
                        .history
                        .iter()
                        .find(|(s, _, _)| s == sig)
                        .map(|(_, slot, _)| *slot)
                        .unwrap_or_default();
                    json!({
                        "slot": slot,
                        "meta": {"err": null, "logMessages": [format!("log {sig}")]},
                    })
                }
            }
            "getSlot" => json!(99),
            _ => {
                return Json(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": -32601, "message": "Method not found"},
                }))
            }
        };
        Json(json!({"jsonrpc": "2.0", "id": id, "result": result}))
    }

    async fn spawn_node(node: MockNode) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = Router::new().route("/", post(rpc)).with_state(node);
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    fn history() -> Vec<(String, u64, bool)> {
        vec![
            ("a".to_string(), 10, false),
            ("b".to_string(), 11, true),
            ("c".to_string(), 12, false),
        ]
    }

    #[tokio::test]
    async fn test_fetch_oldest_first_and_resume() {
        let url = spawn_node(MockNode {
            history: Arc::new(history()),
            unavailable: Arc::new(vec![]),
        })
        .await;
        let source = RpcSource::new(url, Pubkey::new_unique(), "confirmed");

        let batch = source.fetch(None, 2).await.unwrap();
        let sigs: Vec<&str> = batch.iter().map(|tx| tx.signature.as_str()).collect();
        assert_eq!(sigs, vec!["a", "b"]);
        assert_eq!(batch[0].logs, vec!["log a".to_string()]);
        assert!(batch[1].logs.is_empty());

        let rest = source.fetch(Some(&batch[1].cursor()), 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].signature, "c");
        assert_eq!(rest[0].slot, 12);

        assert!(source.fetch(Some(&rest[0].cursor()), 2).await.unwrap().is_empty());
        assert_eq!(source.latest_slot().await.unwrap(), 99);
    }

    #[tokio::test]
    async fn test_same_cursor_serves_batch_again() {
        let url = spawn_node(MockNode {
            history: Arc::new(history()),
            unavailable: Arc::new(vec![]),
        })
        .await;
        let source = RpcSource::new(url, Pubkey::new_unique(), "confirmed");

        let first = source.fetch(None, 3).await.unwrap();
        let again = source.fetch(None, 3).await.unwrap();
        assert_eq!(first, again);
    }

    #[tokio::test]
    async fn test_unavailable_transaction_stops_batch() {
        let url = spawn_node(MockNode {
            history: Arc::new(history()),
            unavailable: Arc::new(vec!["c".to_string()]),
        })
        .await;
        let source = RpcSource::new(url, Pubkey::new_unique(), "confirmed");

        let batch = source.fetch(None, 10).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].signature, "b");
    }

    #[tokio::test]
    async fn test_rpc_error_is_reported() {
        let url = spawn_node(MockNode {
            history: Arc::new(vec![]),
            unavailable: Arc::new(vec![]),
        })
        .await;
        let source = RpcSource::new(url, Pubkey::new_unique(), "confirmed");
        let err = source
            .call::<Value>("getBlockTime", json!([]))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::Rpc { code: -32601, .. }));
    }
}
