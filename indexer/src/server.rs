//! JSON-RPC 2.0 query endpoint.
//!
//! Every call is an HTTP `POST /` with a `{jsonrpc, method, params, id}`
//! body. Method names are matched case-insensitively:
//!
//! - `sg_findRelations`: filtered, paged relation lookup
//! - `sg_getRelationProof`: leaf proof rebuilt from the mirror
//! - `sg_status`: ingestion progress and mirror size
//!
//! An unparseable body answers HTTP 400 with code `-32700`; every other
//! outcome is HTTP 200 with either `result` or an `error` object.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{IndexerError, IndexerResult};
use crate::ingest::{StatusHandle, StatusSnapshot};
use crate::proof::MirrorTree;
use crate::query::{FindRelationsParams, RelationFilter};
use crate::store::RelationStore;
use crate::types::{encode_hash, RelationRecord, TreeState};

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const SERVER_ERROR: i64 = -32000;

/// Rebuilds tolerated while ingestion keeps moving the mirror.
const PROOF_ATTEMPTS: usize = 3;

#[derive(Deserialize)]
struct RpcRequest {
    #[serde(default)]
    method: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    id: Value,
}

#[derive(Debug, Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
    id: Value,
}

#[derive(Debug, Serialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
            id,
        }
    }

    fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
            id,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelationProofParams {
    leaf_index: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelationProof {
    leaf_index: u32,
    root: String,
    proof: Vec<String>,
    relation: RelationRecord,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexerStatus {
    #[serde(flatten)]
    ingest: StatusSnapshot,
    relations: usize,
    disconnected: usize,
}

#[derive(Clone)]
struct AppState {
    store: Arc<dyn RelationStore>,
    status: StatusHandle,
    depth: u32,
    tree: Arc<Mutex<Option<(TreeState, Arc<MirrorTree>)>>>,
}

impl AppState {
    /// Tree rebuilt from the mirror and checked against the checkpoint's
    /// root. `None` when the checkpoint moved during the rebuild.
    async fn mirror_tree(&self) -> IndexerResult<Option<Arc<MirrorTree>>> {
        let expected = self
            .store
            .checkpoint()
            .await?
            .and_then(|checkpoint| checkpoint.tree)
            .ok_or_else(|| IndexerError::inconsistent("no tree state recorded"))?;
        let cached = self.tree.lock().clone();
        if let Some((state, tree)) = cached {
            if state == expected {
                return Ok(Some(tree));
            }
        }

        let records = self.store.all().await?;
        let tree = MirrorTree::from_records(self.depth, &records)?;
        if tree.root() != expected.root {
            let current = self.store.checkpoint().await?.and_then(|c| c.tree);
            if current != Some(expected) {
                return Ok(None);
            }
            return Err(IndexerError::inconsistent(format!(
                "rebuilt root {} does not match root {} at seq {}",
                encode_hash(&tree.root()),
                encode_hash(&expected.root),
                expected.seq
            )));
        }

        let tree = Arc::new(tree);
        debug!(seq = expected.seq, leaves = tree.len(), "rebuilt mirror tree");
        *self.tree.lock() = Some((expected, tree.clone()));
        Ok(Some(tree))
    }
}

/// HTTP front end over a [`RelationStore`].
pub struct RpcServer {
    router: Router,
}

impl RpcServer {
    /// `depth` is the commitment tree depth proofs are built for.
    pub fn new(store: Arc<dyn RelationStore>, status: StatusHandle, depth: u32) -> Self {
        let state = AppState {
            store,
            status,
            depth,
            tree: Arc::default(),
        };
        let router = Router::new().route("/", post(handle)).with_state(state);
        Self { router }
    }

    /// Return the inner [`Router`] (useful for testing with `tower::ServiceExt`).
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve until `shutdown` completes, then drain in-flight requests.
    pub async fn serve_with_shutdown(
        self,
        addr: &str,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr, "JSON-RPC server listening");
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

async fn handle(State(state): State<AppState>, body: Bytes) -> Response {
    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "unparseable request");
            let response = RpcResponse::failure(Value::Null, PARSE_ERROR, "Parse error");
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    };

    let method = request.method.to_lowercase();
    let outcome = match method.as_str() {
        "sg_findrelations" => find_relations(&state, request.params).await,
        "sg_getrelationproof" => relation_proof(&state, request.params).await,
        "sg_status" => status(&state).await,
        _ => {
            let response = RpcResponse::failure(request.id, METHOD_NOT_FOUND, "method not found");
            return Json(response).into_response();
        }
    };

    let response = match outcome {
        Ok(result) => RpcResponse::success(request.id, result),
        Err(e) => {
            warn!(method = %request.method, error = %e, "request failed");
            RpcResponse::failure(request.id, SERVER_ERROR, e.to_string())
        }
    };
    Json(response).into_response()
}

/// Absent or `null` params read as an empty object.
fn params<T: for<'de> Deserialize<'de> + Default>(params: Value) -> IndexerResult<T> {
    if params.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(params).map_err(|e| IndexerError::InvalidParams {
        message: e.to_string(),
    })
}

async fn find_relations(state: &AppState, raw: Value) -> IndexerResult<Value> {
    let filter = RelationFilter::try_from(params::<FindRelationsParams>(raw)?)?;
    let relations = state.store.find(&filter).await?;
    Ok(serde_json::to_value(relations)?)
}

async fn relation_proof(state: &AppState, raw: Value) -> IndexerResult<Value> {
    if raw.is_null() {
        return Err(IndexerError::InvalidParams {
            message: "missing field `leafIndex`".to_string(),
        });
    }
    let RelationProofParams { leaf_index } = params(raw)?;

    for _ in 0..PROOF_ATTEMPTS {
        let relation = state
            .store
            .get(leaf_index)
            .await?
            .ok_or(IndexerError::NotFound { leaf_index })?;
        let Some(tree) = state.mirror_tree().await? else {
            continue;
        };
        // the relation may have been rewritten after the tree was built
        if tree.leaf(leaf_index) != relation.leaf_hash() {
            continue;
        }
        let proof = tree.proof(leaf_index)?;
        return Ok(serde_json::to_value(RelationProof {
            leaf_index,
            root: encode_hash(&tree.root()),
            proof: proof.iter().map(encode_hash).collect(),
            relation,
        })?);
    }
    Err(IndexerError::inconsistent(format!(
        "leaf {leaf_index} kept changing while its proof was built"
    )))
}

async fn status(state: &AppState) -> IndexerResult<Value> {
    let stats = state.store.stats().await?;
    Ok(serde_json::to_value(IndexerStatus {
        ingest: state.status.get(),
        relations: stats.records,
        disconnected: stats.disconnected,
    })?)
}
