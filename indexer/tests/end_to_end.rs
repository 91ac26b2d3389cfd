//! Change log to JSON-RPC answers, through the real decoder, processor,
//! stores and router.

mod common;

use std::sync::Arc;

use anchor_lang::prelude::Pubkey;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sgraph_indexer::types::encode_hash;
use sgraph_indexer::{
    FileStore, IngestConfig, MemorySource, MemoryStore, Processor, RelationStore, RpcServer,
};
use tower::ServiceExt;

use common::Ledger;

async fn call(router: &Router, method: &str, params: Value) -> Value {
    let body = json!({"jsonrpc": "2.0", "method": method, "params": params, "id": 1});
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn processor(source: &MemorySource, store: Arc<dyn RelationStore>) -> Processor {
    Processor::new(
        Arc::new(source.clone()),
        store,
        graph::ID,
        IngestConfig::default(),
    )
}

#[tokio::test]
async fn relation_lifecycle_is_queryable() {
    let mut ledger = Ledger::new();
    let source = MemorySource::new();
    let store = Arc::new(MemoryStore::new());
    let processor = processor(&source, store.clone());
    let router = RpcServer::new(store, processor.status(), 30).into_router();

    let (x, y, p) = (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
    let added = ledger.add(x, y, p, vec![1, 2, 3]);
    source.push(ledger.transaction(&[added]));
    processor.step().await.unwrap();

    let found = call(&router, "sg_findRelations", json!({"from": x.to_string()})).await;
    let relations = found["result"].as_array().unwrap();
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0]["to"], y.to_string());
    assert_eq!(relations[0]["provider"], p.to_string());
    assert_eq!(relations[0]["extra"], "AQID");
    assert!(relations[0]["disconnectedAt"].is_null());

    let disconnected = ledger.disconnect(0);
    source.push(ledger.transaction(&[disconnected]));
    processor.step().await.unwrap();

    let found = call(&router, "sg_findRelations", json!({"from": x.to_string()})).await;
    let relations = found["result"].as_array().unwrap();
    assert_eq!(relations.len(), 1);
    assert!(relations[0]["disconnectedAt"].as_i64().is_some());

    // The mirror's root matches the ledger tree after both mutations.
    let proof = call(&router, "sg_getRelationProof", json!({"leafIndex": 0})).await;
    assert_eq!(proof["result"]["root"], encode_hash(&ledger.root()));

    let status = call(&router, "sg_status", Value::Null).await;
    assert_eq!(status["result"]["tree"]["seq"], 2);
    assert_eq!(status["result"]["relations"], 1);
    assert_eq!(status["result"]["disconnected"], 1);
}

#[tokio::test]
async fn filters_and_pages_across_providers() {
    let mut ledger = Ledger::new();
    let source = MemorySource::new();
    let store = Arc::new(MemoryStore::new());
    let processor = processor(&source, store.clone());
    let router = RpcServer::new(store, processor.status(), 30).into_router();

    let x = Pubkey::new_unique();
    let (p1, p2) = (Pubkey::new_unique(), Pubkey::new_unique());
    let events: Vec<_> = (0..5)
        .map(|i| {
            let provider = if i % 2 == 0 { p1 } else { p2 };
            ledger.add(x, Pubkey::new_unique(), provider, vec![])
        })
        .collect();
    source.push(ledger.transaction(&events));
    processor.step().await.unwrap();

    let page = call(
        &router,
        "sg_findRelations",
        json!({"from": x.to_string(), "providers": [p1.to_string()], "limit": 2}),
    )
    .await;
    let leaves: Vec<i64> = page["result"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["leafIndex"].as_i64().unwrap())
        .collect();
    assert_eq!(leaves, vec![4, 2]);

    let next = call(
        &router,
        "sg_findRelations",
        json!({"from": x.to_string(), "providers": [p1.to_string()], "limit": 2, "after": "2"}),
    )
    .await;
    assert_eq!(next["result"].as_array().unwrap().len(), 1);
    assert_eq!(next["result"][0]["leafIndex"], 0);

    let both = call(
        &router,
        "sg_findRelations",
        json!({"providers": [p1.to_string(), p2.to_string()]}),
    )
    .await;
    assert_eq!(both["result"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn file_store_restart_resumes_without_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mirror");
    let mut ledger = Ledger::new();
    let source = MemorySource::new();

    let first = ledger.add(Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique(), vec![]);
    source.push(ledger.transaction(&[first]));
    {
        let store: Arc<dyn RelationStore> = Arc::new(FileStore::open(&path).await.unwrap());
        let outcome = processor(&source, store).step().await.unwrap();
        assert_eq!(outcome.events, 1);
    }

    let second = ledger.add(Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique(), vec![]);
    source.push(ledger.transaction(&[second]));

    let store: Arc<dyn RelationStore> = Arc::new(FileStore::open(&path).await.unwrap());
    let outcome = processor(&source, store.clone()).step().await.unwrap();
    assert_eq!(outcome.transactions, 1);
    assert_eq!(outcome.stats.inserted, 1);

    let all = store.all().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(
        store.checkpoint().await.unwrap().unwrap().tree.unwrap().root,
        ledger.root()
    );
}

#[tokio::test]
async fn events_from_other_programs_are_ignored() {
    let mut ledger = Ledger::new();
    let source = MemorySource::new();
    let store = Arc::new(MemoryStore::new());
    let processor = processor(&source, store.clone());

    let event = ledger.add(Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique(), vec![]);
    let mut tx = ledger.transaction(&[]);
    tx.logs = sgraph_indexer::decode::invocation_logs(&Pubkey::new_unique(), &[event]);
    source.push(tx);

    let outcome = processor.step().await.unwrap();
    assert_eq!(outcome.transactions, 1);
    assert_eq!(outcome.events, 0);
    assert!(store.all().await.unwrap().is_empty());
}
