//! HTTP engine client against a stub engine served on an ephemeral port.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use geop_common::{AreaDescriptor, AreaId, GeopError};
use geoprocessing::{
    GeoprocessingEngine, HttpEngine, LayerConfig, MultiRequest, OperationSet, RetryPolicy,
    RunRequest,
};
use geoprocessing::catalog::Operation;
use test_utils::{multi_response, nlcd_result, pa_square};

#[derive(Clone, Default)]
struct Stub {
    hits: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<Value>>>,
}

async fn run_ok(State(stub): State<Stub>, Json(body): Json<Value>) -> Json<Value> {
    stub.hits.fetch_add(1, Ordering::SeqCst);
    stub.bodies.lock().unwrap().push(body);
    Json(nlcd_result())
}

async fn run_without_result(State(stub): State<Stub>) -> Json<Value> {
    stub.hits.fetch_add(1, Ordering::SeqCst);
    Json(json!({"status": "done"}))
}

async fn run_error(State(stub): State<Stub>) -> (StatusCode, String) {
    stub.hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::INTERNAL_SERVER_ERROR, "raster not found".to_string())
}

async fn multi_ok(State(stub): State<Stub>, Json(body): Json<Value>) -> Json<Value> {
    stub.hits.fetch_add(1, Ordering::SeqCst);
    let ids: Vec<String> = body["shapes"]
        .as_array()
        .map(|shapes| {
            shapes
                .iter()
                .filter_map(|s| s["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
    Json(multi_response(&ids, &json!({"gwn": {"List(1)": 3.0}})))
}

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn engine(addr: SocketAddr) -> HttpEngine {
    HttpEngine::with_base_url(
        format!("http://{}", addr),
        Duration::from_secs(5),
        RetryPolicy {
            max_retries: 2,
            initial_delay_ms: 10,
            max_delay_ms: 20,
        },
    )
    .unwrap()
}

fn nlcd_request() -> RunRequest {
    let mut payload = Map::new();
    payload.insert("polygon".into(), json!([pa_square().to_string()]));
    RunRequest::for_operation(&Operation::Nlcd.spec(), &LayerConfig::default(), &payload).unwrap()
}

#[tokio::test]
async fn test_run_returns_result_map() {
    let stub = Stub::default();
    let app = Router::new()
        .route("/run", post(run_ok))
        .with_state(stub.clone());
    let addr = serve(app).await;

    let result = engine(addr).run(&nlcd_request()).await.unwrap();

    assert_eq!(result["List(41)"], 400.0);
    assert_eq!(stub.hits.load(Ordering::SeqCst), 1);

    let body = stub.bodies.lock().unwrap()[0].clone();
    assert_eq!(body["input"]["operationType"], "RasterGroupedCount");
    assert!(body["input"]["polygon"].is_array());
}

#[tokio::test]
async fn test_missing_result_is_engine_error() {
    let stub = Stub::default();
    let app = Router::new()
        .route("/run", post(run_without_result))
        .with_state(stub.clone());
    let addr = serve(app).await;

    let err = engine(addr).run(&nlcd_request()).await.unwrap_err();
    assert_eq!(err.kind(), "engine");
}

#[tokio::test]
async fn test_server_error_is_not_retried() {
    let stub = Stub::default();
    let app = Router::new()
        .route("/run", post(run_error))
        .with_state(stub.clone());
    let addr = serve(app).await;

    let err = engine(addr).run(&nlcd_request()).await.unwrap_err();

    match err {
        GeopError::Engine(message) => assert!(message.contains("raster not found")),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(stub.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unreachable_engine_gives_up_after_retries() {
    // Bind and release a port so nothing is listening on it.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = engine(addr).run(&nlcd_request()).await.unwrap_err();

    assert_eq!(err, GeopError::ServiceUnreachable);
    assert_eq!(err.to_string(), "service unreachable");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_multi_round_trip() {
    let stub = Stub::default();
    let app = Router::new()
        .route("/multi", post(multi_ok))
        .with_state(stub.clone());
    let addr = serve(app).await;

    let a = AreaDescriptor::new(AreaId::well_known("huc12", "1"), pa_square());
    let b = AreaDescriptor::uncached(pa_square()).with_member_id("sb-2");
    let request = MultiRequest::build(
        OperationSet::MapshedCore,
        &[&a, &b],
        &json!([]),
        &LayerConfig::default(),
    )
    .unwrap();

    let response = engine(addr).multi(&request).await.unwrap();

    assert_eq!(response.len(), 2);
    assert_eq!(response["sb-2"]["gwn"]["List(1)"], 3.0);
    assert_eq!(stub.hits.load(Ordering::SeqCst), 1);
}
