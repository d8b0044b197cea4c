use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use wxnorm_db::{CurrentRow, MeasurementStore, MemoryCache, MemoryStore};
use wxnorm_server::{build_app, ServerSettings};

fn settings() -> ServerSettings {
    ServerSettings {
        workers: 2,
        queue_depth: 8,
        ..ServerSettings::default()
    }
}

fn app() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let (app, _) = build_app(store.clone(), Arc::new(MemoryCache::new()), settings()).unwrap();
    (app, store)
}

fn batch(station_id: &str, temperature: f64) -> Value {
    json!({
        "station_id": station_id,
        "station_name": "Home",
        "station_type": "netatmo",
        "module_id": "02:00:00:00:00:01",
        "module_name": "Garden",
        "module_type": "outdoor",
        "readings": { "temperature": temperature, "humidity": 70 },
        "place": {
            "city": "Lyon",
            "country": "FR",
            "timezone": "Europe/Paris",
            "altitude": 170.0,
            "latitude": 45.76,
            "longitude": 4.83
        }
    })
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let res = app.clone().oneshot(request).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn batch_then_read_back() {
    let (app, _) = app();

    let (status, report) = send(&app, "POST", "/api/v1/batches", Some(batch("st-1", 12.5))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["station_id"], "st-1");
    assert_eq!(report["rejected"], 0);
    assert_eq!(report["station_changed"], true);

    let (status, stations) = send(&app, "GET", "/api/v1/stations", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stations.as_array().unwrap().len(), 1);
    assert_eq!(stations[0]["location"]["city"], "Lyon");

    let (status, station) = send(&app, "GET", "/api/v1/stations/st-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(station["station_type"], "netatmo");

    let (status, family) = send(
        &app,
        "GET",
        "/api/v1/stations/st-1/measurements?measure=temperature",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = family
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["measure_type"].as_str())
        .collect();
    assert!(names.contains(&"temperature"));
    assert!(names.contains(&"temperature_min"));
    assert!(names.contains(&"temperature_trend"));
    assert!(!names.contains(&"temperature_ref"));
    assert!(!names.contains(&"humidity"));
}

#[tokio::test]
async fn station_family_listing() {
    let (app, _) = app();
    send(&app, "POST", "/api/v1/batches", Some(batch("st-1", 10.0))).await;

    let (status, outdoor) = send(&app, "GET", "/api/v1/stations?family=outdoor", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outdoor.as_array().unwrap().len(), 1);

    let (_, wind) = send(&app, "GET", "/api/v1/stations?family=wind", None).await;
    assert!(wind.as_array().unwrap().is_empty());

    let (status, _) = send(&app, "GET", "/api/v1/stations?family=toaster", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_batch_is_unprocessable() {
    let (app, store) = app();
    let (status, body) = send(&app, "POST", "/api/v1/batches", Some(batch("", 10.0))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("station"));
    assert!(store.list_stations().await.unwrap().is_empty());
}

#[tokio::test]
async fn storage_failure_is_unavailable() {
    let (app, store) = app();
    store.set_unavailable(true);
    let (status, _) = send(&app, "POST", "/api/v1/batches", Some(batch("st-1", 10.0))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn inconsistent_row_is_server_error() {
    let (app, store) = app();
    store
        .upsert_current(&CurrentRow {
            device_id: "st-1".into(),
            module_id: "m".into(),
            module_type: "outdoor".into(),
            measure_type: "not_a_measure".into(),
            device_name: "Home".into(),
            module_name: "Garden".into(),
            measure_timestamp: 1_700_000_000,
            measure_value: "1".into(),
        })
        .await
        .unwrap();

    let (status, body) = send(&app, "GET", "/api/v1/stations/st-1/measurements", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "inconsistent data" }));
}

#[tokio::test]
async fn delete_station_invalidates_listing() {
    let (app, _) = app();
    send(&app, "POST", "/api/v1/batches", Some(batch("st-1", 10.0))).await;

    // warm the cache
    let (_, stations) = send(&app, "GET", "/api/v1/stations", None).await;
    assert_eq!(stations.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "DELETE", "/api/v1/stations/st-1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, stations) = send(&app, "GET", "/api/v1/stations", None).await;
    assert!(stations.as_array().unwrap().is_empty());
    let (status, _) = send(&app, "GET", "/api/v1/stations/st-1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "DELETE", "/api/v1/stations/st-1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn recent_measurements_across_stations() {
    let (app, _) = app();
    send(&app, "POST", "/api/v1/batches", Some(batch("st-1", 10.0))).await;
    send(&app, "POST", "/api/v1/batches", Some(batch("st-2", 11.0))).await;

    let (status, rows) = send(&app, "GET", "/api/v1/measurements?since=0", None).await;
    assert_eq!(status, StatusCode::OK);
    let rows = rows.as_array().unwrap();
    assert!(rows.iter().any(|m| m["device_id"] == "st-1"));
    assert!(rows.iter().any(|m| m["device_id"] == "st-2"));
}
