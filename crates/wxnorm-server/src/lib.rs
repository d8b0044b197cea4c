//! HTTP surface: batch intake, station and measurement reads, health and metrics

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use opentelemetry::metrics::{Counter, MeterProvider};
use opentelemetry::KeyValue;
use opentelemetry_prometheus::exporter;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Deserialize;
use tracing::{info, warn};
use wxnorm_config::{AppConfig, ConfigError};
use wxnorm_core::{ModuleFamily, ObservationBatch, ObsolescenceLevel, Quantity};
use wxnorm_db::{Cache, CacheKey, CacheNamespace, MeasurementStore};
use wxnorm_ingest::{Dispatcher, IngestError, IngestSettings, Ingestor};
use wxnorm_obs::Event;
use wxnorm_query::{QueryError, QueryLayer, ReadOptions};

const FACILITY: &str = "http";

/// Everything the server needs besides its storage backends
#[derive(Debug, Clone, Default)]
pub struct ServerSettings {
    pub ingest: IngestSettings,
    pub workers: usize,
    pub queue_depth: usize,
    pub obsolescence: ObsolescenceLevel,
}

impl ServerSettings {
    pub fn from_config(cfg: &AppConfig) -> Result<Self, ConfigError> {
        let timezones = cfg
            .stations
            .keys()
            .filter_map(|id| Some((id.clone(), cfg.station_timezone(id)?.to_string())))
            .collect();
        Ok(Self {
            ingest: IngestSettings {
                rules: cfg.boundary_rules()?,
                collect_history: cfg.history_enabled(),
                timezones,
            },
            workers: cfg.ingest.workers,
            queue_depth: cfg.ingest.queue_depth,
            obsolescence: cfg.obsolescence_level(),
        })
    }
}

pub struct AppState {
    ready: AtomicBool,
    registry: Registry,
    #[allow(dead_code)]
    provider: SdkMeterProvider,
    requests_total: Counter<u64>,
    batches_total: Counter<u64>,
    writes_total: Counter<u64>,
    store: Arc<dyn MeasurementStore>,
    cache: Arc<dyn Cache>,
    dispatcher: Dispatcher,
    query: QueryLayer,
}

/// Build the router and its shared state. Spawns the ingest workers, so it
/// must run inside a tokio runtime.
pub fn build_app(
    store: Arc<dyn MeasurementStore>,
    cache: Arc<dyn Cache>,
    settings: ServerSettings,
) -> Result<(Router, Arc<AppState>)> {
    // Prometheus exporter via OpenTelemetry
    let registry = Registry::new();
    let reader = exporter().with_registry(registry.clone()).build()?;
    let provider = SdkMeterProvider::builder().with_reader(reader).build();
    let meter = provider.meter("wxnorm-server");

    let requests_total = meter
        .u64_counter("wxnorm_requests_total")
        .with_description("Total HTTP requests served")
        .init();
    let batches_total = meter
        .u64_counter("wxnorm_batches_total")
        .with_description("Observation batches by outcome")
        .init();
    let writes_total = meter
        .u64_counter("wxnorm_writes_total")
        .with_description("Measurement writes by outcome")
        .init();

    let ingestor = Ingestor::new(Arc::clone(&store), Arc::clone(&cache), settings.ingest);
    let dispatcher = Dispatcher::spawn(Arc::new(ingestor), settings.workers, settings.queue_depth);
    let query = QueryLayer::new(Arc::clone(&store), Arc::clone(&cache), settings.obsolescence);

    let state = Arc::new(AppState {
        ready: AtomicBool::new(false),
        registry,
        provider,
        requests_total,
        batches_total,
        writes_total,
        store,
        cache,
        dispatcher,
        query,
    });

    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/batches", post(submit_batch))
        .route("/api/v1/stations", get(list_stations))
        .route(
            "/api/v1/stations/:station_id",
            get(get_station).delete(delete_station),
        )
        .route(
            "/api/v1/stations/:station_id/measurements",
            get(station_measurements),
        )
        .route("/api/v1/measurements", get(recent_measurements))
        .with_state(Arc::clone(&state));

    Ok((router, state))
}

pub fn set_ready(state: &Arc<AppState>, is_ready: bool) {
    state.ready.store(is_ready, Ordering::Relaxed);
}

/// Drain the ingest queues once no request holds the state any more
pub async fn shutdown(state: Arc<AppState>) {
    set_ready(&state, false);
    match Arc::try_unwrap(state) {
        Ok(state) => state.dispatcher.shutdown().await,
        Err(_) => warn!("App state still shared; skipping ingest drain"),
    }
}

/// Error body returned by the API
enum ApiError {
    BadRequest(String),
    NotFound,
    Unprocessable(String),
    Unavailable(String),
    Inconsistent,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            ApiError::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, m),
            ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
            ApiError::Inconsistent => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "inconsistent data".to_string(),
            ),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        Event::new(FACILITY, "query", 401, e.to_string()).error();
        ApiError::Inconsistent
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::MalformedBatch(_) => ApiError::Unprocessable(e.to_string()),
            _ => ApiError::Unavailable(e.to_string()),
        }
    }
}

async fn healthz(State(state): State<Arc<AppState>>) -> StatusCode {
    state.requests_total.add(1, &[]);
    StatusCode::OK
}

async fn readyz(State(state): State<Arc<AppState>>) -> StatusCode {
    if !state.ready.load(Ordering::Relaxed) {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    match state.store.ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "Store not reachable");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn metrics(
    State(state): State<Arc<AppState>>,
) -> (
    [(axum::http::header::HeaderName, axum::http::HeaderValue); 1],
    String,
) {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buf) {
        tracing::warn!(error=?e, "failed to encode metrics");
    }
    let body = String::from_utf8(buf).unwrap_or_default();
    let header = (
        header::CONTENT_TYPE,
        axum::http::HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );
    ([header], body)
}

async fn submit_batch(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<ObservationBatch>,
) -> Result<Response, ApiError> {
    state.requests_total.add(1, &[]);
    match state.dispatcher.submit(batch).await {
        Ok(report) => {
            state
                .batches_total
                .add(1, &[KeyValue::new("outcome", "applied")]);
            state.writes_total.add(
                report.accepted as u64,
                &[KeyValue::new("outcome", "accepted")],
            );
            state.writes_total.add(
                report.rejected as u64,
                &[KeyValue::new("outcome", "rejected")],
            );
            Ok((StatusCode::OK, Json(report)).into_response())
        }
        Err(e) => {
            let outcome = match e {
                IngestError::MalformedBatch(_) => "malformed",
                _ => "failed",
            };
            state
                .batches_total
                .add(1, &[KeyValue::new("outcome", outcome)]);
            Err(e.into())
        }
    }
}

#[derive(Debug, Deserialize)]
struct StationsQuery {
    family: Option<String>,
}

async fn list_stations(
    State(state): State<Arc<AppState>>,
    Query(q): Query<StationsQuery>,
) -> Result<Response, ApiError> {
    state.requests_total.add(1, &[]);
    let stations = match q.family.as_deref() {
        Some(family) => {
            let family = family
                .parse::<ModuleFamily>()
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            state.query.stations_by_family(family).await?
        }
        None => state.query.stations().await?,
    };
    Ok((StatusCode::OK, Json(stations)).into_response())
}

async fn get_station(
    State(state): State<Arc<AppState>>,
    Path(station_id): Path<String>,
) -> Result<Response, ApiError> {
    state.requests_total.add(1, &[]);
    match state.query.station(&station_id).await? {
        Some(station) => Ok((StatusCode::OK, Json(station)).into_response()),
        None => Err(ApiError::NotFound),
    }
}

async fn delete_station(
    State(state): State<Arc<AppState>>,
    Path(station_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.requests_total.add(1, &[]);
    let removed = state
        .store
        .delete_station(&station_id)
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;
    if !removed {
        return Err(ApiError::NotFound);
    }

    state.cache.invalidate(&CacheKey::station(&station_id)).await;
    state
        .cache
        .invalidate_namespace(CacheNamespace::Stations)
        .await;
    state
        .cache
        .invalidate_namespace(CacheNamespace::StationFamily)
        .await;
    info!(station_id = %station_id, "Station deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct MeasurementsQuery {
    module: Option<String>,
    measure: Option<String>,
    since: Option<i64>,
    #[serde(default)]
    fresh: bool,
}

fn read_options(fresh: bool) -> ReadOptions {
    let now = chrono::Utc::now().timestamp();
    if fresh {
        ReadOptions::fresh(now)
    } else {
        ReadOptions::all(now)
    }
}

async fn station_measurements(
    State(state): State<Arc<AppState>>,
    Path(station_id): Path<String>,
    Query(q): Query<MeasurementsQuery>,
) -> Result<Response, ApiError> {
    state.requests_total.add(1, &[]);
    let options = read_options(q.fresh);

    let mut measurements = match (q.measure.as_deref(), q.module.as_deref()) {
        (Some(measure), module) => {
            let quantity = measure
                .parse::<Quantity>()
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            state
                .query
                .measure_family(&station_id, module, quantity, options)
                .await?
        }
        (None, Some(module)) => {
            state
                .query
                .module_measurements(&station_id, module, options)
                .await?
        }
        (None, None) => state.query.station_measurements(&station_id, options).await?,
    };
    if let Some(since) = q.since {
        measurements.retain(|m| m.timestamp >= since);
    }
    Ok((StatusCode::OK, Json(measurements)).into_response())
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    since: i64,
    #[serde(default)]
    fresh: bool,
}

async fn recent_measurements(
    State(state): State<Arc<AppState>>,
    Query(q): Query<RecentQuery>,
) -> Result<Response, ApiError> {
    state.requests_total.add(1, &[]);
    let measurements = state
        .query
        .measurements_since(q.since, read_options(q.fresh))
        .await?;
    Ok((StatusCode::OK, Json(measurements)).into_response())
}
