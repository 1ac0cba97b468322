use crate::config::ServerConfig;
use crate::models::{
    round_to, DashboardResponse, HealthResponse, HistoryParams, ListParams, PredictRequest,
    PredictionList, ServiceIndex, StatsResponse,
};
use crate::{Result, ServerError, VERSION};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use inference::{Predict, PredictionResult};
use monitoring::{
    AggregateMetrics, InstrumentedPredictor, MetricsRegistry, PredictionMetrics,
    TEXT_CONTENT_TYPE,
};
use std::collections::BTreeMap;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storage::{NewPrediction, PredictionRecord, PredictionStore};
use tokio::net::TcpListener;
use tracing::{debug, info, instrument, warn};

const DASHBOARD_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
const STATS_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Shared by both routers. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<dyn Predict>,
    pub store: Arc<PredictionStore>,
    pub registry: Arc<MetricsRegistry>,
    pub aggregates: Arc<AggregateMetrics>,
    pub request_timeout: Duration,
    started: Instant,
}

impl AppState {
    /// Wraps `predictor` with request metrics registered on a fresh registry.
    pub fn new<P: Predict + 'static>(
        predictor: P,
        store: PredictionStore,
        request_timeout: Duration,
    ) -> Result<Self> {
        let registry = Arc::new(MetricsRegistry::new());
        let metrics = Arc::new(PredictionMetrics::register(&registry)?);
        let aggregates = Arc::new(AggregateMetrics::new()?);

        Ok(Self {
            predictor: Arc::new(InstrumentedPredictor::new(predictor, metrics)),
            store: Arc::new(store),
            registry,
            aggregates,
            request_timeout,
            started: Instant::now(),
        })
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Runs a store call on the blocking pool.
    async fn with_store<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&PredictionStore) -> storage::Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        Ok(tokio::task::spawn_blocking(move || f(&store)).await??)
    }
}

/// Prediction API: index, health, predict, history, dashboard and metrics.
pub fn prediction_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(prediction_index))
        .route("/health", get(health))
        .route("/api/predict", post(predict))
        .route("/history", get(history))
        .route("/dashboard", get(dashboard))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Read-only records API over the prediction store.
pub fn records_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(records_index))
        .route("/predictions", get(list_predictions))
        .route("/predictions/:id", get(get_prediction))
        .route("/stats", get(stats))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serves both routers until ctrl-c.
pub async fn serve(state: AppState, config: &ServerConfig) -> Result<()> {
    let web_listener = TcpListener::bind(config.webapp_address()).await?;
    let db_listener = TcpListener::bind(config.dbapp_address()).await?;
    info!("Prediction API listening on {}", web_listener.local_addr()?);
    info!("Records API listening on {}", db_listener.local_addr()?);

    let web = axum::serve(web_listener, prediction_router(state.clone()))
        .with_graceful_shutdown(shutdown_signal());
    let db = axum::serve(db_listener, records_router(state))
        .with_graceful_shutdown(shutdown_signal());

    tokio::try_join!(web.into_future(), db.into_future())?;
    info!("Servers stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn prediction_index() -> Json<ServiceIndex> {
    Json(ServiceIndex::new(
        "Sentiment Analysis API",
        &[
            ("/health", "Service health"),
            ("/api/predict", "POST {\"text\": ...} to classify text"),
            ("/history", "Recent predictions, 20 per page"),
            ("/dashboard", "Summary statistics"),
            ("/metrics", "Prometheus metrics"),
        ],
    ))
}

async fn records_index() -> Json<ServiceIndex> {
    Json(ServiceIndex::new(
        "Sentiment Analysis DB API",
        &[
            ("/predictions", "List predictions (page, per_page, sentiment)"),
            ("/predictions/{id}", "Get a prediction by id"),
            ("/stats", "Prediction statistics"),
            ("/metrics", "Prometheus metrics"),
        ],
    ))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: VERSION.to_string(),
        uptime_seconds: state.uptime().as_secs(),
    })
}

#[instrument(skip(state, request))]
async fn predict(
    State(state): State<AppState>,
    request: std::result::Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictionResult>> {
    let Json(request) = request?;
    if request.text.trim().is_empty() {
        return Err(ServerError::BadRequest("Text is required".to_string()));
    }

    let predictor = Arc::clone(&state.predictor);
    let store = Arc::clone(&state.store);
    let task = tokio::task::spawn_blocking(move || {
        let result = predictor.predict(&request.text);
        if result.success {
            persist(&store, &result);
        }
        result
    });

    let result = tokio::time::timeout(state.request_timeout, task)
        .await
        .map_err(|_| ServerError::Timeout(state.request_timeout))??;
    Ok(Json(result))
}

fn persist(store: &PredictionStore, result: &PredictionResult) {
    match NewPrediction::from_result(result).and_then(|record| store.insert(&record)) {
        Ok(id) => debug!("Stored prediction {} as row {}", result.request_id, id),
        Err(e) => warn!("Failed to store prediction {}: {}", result.request_id, e),
    }
}

#[instrument(skip(state, params))]
async fn history(
    State(state): State<AppState>,
    params: std::result::Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<PredictionList>> {
    let Query(params) = params?;
    let query = params.to_query();
    let page = state.with_store(move |store| store.list(&query)).await?;
    Ok(Json(page.into()))
}

#[instrument(skip(state))]
async fn dashboard(State(state): State<AppState>) -> Result<Json<DashboardResponse>> {
    let response = state
        .with_store(|store| {
            let sentiment_distribution: BTreeMap<String, u64> = store
                .stats_by_label()?
                .into_iter()
                .map(|stats| (stats.sentiment, stats.count))
                .collect();
            let averages = store.averages()?;

            Ok(DashboardResponse {
                total_predictions: store.count()?,
                recent_predictions: store.count_recent(DASHBOARD_WINDOW)?,
                sentiment_distribution,
                avg_confidence: round_to(averages.confidence, 3),
                avg_processing_time: round_to(averages.processing_time, 4),
            })
        })
        .await?;
    Ok(Json(response))
}

#[instrument(skip(state, params))]
async fn list_predictions(
    State(state): State<AppState>,
    params: std::result::Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<PredictionList>> {
    let Query(params) = params?;
    let query = params.to_query();
    let page = state.with_store(move |store| store.list(&query)).await?;
    Ok(Json(page.into()))
}

#[instrument(skip(state))]
async fn get_prediction(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PredictionRecord>> {
    state
        .with_store(move |store| store.get(id))
        .await?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound("Prediction not found".to_string()))
}

#[instrument(skip(state))]
async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let response = state
        .with_store(|store| {
            Ok(StatsResponse {
                total_predictions: store.count()?,
                recent_activity_last_hour: store.count_recent(STATS_WINDOW)?,
                sentiment_distribution: store.stats_by_label()?,
                confidence_stats: store.confidence_stats()?,
            })
        })
        .await?;
    Ok(Json(response))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let mut body = state.registry.render();
    body.push_str(&state.aggregates.registry().render());
    ([(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)], body)
}
