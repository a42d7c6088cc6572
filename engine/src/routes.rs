use axum::{
    extract::{rejection::JsonRejection, MatchedPath, Request, State},
    http::header,
    middleware::{self, Next},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::Value;
use std::{sync::Arc, time::Instant};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    classifier::{classify, TextClassifier},
    config::Config,
    detectors::scan_image_urls,
    error::{validation_error, AppError},
    feed::FeedCache,
    history::{parse_submission, HistoryStore},
    notify::{EmailMessage, EmailRelay},
    reputation::DomainReputation,
    storage::{mirror_records, ThreatLogSink},
    types::{
        AnalyzeImageRequest, AnalyzeRequest, AnalyzeResponse, DetectionRecord, FeedReport,
        MessageResponse, SubmitHistoryRequest, SubmitHistoryResponse, ThreatIntelRequest,
        ThreatRecord,
    },
};

const DASHBOARD_HTML: &str = include_str!("../templates/dashboard.html");

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub reputation: Arc<DomainReputation>,
    pub feed: Arc<FeedCache>,
    pub classifier: Arc<dyn TextClassifier>,
    pub history: Arc<HistoryStore>,
    pub threat_log: Arc<dyn ThreatLogSink>,
    pub mailer: Arc<dyn EmailRelay>,
    pub metrics: Option<PrometheusHandle>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/threatIntel", post(threat_intel))
        .route("/analyze", post(analyze))
        .route("/analyzeImage", post(analyze_image))
        .route("/submitHistory", post(submit_history))
        .route("/api/threatHistory", get(threat_history))
        .route("/reportThreat", post(report_threat))
        .route("/dashboard", get(dashboard))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_endpoint))
        .route_layer(middleware::from_fn(track_metrics))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    metrics::counter!("requests_total", "endpoint" => endpoint.clone(), "status" => status)
        .increment(1);
    metrics::histogram!("request_duration_ms", "endpoint" => endpoint)
        .record(start.elapsed().as_secs_f64() * 1000.0);
    response
}

pub async fn threat_intel(
    State(state): State<AppState>,
    payload: Result<Json<ThreatIntelRequest>, JsonRejection>,
) -> Result<Json<FeedReport>, AppError> {
    let Json(request) = payload?;
    let url = request.url.unwrap_or_default();
    if url.trim().is_empty() {
        return Err(validation_error("URL is required"));
    }

    let report = state.feed.lookup(&url).await?;
    info!("PhishTank lookup for {}: {:?}", report.domain, report.threat_level);
    Ok(Json(report))
}

pub async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let Json(request) = payload?;

    if let Some(url) = request.url.as_deref().filter(|u| !u.is_empty()) {
        if let Some(hit) = state.reputation.check(url) {
            info!("Reputation hit for {}: {:?}", url, hit);
            return Ok(Json(AnalyzeResponse::Detections(vec![hit.to_record()])));
        }
    }

    let text = request.text.unwrap_or_default();
    if text.is_empty() {
        return Ok(Json(AnalyzeResponse::Detections(Vec::new())));
    }

    let result = classify(state.classifier.as_ref(), &text)?;
    Ok(Json(AnalyzeResponse::Prediction(result)))
}

pub async fn analyze_image(
    payload: Result<Json<AnalyzeImageRequest>, JsonRejection>,
) -> Result<Json<Vec<DetectionRecord>>, AppError> {
    let Json(request) = payload?;
    Ok(Json(scan_image_urls(&request.images)))
}

pub async fn submit_history(
    State(state): State<AppState>,
    payload: Result<Json<SubmitHistoryRequest>, JsonRejection>,
) -> Result<Json<SubmitHistoryResponse>, AppError> {
    let Json(request) = payload?;
    let records = parse_submission(request.threat_history)?;

    let total = state.history.append(records.clone()).await?;
    let mirrored = mirror_records(state.threat_log.as_ref(), &records).await;
    info!(
        "Appended {} threat records ({} mirrored), history total {}",
        records.len(),
        mirrored,
        total
    );

    Ok(Json(SubmitHistoryResponse {
        message: "Threat history updated".to_string(),
        total,
    }))
}

pub async fn threat_history(State(state): State<AppState>) -> Json<Vec<ThreatRecord>> {
    Json(state.history.load().await)
}

pub async fn report_threat(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let data = payload
        .ok()
        .and_then(|Json(data)| data.as_object().filter(|o| !o.is_empty()).cloned())
        .ok_or_else(|| validation_error("No JSON data received."))?;
    let threat_info = data.get("threatInfo").cloned().unwrap_or(Value::Null);

    let (user, password) = state.config.email_credentials().ok_or_else(|| {
        AppError::MissingConfiguration("Missing email credentials in configuration.".to_string())
    })?;

    let message = EmailMessage::threat_report(&user, &state.config.report_recipient, &threat_info);
    state.mailer.send(&user, &password, &message).await?;

    Ok(Json(MessageResponse {
        message: "Report sent successfully!".to_string(),
    }))
}

pub async fn dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

pub async fn health_check() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.metrics.as_ref().map(|h| h.render()).unwrap_or_default();
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
