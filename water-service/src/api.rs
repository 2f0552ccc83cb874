//! Read-only JSON API over the current snapshot.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use water_client::{
    domain::{PerformanceRating, PeriodKey, TypeCategories, ZoneDirectory},
    loss,
    zone_hint::ZoneInference,
    AnalysisError,
};

use crate::{
    loader::Loader,
    session::{SessionHandle, Snapshot},
};

#[derive(Clone)]
pub struct AppState {
    pub session: SessionHandle,
    pub loader: Arc<Loader>,
    pub zones: Arc<ZoneDirectory>,
    pub categories: Arc<TypeCategories>,
}

impl AppState {
    pub fn new(loader: Arc<Loader>) -> Self {
        let cfg = loader.config();
        Self {
            session: loader.session().clone(),
            zones: Arc::new(cfg.zone_directory()),
            categories: Arc::new(cfg.type_categories()),
            loader,
        }
    }

    async fn snapshot(&self) -> Result<Arc<Snapshot>, ApiError> {
        self.session.current().await.ok_or(ApiError::NotLoaded)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("no meter snapshot is loaded")]
    NotLoaded,
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("reload failed: {0}")]
    Reload(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotLoaded => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Analysis(e) => match e {
                AnalysisError::InvalidRange { .. } | AnalysisError::EmptyPeriodSet => StatusCode::BAD_REQUEST,
                AnalysisError::NoDataAvailable => StatusCode::NOT_FOUND,
                AnalysisError::EmptyRegistry => StatusCode::SERVICE_UNAVAILABLE,
            },
            ApiError::Reload(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Every analysis answer names the snapshot it was computed from.
#[derive(Debug, Serialize)]
pub struct Fingerprinted<T> {
    pub fingerprint: String,
    pub periods: Vec<PeriodKey>,
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct Rated<T> {
    #[serde(flatten)]
    pub analysis: T,
    pub rating: PerformanceRating,
}

#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub period: Option<String>,
}

fn parse_key(raw: Option<&str>) -> Result<Option<PeriodKey>, ApiError> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<PeriodKey>().map_err(|e| ApiError::BadRequest(e.to_string())))
        .transpose()
}

fn resolve(snapshot: &Snapshot, q: &RangeQuery) -> Result<Vec<PeriodKey>, ApiError> {
    let start = parse_key(q.start.as_deref())?;
    let end = parse_key(q.end.as_deref())?;
    Ok(snapshot.catalog.default_range(&snapshot.registry, start, end)?)
}

fn resolve_one(snapshot: &Snapshot, q: &PeriodQuery) -> Result<PeriodKey, ApiError> {
    match parse_key(q.period.as_deref())? {
        Some(p) => {
            snapshot.catalog.resolve_range(&p, &p)?;
            Ok(p)
        }
        None => Ok(snapshot.catalog.latest_with_data(&snapshot.registry)?),
    }
}

fn answer<T>(snapshot: &Snapshot, periods: Vec<PeriodKey>, data: T) -> Json<Fingerprinted<T>> {
    Json(Fingerprinted {
        fingerprint: snapshot.fingerprint.clone(),
        periods,
        data,
    })
}

fn count(route: &'static str) {
    metrics::counter!("water_api_requests_total", "route" => route).increment(1);
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/periods", get(periods))
        .route("/meters/counts", get(meter_counts))
        .route("/meters/review", get(meter_review))
        .route("/analysis/range", get(range_analysis))
        .route("/analysis/trends", get(trends))
        .route("/analysis/zones", get(zones))
        .route("/analysis/zones/:zone", get(zone))
        .route("/analysis/buildings", get(buildings))
        .route("/analysis/types", get(types))
        .route("/analysis/categories", get(categories))
        .route("/refresh", post(refresh))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    count("health");
    let snapshot = state.session.current().await;
    Json(serde_json::json!({
        "status": "ok",
        "loaded": snapshot.is_some(),
        "fingerprint": snapshot.as_ref().map(|s| s.fingerprint.clone()),
    }))
}

#[derive(Debug, Serialize)]
pub struct PeriodListing {
    pub catalog: Vec<PeriodKey>,
    pub available: Vec<PeriodKey>,
    pub latest: Option<PeriodKey>,
}

async fn periods(State(state): State<AppState>) -> Result<Json<Fingerprinted<PeriodListing>>, ApiError> {
    count("periods");
    let snapshot = state.snapshot().await?;
    let listing = PeriodListing {
        catalog: snapshot.catalog.periods().to_vec(),
        available: snapshot.catalog.available_periods(&snapshot.registry),
        latest: snapshot.catalog.latest_with_data(&snapshot.registry).ok(),
    };
    Ok(answer(&snapshot, Vec::new(), listing))
}

#[derive(Debug, Serialize)]
pub struct LevelCount {
    pub level: &'static str,
    pub count: usize,
}

async fn meter_counts(State(state): State<AppState>) -> Result<Json<Fingerprinted<Vec<LevelCount>>>, ApiError> {
    count("meter_counts");
    let snapshot = state.snapshot().await?;
    let counts = snapshot
        .registry
        .meter_counts_by_level()
        .into_iter()
        .map(|(level, count)| LevelCount {
            level: level.as_str(),
            count,
        })
        .collect();
    Ok(answer(&snapshot, Vec::new(), counts))
}

#[derive(Debug, Serialize)]
pub struct MeterReview {
    pub unassigned_zones: Vec<ZoneInference>,
    pub orphans: Vec<String>,
}

async fn meter_review(State(state): State<AppState>) -> Result<Json<Fingerprinted<MeterReview>>, ApiError> {
    count("meter_review");
    let snapshot = state.snapshot().await?;
    let review = MeterReview {
        unassigned_zones: snapshot.registry.zone_review(),
        orphans: snapshot
            .registry
            .orphans()
            .into_iter()
            .map(|m| m.account_number.clone())
            .collect(),
    };
    Ok(answer(&snapshot, Vec::new(), review))
}

async fn range_analysis(
    State(state): State<AppState>,
    Query(q): Query<RangeQuery>,
) -> Result<Json<Fingerprinted<Rated<water_client::domain::RangeAnalysis>>>, ApiError> {
    count("range");
    let snapshot = state.snapshot().await?;
    let periods = resolve(&snapshot, &q)?;
    let analysis = loss::compute_range_analysis(&snapshot.registry, &periods)?;
    let rating = loss::get_performance_rating(analysis.loss_percentage);
    Ok(answer(&snapshot, periods, Rated { analysis, rating }))
}

async fn trends(
    State(state): State<AppState>,
    Query(q): Query<RangeQuery>,
) -> Result<Json<Fingerprinted<Vec<water_client::domain::PeriodAnalysis>>>, ApiError> {
    count("trends");
    let snapshot = state.snapshot().await?;
    let periods = resolve(&snapshot, &q)?;
    let trends = loss::monthly_trends(&snapshot.registry, &periods)?;
    Ok(answer(&snapshot, periods, trends))
}

type RatedZone = Rated<water_client::domain::ZoneAnalysis>;

fn rate_zone(analysis: water_client::domain::ZoneAnalysis) -> RatedZone {
    let rating = loss::get_performance_rating(analysis.loss_percentage);
    Rated { analysis, rating }
}

async fn zones(
    State(state): State<AppState>,
    Query(q): Query<RangeQuery>,
) -> Result<Json<Fingerprinted<Vec<RatedZone>>>, ApiError> {
    count("zones");
    let snapshot = state.snapshot().await?;
    let periods = resolve(&snapshot, &q)?;
    let zones = loss::all_zones_analysis(&snapshot.registry, &periods, &state.zones)?
        .into_iter()
        .map(rate_zone)
        .collect();
    Ok(answer(&snapshot, periods, zones))
}

async fn zone(
    State(state): State<AppState>,
    Path(zone): Path<String>,
    Query(q): Query<RangeQuery>,
) -> Result<Json<Fingerprinted<RatedZone>>, ApiError> {
    count("zone");
    let snapshot = state.snapshot().await?;
    let periods = resolve(&snapshot, &q)?;
    let analysis = loss::compute_zone_analysis(&snapshot.registry, &zone, &periods)?.named(&state.zones);
    Ok(answer(&snapshot, periods, rate_zone(analysis)))
}

async fn buildings(
    State(state): State<AppState>,
    Query(q): Query<RangeQuery>,
) -> Result<Json<Fingerprinted<Vec<water_client::domain::BuildingAnalysis>>>, ApiError> {
    count("buildings");
    let snapshot = state.snapshot().await?;
    let periods = resolve(&snapshot, &q)?;
    let buildings = loss::all_buildings_analysis(&snapshot.registry, &periods)?;
    Ok(answer(&snapshot, periods, buildings))
}

async fn types(
    State(state): State<AppState>,
    Query(q): Query<PeriodQuery>,
) -> Result<Json<Fingerprinted<Vec<water_client::domain::TypeConsumption>>>, ApiError> {
    count("types");
    let snapshot = state.snapshot().await?;
    let period = resolve_one(&snapshot, &q)?;
    let by_type = loss::get_consumption_by_type(&snapshot.registry, &period)?;
    Ok(answer(&snapshot, vec![period], by_type))
}

async fn categories(
    State(state): State<AppState>,
    Query(q): Query<PeriodQuery>,
) -> Result<Json<Fingerprinted<Vec<water_client::domain::TypeConsumption>>>, ApiError> {
    count("categories");
    let snapshot = state.snapshot().await?;
    let period = resolve_one(&snapshot, &q)?;
    let by_category = loss::get_consumption_by_category(&snapshot.registry, &period, &state.categories)?;
    Ok(answer(&snapshot, vec![period], by_category))
}

async fn refresh(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    count("refresh");
    state
        .loader
        .load()
        .await
        .map_err(|e| ApiError::Reload(e.to_string()))?;
    let snapshot = state.snapshot().await?;
    tracing::info!(fingerprint = %snapshot.fingerprint, "snapshot refreshed");
    Ok(Json(serde_json::json!({
        "fingerprint": snapshot.fingerprint,
        "meters": snapshot.registry.len(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use axum::{body::Body, http::Request};
    use std::io::Write;
    use tower::ServiceExt;

    const CSV: &[u8] = b"Meter Label,Acct #,Zone,Type,Parent Meter,Label,Jan-25,Feb-25\n\
Main Bulk (NAMA),C43659,Main Bulk,Main BULK,NAMA,L1,1000,900\n\
ZONE 5 (Bulk Zone 5),4300341,Zone_05,Zone Bulk,Main Bulk (NAMA),L2,600,500\n\
Z5-17,4300005,Zone_05,Residential (Villa),ZONE 5 (Bulk Zone 5),L3,150,\n\
Z5-18,4300006,Zone_05,Residential (Villa),ZONE 5 (Bulk Zone 5),L3,150,\n\
Z5-19,4300007,Zone_05,Residential (Villa),ZONE 5 (Bulk Zone 5),L3,150,\n\
Hotel Main Building,4300334,Direct Connection,Retail,Main Bulk (NAMA),DC,300,\n";

    async fn state(load: bool) -> (AppState, tempfile::NamedTempFile) {
        state_with_catalog(load, "Mar-25").await
    }

    async fn state_with_catalog(load: bool, last: &str) -> (AppState, tempfile::NamedTempFile) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CSV).unwrap();
        let cfg = AppConfig::from_toml(&format!(
            r#"
            [source]
            kind = "csv"
            csv_path = "{}"

            [catalog]
            first = "Jan-25"
            last = "{last}"

            [[zones]]
            code = "Zone_05"
            name = "Zone 5"

            [http]
            bind_addr = "127.0.0.1:0"
            "#,
            file.path().display(),
        ))
        .unwrap();
        let loader = Loader::connect(Arc::new(cfg), SessionHandle::new()).await.unwrap();
        if load {
            loader.load().await.unwrap();
        }
        (AppState::new(Arc::new(loader)), file)
    }

    async fn get_json(state: AppState, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn range_analysis_for_january() {
        let (state, _file) = state(true).await;
        let (status, body) = get_json(state, "/analysis/range?start=Jan-25&end=Jan-25").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["periods"], serde_json::json!(["Jan-25"]));
        assert_eq!(body["data"]["total_loss"], 250.0);
        assert_eq!(body["data"]["loss_percentage"], 25.0);
        assert_eq!(body["data"]["rating"]["status"], "High Loss");
        assert!(body["fingerprint"].as_str().is_some_and(|f| !f.is_empty()));
    }

    #[tokio::test]
    async fn zone_uses_display_name_and_defaults_to_latest_period() {
        let (state, _file) = state(true).await;
        let (status, body) = get_json(state, "/analysis/zones/Zone_05").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["periods"], serde_json::json!(["Feb-25"]));
        assert_eq!(body["data"]["zone_name"], "Zone 5");
        assert_eq!(body["data"]["bulk_meter_reading"], 500.0);
    }

    #[tokio::test]
    async fn defaults_stay_inside_a_short_catalog() {
        let (state, _file) = state_with_catalog(true, "Jan-25").await;
        let (status, body) = get_json(state.clone(), "/analysis/range").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["periods"], serde_json::json!(["Jan-25"]));

        let (status, body) = get_json(state, "/analysis/types").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["periods"], serde_json::json!(["Jan-25"]));
    }

    #[tokio::test]
    async fn inverted_range_is_bad_request() {
        let (state, _file) = state(true).await;
        let (status, body) = get_json(state.clone(), "/analysis/range?start=Mar-25&end=Jan-25").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Mar-25"));

        let (status, _) = get_json(state, "/analysis/types?period=Smarch-25").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn nothing_loaded_is_unavailable() {
        let (state, _file) = state(false).await;
        let (status, _) = get_json(state.clone(), "/analysis/zones").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let (status, body) = get_json(state, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["loaded"], false);
    }

    #[tokio::test]
    async fn refresh_publishes_a_snapshot() {
        let (state, _file) = state(false).await;
        let resp = router(state.clone())
            .oneshot(Request::post("/refresh").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let (_, body) = get_json(state, "/meters/counts").await;
        let counts = body["data"].as_array().unwrap();
        assert_eq!(counts.len(), 5);
        assert_eq!(counts[2], serde_json::json!({ "level": "L3", "count": 3 }));
    }

    #[tokio::test]
    async fn types_exclude_bulk_meters() {
        let (state, _file) = state(true).await;
        let (status, body) = get_json(state, "/analysis/types?period=Jan-25").await;
        assert_eq!(status, StatusCode::OK);
        let types = body["data"].as_array().unwrap();
        assert_eq!(types.len(), 2);
        assert_eq!(types[0]["meter_type"], "Residential (Villa)");
        assert_eq!(types[0]["total"], 450.0);
    }
}
