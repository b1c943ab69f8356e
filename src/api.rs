// HTTP surface: dashboard page + JSON API over the emitter store

use crate::dashboard::render_home;
use crate::db::{
    check_db_connection, get_emitter_with_evidence, list_emitters, list_hotspots_by_date, EmitterDetail,
    EmitterSummary, Hotspot,
};
use crate::emitters::{mock_emitters, Emitter};
use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    version: String,
}

impl AppState {
    pub fn new(conn: Connection, version: impl Into<String>) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            version: version.into(),
        }
    }

    fn db(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::DatabaseUnavailable("connection lock poisoned".to_string()))
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("database unavailable: {0}")]
    DatabaseUnavailable(String),

    #[error("emitter not found: {0}")]
    EmitterNotFound(String),

    #[error("invalid query: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::DatabaseUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::EmitterNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::DatabaseUnavailable(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            warn!(error = %self, "request rejected");
        }
        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}

// ============================================================================
// Response bodies
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DbHealthResponse {
    pub status: String,
    pub detail: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmittersResponse {
    pub emitters: Vec<EmitterSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmitterDetailResponse {
    pub emitter: EmitterDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HotspotsResponse {
    pub hotspots: Vec<Hotspot>,
}

#[derive(Debug, Deserialize)]
pub struct HotspotQuery {
    pub date: NaiveDate,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET / - Dashboard page; mock emitters until the store has data
async fn dashboard(State(state): State<AppState>) -> Html<String> {
    let stored = state
        .db()
        .map_err(anyhow::Error::from)
        .and_then(|conn| list_emitters(&conn));

    let emitters: Vec<Emitter> = match stored {
        Ok(rows) if !rows.is_empty() => rows.iter().map(Emitter::from).collect(),
        Ok(_) => mock_emitters().to_vec(),
        Err(e) => {
            warn!(error = %e, "dashboard falling back to mock emitters");
            mock_emitters().to_vec()
        }
    };

    Html(render_home(&emitters))
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /version
async fn version(State(state): State<AppState>) -> Json<VersionResponse> {
    Json(VersionResponse {
        version: state.version.clone(),
    })
}

/// GET /db/health - always 200, status says whether the store answered
async fn db_health(State(state): State<AppState>) -> Json<DbHealthResponse> {
    let (connected, detail) = match state.db() {
        Ok(conn) => check_db_connection(&conn),
        Err(e) => (false, e.to_string()),
    };

    Json(DbHealthResponse {
        status: if connected { "ok" } else { "error" }.to_string(),
        detail,
    })
}

/// GET /emitters
async fn get_emitters(State(state): State<AppState>) -> Result<Json<EmittersResponse>, ApiError> {
    let conn = state.db()?;
    let emitters = list_emitters(&conn)?;
    Ok(Json(EmittersResponse { emitters }))
}

/// GET /emitters/:emitter_id
async fn get_emitter(
    State(state): State<AppState>,
    Path(emitter_id): Path<String>,
) -> Result<Json<EmitterDetailResponse>, ApiError> {
    let conn = state.db()?;
    let emitter = get_emitter_with_evidence(&conn, &emitter_id)?.ok_or(ApiError::EmitterNotFound(emitter_id))?;
    Ok(Json(EmitterDetailResponse { emitter }))
}

/// GET /hotspots?date=YYYY-MM-DD
async fn get_hotspots(
    State(state): State<AppState>,
    query: Result<Query<HotspotQuery>, QueryRejection>,
) -> Result<Json<HotspotsResponse>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let conn = state.db()?;
    let hotspots = list_hotspots_by_date(&conn, query.date)?;
    Ok(Json(HotspotsResponse { hotspots }))
}

/// Full application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/db/health", get(db_health))
        .route("/emitters", get(get_emitters))
        .route("/emitters/:emitter_id", get(get_emitter))
        .route("/hotspots", get(get_hotspots))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{insert_hotspots, setup_database, upsert_emitters};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn seeded_state() -> AppState {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        upsert_emitters(
            &conn,
            &[
                EmitterSummary {
                    id: "em-002".to_string(),
                    name: "Turkmenistan Candidate 7".to_string(),
                    confidence: 0.74,
                    detection_count: 2,
                    last_seen: "2026-02-11".to_string(),
                    latitude: 39.5,
                    longitude: 54.2,
                },
                EmitterSummary {
                    id: "em-001".to_string(),
                    name: "Permian Candidate 1".to_string(),
                    confidence: 0.88,
                    detection_count: 4,
                    last_seen: "2026-02-12".to_string(),
                    latitude: 31.95,
                    longitude: -102.08,
                },
            ],
        )
        .unwrap();
        insert_hotspots(
            &conn,
            &[Hotspot {
                id: "hs-1".to_string(),
                emitter_id: Some("em-001".to_string()),
                observed_on: "2026-02-10".to_string(),
                anomaly_score: 47.0,
                area_km2: 7.0,
                pixel_count: 1,
                qa_pass_ratio: 0.75,
                centroid_latitude: 31.95,
                centroid_longitude: -102.08,
            }],
        )
        .unwrap();

        AppState::new(conn, "1.2.3")
    }

    async fn get_json(state: AppState, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(seeded_state(), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_version() {
        let (status, body) = get_json(seeded_state(), "/version").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], "1.2.3");
    }

    #[tokio::test]
    async fn test_db_health() {
        let (status, body) = get_json(seeded_state(), "/db/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["detail"], "connected");
    }

    #[tokio::test]
    async fn test_emitters_sorted_by_confidence() {
        let (status, body) = get_json(seeded_state(), "/emitters").await;
        let emitters = body["emitters"].as_array().unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(emitters.len(), 2);
        assert_eq!(emitters[0]["id"], "em-001");
        assert_eq!(emitters[0]["detection_count"], 4);
    }

    #[tokio::test]
    async fn test_emitter_detail_with_evidence() {
        let (status, body) = get_json(seeded_state(), "/emitters/em-001").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["emitter"]["name"], "Permian Candidate 1");
        assert_eq!(body["emitter"]["hotspot_evidence"][0]["hotspot_id"], "hs-1");
    }

    #[tokio::test]
    async fn test_unknown_emitter_is_404() {
        let (status, body) = get_json(seeded_state(), "/emitters/em-999").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "emitter not found: em-999");
    }

    #[tokio::test]
    async fn test_hotspots_by_date() {
        let (status, body) = get_json(seeded_state(), "/hotspots?date=2026-02-10").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hotspots"][0]["id"], "hs-1");
        assert_eq!(body["hotspots"][0]["emitter_id"], "em-001");

        let (_, body) = get_json(seeded_state(), "/hotspots?date=2026-02-11").await;
        assert!(body["hotspots"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hotspots_rejects_bad_date() {
        let (status, body) = get_json(seeded_state(), "/hotspots?date=yesterday").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().starts_with("invalid query"));

        let (status, _) = get_json(seeded_state(), "/hotspots").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_schema_is_503() {
        // no setup_database: every query fails
        let state = AppState::new(Connection::open_in_memory().unwrap(), "0.0.0");
        let (status, body) = get_json(state, "/emitters").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["detail"].as_str().unwrap().starts_with("database unavailable:"));
    }

    #[tokio::test]
    async fn test_dashboard_renders_stored_emitters() {
        let response = router(seeded_state())
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();

        assert!(html.contains("Methane Hotspot Map Dashboard"));
        assert!(html.find("Permian Candidate 1").unwrap() < html.find("Turkmenistan Candidate 7").unwrap());
    }

    #[tokio::test]
    async fn test_dashboard_falls_back_to_mock_emitters() {
        let state = AppState::new(Connection::open_in_memory().unwrap(), "0.0.0");
        let response = router(state)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains(r#"data-emitter-id="em-001""#));
    }
}
