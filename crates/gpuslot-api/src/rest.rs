//! REST API handlers

use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use gpuslot_core::{
    Actor, ApiConfig, GpuResourceType, GpuslotError, NewReservation, PreemptionDecision,
    PreemptionRequest, PriorityFactors, Reservation, ReservationStatus,
};
use gpuslot_extract::{UsageLimiter, UsageStats};
use gpuslot_scheduler::{AdmissionResult, PreemptionOutcome, PriorityScore, ReservationFilter, Scheduler};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;

/// Application state shared across handlers
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub usage: Arc<UsageLimiter>,
}

type ApiResult<T> = Result<T, ApiError>;

/// Create the API router
pub fn create_router(scheduler: Arc<Scheduler>, usage: Arc<UsageLimiter>) -> Router {
    let state = Arc::new(AppState { scheduler, usage });

    Router::new()
        .route("/api/v1/reservations", post(create_reservation))
        .route("/api/v1/reservations", get(list_reservations))
        .route("/api/v1/reservations/text", post(create_reservation_from_text))
        .route("/api/v1/reservations/:id", get(get_reservation))
        .route("/api/v1/reservations/:id/cancel", post(cancel_reservation))
        .route("/api/v1/reservations/:id/transition", post(transition_reservation))
        .route("/api/v1/preemptions", get(list_preemptions))
        .route("/api/v1/preemptions/:id/respond", post(respond_preemption))
        .route("/api/v1/score", post(score_factors))
        .route("/api/v1/resources", get(get_resources))
        .route("/api/v1/extraction/usage", get(get_usage))
        .route("/api/v1/status", get(get_status))
        .with_state(state)
}

/// Wrap the router with request tracing and, if enabled, CORS
pub fn with_layers(router: Router, config: &ApiConfig) -> Router {
    let router = router.layer(TraceLayer::new_for_http());
    if !config.cors_enabled {
        return router;
    }
    router.layer(cors_layer(&config.cors_origins))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Structured reservation request
#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    pub requester_id: String,
    #[serde(default)]
    pub requester_name: Option<String>,
    pub resource_type: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub purpose: String,
    /// Parsed separately so a missing category is a validation error
    pub factors: serde_json::Value,
}

/// Admit a structured reservation request
async fn create_reservation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateReservationRequest>,
) -> ApiResult<(StatusCode, Json<AdmissionResult>)> {
    info!(
        requester = %req.requester_id,
        resource_type = %req.resource_type,
        start = %req.start,
        end = %req.end,
        "Creating reservation"
    );

    let factors = PriorityFactors::from_value(req.factors)?;
    let result = state
        .scheduler
        .admit(NewReservation {
            requester_id: req.requester_id,
            requester_name: req.requester_name,
            resource_type: req.resource_type,
            start: req.start,
            end: req.end,
            purpose: req.purpose,
            factors,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

/// Free-text reservation request
#[derive(Debug, Deserialize)]
pub struct TextReservationRequest {
    pub requester_id: String,
    #[serde(default)]
    pub requester_name: Option<String>,
    pub text: String,
}

async fn create_reservation_from_text(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TextReservationRequest>,
) -> ApiResult<(StatusCode, Json<AdmissionResult>)> {
    info!(requester = %req.requester_id, "Creating reservation from text");

    let result = state
        .scheduler
        .admit_text(&req.requester_id, req.requester_name, &req.text)
        .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

#[derive(Debug, Deserialize)]
pub struct ListReservationsQuery {
    pub user_id: Option<String>,
    pub status: Option<String>,
}

/// List reservations, newest first
async fn list_reservations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListReservationsQuery>,
) -> ApiResult<Json<Vec<Reservation>>> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<ReservationStatus>)
        .transpose()?;

    let reservations = state
        .scheduler
        .list_reservations(&ReservationFilter {
            user_id: query.user_id,
            status,
        })
        .await?;
    Ok(Json(reservations))
}

async fn get_reservation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Reservation>> {
    Ok(Json(state.scheduler.get_reservation(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub actor: Actor,
    #[serde(default)]
    pub reason: Option<String>,
}

async fn cancel_reservation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelRequest>,
) -> ApiResult<Json<Reservation>> {
    info!(reservation_id = %id, actor = %req.actor, "Cancelling reservation");

    let reservation = state.scheduler.cancel(id, &req.actor, req.reason).await?;
    Ok(Json(reservation))
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: ReservationStatus,
    pub actor: Actor,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Administrative status change
async fn transition_reservation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<TransitionRequest>,
) -> ApiResult<Json<Reservation>> {
    info!(
        reservation_id = %id,
        status = %req.status,
        actor = %req.actor,
        "Transitioning reservation"
    );

    let reservation = state
        .scheduler
        .transition(id, req.status, &req.actor, req.reason)
        .await?;
    Ok(Json(reservation))
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    pub user_id: Option<String>,
}

/// Open preemption requests addressed to a user
async fn list_preemptions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PendingQuery>,
) -> ApiResult<Json<Vec<PreemptionRequest>>> {
    let user_id = query
        .user_id
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| GpuslotError::Validation("user_id is required".to_string()))?;

    Ok(Json(state.scheduler.pending_for(&user_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub decision: PreemptionDecision,
    pub actor: Actor,
}

async fn respond_preemption(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<RespondRequest>,
) -> ApiResult<Json<PreemptionOutcome>> {
    info!(
        preemption_id = %id,
        decision = ?req.decision,
        actor = %req.actor,
        "Responding to preemption request"
    );

    let outcome = state.scheduler.respond(id, req.decision, &req.actor).await?;
    Ok(Json(outcome))
}

/// Score a factor document without admitting anything
async fn score_factors(
    State(state): State<Arc<AppState>>,
    Json(factors): Json<serde_json::Value>,
) -> ApiResult<Json<PriorityScore>> {
    let factors = PriorityFactors::from_value(factors)?;
    Ok(Json(state.scheduler.score(&factors)))
}

async fn get_resources(State(state): State<Arc<AppState>>) -> Json<Vec<GpuResourceType>> {
    Json(state.scheduler.catalog().resource_types.clone())
}

/// Extraction usage response
#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub extractor: String,
    #[serde(flatten)]
    pub stats: UsageStats,
}

async fn get_usage(State(state): State<Arc<AppState>>) -> Json<UsageResponse> {
    Json(UsageResponse {
        extractor: state.scheduler.extractor_name().to_string(),
        stats: state.usage.stats(Utc::now()).await,
    })
}

/// System status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub extractor: String,
    pub resource_types: usize,
    pub gpus: u32,
    /// Reservation count per status
    pub reservations: BTreeMap<String, usize>,
}

async fn get_status(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatusResponse>> {
    let reservations = state
        .scheduler
        .list_reservations(&ReservationFilter::default())
        .await?;

    let mut counts = BTreeMap::new();
    for reservation in &reservations {
        *counts.entry(reservation.status.to_string()).or_insert(0) += 1;
    }

    let catalog = state.scheduler.catalog();
    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        extractor: state.scheduler.extractor_name().to_string(),
        resource_types: catalog.resource_types.len(),
        gpus: catalog.total_gpus(),
        reservations: counts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use chrono::{Duration, TimeZone};
    use gpuslot_core::ExtractionConfig;
    use gpuslot_store::InMemoryRepository;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn router() -> Router {
        let scheduler = Arc::new(Scheduler::with_defaults(Arc::new(InMemoryRepository::new())));
        let usage = Arc::new(UsageLimiter::from_config(&ExtractionConfig::default()));
        create_router(scheduler, usage)
    }

    fn tomorrow(hour: u32) -> DateTime<Utc> {
        let date = (Utc::now() + Duration::days(1)).date_naive();
        Utc.from_utc_datetime(&date.and_hms_opt(hour, 0, 0).unwrap())
    }

    fn default_factors() -> Value {
        json!({ "deadline": {}, "impact": {}, "funding": {}, "purpose": {} })
    }

    fn high_factors() -> Value {
        json!({
            "deadline": {
                "has_deadline": true,
                "days_until_deadline": 2,
                "deadline_type": "paper_submission",
                "urgency_level": "immediate"
            },
            "impact": {
                "research_field": "medical",
                "social_contribution": "high",
                "academic_novelty": "significant",
                "publication_target": "major_conference"
            },
            "funding": {
                "has_external_funding": true,
                "funding_type": "government_grant",
                "project_scale": "medium",
                "collaboration_type": "multi_institutional"
            },
            "purpose": {
                "usage_type": "research_experiment",
                "data_confidentiality": "sensitive",
                "reproducibility_requirement": "important",
                "computational_complexity": "high"
            },
            "requester": {
                "position": "professor",
                "research_experience": "senior",
                "past_usage_efficiency": "good",
                "lab_priority": "high"
            }
        })
    }

    fn reservation_body(user: &str, start: u32, end: u32, factors: Value) -> Value {
        json!({
            "requester_id": user,
            "resource_type": "A100",
            "start": tomorrow(start),
            "end": tomorrow(end),
            "purpose": "training run",
            "factors": factors,
        })
    }

    async fn call(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_create_and_get_reservation() {
        let router = router();
        let (status, body) = call(
            &router,
            Method::POST,
            "/api/v1/reservations",
            Some(reservation_body("bob", 10, 12, default_factors())),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["reservation"]["status"], "pending");
        assert_eq!(body["auto_approved"], false);

        let id = body["reservation"]["id"].as_str().unwrap().to_string();
        let (status, body) = call(&router, Method::GET, &format!("/api/v1/reservations/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["requester_id"], "bob");
    }

    #[tokio::test]
    async fn test_missing_factor_category_is_bad_request() {
        let router = router();
        let (status, body) = call(
            &router,
            Method::POST,
            "/api/v1/reservations",
            Some(reservation_body("bob", 10, 12, json!({ "deadline": {} }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], "validation");
        assert_eq!(body["error"]["retryable"], false);
    }

    #[tokio::test]
    async fn test_unknown_reservation_is_not_found() {
        let router = router();
        let uri = format!("/api/v1/reservations/{}", Uuid::new_v4());
        let (status, body) = call(&router, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_preemption_round_trip_over_http() {
        let router = router();
        let (_, low) = call(
            &router,
            Method::POST,
            "/api/v1/reservations",
            Some(reservation_body("bob", 10, 14, default_factors())),
        )
        .await;
        let (_, high) = call(
            &router,
            Method::POST,
            "/api/v1/reservations",
            Some(reservation_body("alice", 13, 15, high_factors())),
        )
        .await;
        assert_eq!(high["preemptions_created"].as_array().unwrap().len(), 1);

        let (status, pending) = call(&router, Method::GET, "/api/v1/preemptions?user_id=bob", None).await;
        assert_eq!(status, StatusCode::OK);
        let preemption_id = pending[0]["id"].as_str().unwrap().to_string();

        let respond_uri = format!("/api/v1/preemptions/{}/respond", preemption_id);
        let (status, _) = call(
            &router,
            Method::POST,
            &respond_uri,
            Some(json!({ "decision": "accepted", "actor": { "user_id": "carol", "role": "requester" } })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, outcome) = call(
            &router,
            Method::POST,
            &respond_uri,
            Some(json!({ "decision": "accepted", "actor": { "user_id": "bob", "role": "requester" } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["request"]["status"], "accepted");

        let (status, body) = call(
            &router,
            Method::POST,
            &respond_uri,
            Some(json!({ "decision": "declined", "actor": { "user_id": "bob", "role": "requester" } })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["kind"], "already_resolved");

        let low_uri = format!("/api/v1/reservations/{}", low["reservation"]["id"].as_str().unwrap());
        let (_, low) = call(&router, Method::GET, &low_uri, None).await;
        assert_eq!(low["status"], "cancelled");
    }

    #[tokio::test]
    async fn test_cancel_and_transition() {
        let router = router();
        let (_, created) = call(
            &router,
            Method::POST,
            "/api/v1/reservations",
            Some(reservation_body("bob", 10, 12, default_factors())),
        )
        .await;
        let id = created["reservation"]["id"].as_str().unwrap().to_string();

        let (status, _) = call(
            &router,
            Method::POST,
            &format!("/api/v1/reservations/{}/transition", id),
            Some(json!({ "status": "approved", "actor": { "user_id": "bob", "role": "requester" } })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, approved) = call(
            &router,
            Method::POST,
            &format!("/api/v1/reservations/{}/transition", id),
            Some(json!({ "status": "approved", "actor": { "user_id": "root", "role": "administrator" } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(approved["status"], "approved");

        let (status, cancelled) = call(
            &router,
            Method::POST,
            &format!("/api/v1/reservations/{}/cancel", id),
            Some(json!({ "actor": { "user_id": "bob", "role": "requester" }, "reason": "plans changed" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cancelled["status"], "cancelled");
        assert_eq!(cancelled["decision_reason"], "plans changed");

        let (status, body) = call(
            &router,
            Method::GET,
            "/api/v1/reservations?user_id=bob&status=cancelled",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_status_filter() {
        let (status, body) = call(&router(), Method::GET, "/api/v1/reservations?status=paused", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], "validation");
    }

    #[tokio::test]
    async fn test_pending_requires_user() {
        let (status, _) = call(&router(), Method::GET, "/api/v1/preemptions", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_score_endpoint() {
        let (status, body) = call(&router(), Method::POST, "/api/v1/score", Some(high_factors())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tier"], "high");
        assert_eq!(body["breakdown"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_text_reservation() {
        let (status, body) = call(
            &router(),
            Method::POST,
            "/api/v1/reservations/text",
            Some(json!({ "requester_id": "carol", "text": "need an H100 for model training" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["reservation"]["resource_type"], "H100");
    }

    #[tokio::test]
    async fn test_resources_usage_and_status() {
        let router = router();

        let (status, resources) = call(&router, Method::GET, "/api/v1/resources", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resources.as_array().unwrap().len(), 4);

        let (status, usage) = call(&router, Method::GET, "/api/v1/extraction/usage", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(usage["extractor"], "rules");
        assert_eq!(usage["daily_limit"], 1500);

        call(
            &router,
            Method::POST,
            "/api/v1/reservations",
            Some(reservation_body("bob", 10, 12, default_factors())),
        )
        .await;
        let (status, body) = call(&router, Method::GET, "/api/v1/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["gpus"], 24);
        assert_eq!(body["reservations"]["pending"], 1);
    }

    #[tokio::test]
    async fn test_layers_apply() {
        let router = with_layers(router(), &ApiConfig::default());
        let (status, _) = call(&router, Method::GET, "/api/v1/resources", None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
