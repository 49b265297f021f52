//! Admin API Server
//!
//! HTTP API for operators and the authoring side: local content changes,
//! endpoint and group CRUD, manual enable/disable, connection tests, job
//! inspection and retry, cycle control and stats.
//! Credential values never leave the process; endpoint views list only the
//! credential keys.

use crate::application::{CycleOutcome, SyndicationService};
use crate::domain::entities::{ContentDraft, Endpoint, EndpointFilter, EndpointUpdate, GroupDeletePolicy, NewEndpoint};
use crate::domain::ports::JobQuery;
use crate::domain::value_objects::{ContentId, EndpointId, GroupId, JobId, TransportType};
use crate::error::{ContentError, JobStoreError, RegistryError, SyndicationError};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Endpoint as shown to operators.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointView {
    pub id: EndpointId,
    pub name: String,
    pub transport_type: TransportType,
    pub target_url: String,
    /// Names of the configured credentials, never their values
    pub credential_keys: Vec<String>,
    pub group_ids: BTreeSet<GroupId>,
    pub enabled: bool,
    pub consecutive_failures: u32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_pull_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Endpoint> for EndpointView {
    fn from(e: Endpoint) -> Self {
        let credential_keys = e.credentials.keys().map(str::to_string).collect();
        Self {
            id: e.id,
            name: e.name,
            transport_type: e.transport_type,
            target_url: e.target_url,
            credential_keys,
            group_ids: e.group_ids,
            enabled: e.enabled,
            consecutive_failures: e.consecutive_failures,
            last_success_at: e.last_success_at,
            last_failure_at: e.last_failure_at,
            last_pull_at: e.last_pull_at,
            created_at: e.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<GroupId>,
}

#[derive(Debug, Deserialize)]
pub struct MoveGroupRequest {
    #[serde(default)]
    pub parent_id: Option<GroupId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteGroupParams {
    #[serde(default)]
    pub policy: GroupDeletePolicy,
}

#[derive(Debug, Default, Deserialize)]
pub struct WindowParams {
    pub endpoint_id: Option<EndpointId>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub endpoints: usize,
    pub cycle_active: bool,
}

/// Error body: `{"error": "..."}` with a status matching the failure.
pub struct ApiError(SyndicationError);

impl<E: Into<SyndicationError>> From<E> for ApiError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            SyndicationError::Registry(e) => match e {
                RegistryError::EndpointNotFound(_) | RegistryError::GroupNotFound(_) => StatusCode::NOT_FOUND,
                RegistryError::Validation(_) | RegistryError::ImmutableField(_) => StatusCode::BAD_REQUEST,
                RegistryError::GroupInUse(_) => StatusCode::CONFLICT,
            },
            SyndicationError::Job(e) => match e {
                JobStoreError::NotFound(_) => StatusCode::NOT_FOUND,
                JobStoreError::DuplicateJob { .. } | JobStoreError::InvalidTransition { .. } => StatusCode::CONFLICT,
            },
            SyndicationError::Configuration(_) => StatusCode::BAD_REQUEST,
            SyndicationError::Content(ContentError::NotFound(_)) => StatusCode::NOT_FOUND,
            SyndicationError::Content(ContentError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            SyndicationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("admin request failed: {}", self.0);
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<SyndicationService>,
}

/// Admin API server.
pub struct ApiServer {
    listen_addr: String,
    state: ApiState,
}

impl ApiServer {
    pub fn new(listen_addr: String, service: Arc<SyndicationService>) -> Self {
        Self {
            listen_addr,
            state: ApiState { service },
        }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Serve until `shutdown` resolves.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub async fn run<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("admin API listening on {}", self.listen_addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

/// Build the admin routes over `state`.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Content
        .route("/api/v1/content", post(create_content_handler))
        .route(
            "/api/v1/content/:id",
            get(get_content_handler)
                .put(save_content_handler)
                .delete(trash_content_handler),
        )
        // Endpoints
        .route("/api/v1/endpoints", get(list_endpoints_handler).post(register_endpoint_handler))
        .route(
            "/api/v1/endpoints/:id",
            get(get_endpoint_handler)
                .patch(update_endpoint_handler)
                .delete(delete_endpoint_handler),
        )
        .route("/api/v1/endpoints/:id/enable", post(enable_endpoint_handler))
        .route("/api/v1/endpoints/:id/disable", post(disable_endpoint_handler))
        .route("/api/v1/endpoints/:id/test", post(test_connection_handler))
        .route("/api/v1/endpoints/:id/failures", get(failure_record_handler))
        // Groups
        .route("/api/v1/groups", get(list_groups_handler).post(create_group_handler))
        .route("/api/v1/groups/:id", axum::routing::delete(delete_group_handler))
        .route("/api/v1/groups/:id/parent", axum::routing::put(move_group_handler))
        // Jobs
        .route("/api/v1/jobs", get(list_jobs_handler))
        .route("/api/v1/jobs/:id", get(get_job_handler))
        .route("/api/v1/jobs/:id/retry", post(retry_job_handler))
        // Cycle control and stats
        .route("/api/v1/cycle", post(run_cycle_handler))
        .route("/api/v1/cycle/cancel", post(cancel_cycle_handler))
        .route("/api/v1/stats", get(stats_handler))
        .route("/api/v1/stats/windows", get(windows_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Handler functions

async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: state.service.list_endpoints(&EndpointFilter::default()).await.len(),
        cycle_active: state.service.cycle_active(),
    })
}

async fn create_content_handler(
    State(state): State<ApiState>,
    Json(draft): Json<ContentDraft>,
) -> ApiResult<impl IntoResponse> {
    let item = state.service.publish_content(None, draft).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn save_content_handler(
    State(state): State<ApiState>,
    Path(id): Path<ContentId>,
    Json(draft): Json<ContentDraft>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.publish_content(Some(id), draft).await?))
}

async fn get_content_handler(State(state): State<ApiState>, Path(id): Path<ContentId>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.get_content(&id).await?))
}

async fn trash_content_handler(State(state): State<ApiState>, Path(id): Path<ContentId>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.trash_content(&id).await?))
}

async fn list_endpoints_handler(
    State(state): State<ApiState>,
    Query(filter): Query<EndpointFilter>,
) -> Json<Vec<EndpointView>> {
    let endpoints = state.service.list_endpoints(&filter).await;
    Json(endpoints.into_iter().map(EndpointView::from).collect())
}

async fn register_endpoint_handler(
    State(state): State<ApiState>,
    Json(req): Json<NewEndpoint>,
) -> ApiResult<(StatusCode, Json<EndpointView>)> {
    let endpoint = state.service.register_endpoint(req).await?;
    Ok((StatusCode::CREATED, Json(endpoint.into())))
}

async fn get_endpoint_handler(
    State(state): State<ApiState>,
    Path(id): Path<EndpointId>,
) -> ApiResult<Json<EndpointView>> {
    Ok(Json(state.service.get_endpoint(&id).await?.into()))
}

async fn update_endpoint_handler(
    State(state): State<ApiState>,
    Path(id): Path<EndpointId>,
    Json(update): Json<EndpointUpdate>,
) -> ApiResult<Json<EndpointView>> {
    Ok(Json(state.service.update_endpoint(&id, update).await?.into()))
}

async fn delete_endpoint_handler(
    State(state): State<ApiState>,
    Path(id): Path<EndpointId>,
) -> ApiResult<Json<EndpointView>> {
    Ok(Json(state.service.delete_endpoint(&id).await?.into()))
}

async fn enable_endpoint_handler(
    State(state): State<ApiState>,
    Path(id): Path<EndpointId>,
) -> ApiResult<Json<EndpointView>> {
    Ok(Json(state.service.enable_endpoint(&id).await?.into()))
}

async fn disable_endpoint_handler(
    State(state): State<ApiState>,
    Path(id): Path<EndpointId>,
) -> ApiResult<Json<EndpointView>> {
    Ok(Json(state.service.disable_endpoint(&id).await?.into()))
}

async fn test_connection_handler(
    State(state): State<ApiState>,
    Path(id): Path<EndpointId>,
) -> ApiResult<Json<serde_json::Value>> {
    let reachable = state.service.test_connection(&id).await?;
    Ok(Json(serde_json::json!({ "id": id, "reachable": reachable })))
}

async fn failure_record_handler(
    State(state): State<ApiState>,
    Path(id): Path<EndpointId>,
) -> ApiResult<Json<serde_json::Value>> {
    let endpoint = state.service.get_endpoint(&id).await?;
    let record = state.service.failure_record(&id);
    Ok(Json(serde_json::json!({
        "id": endpoint.id,
        "enabled": endpoint.enabled,
        "consecutive_failures": endpoint.consecutive_failures,
        "record": record,
    })))
}

async fn list_groups_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.service.list_groups().await)
}

async fn create_group_handler(
    State(state): State<ApiState>,
    Json(req): Json<CreateGroupRequest>,
) -> ApiResult<impl IntoResponse> {
    let group = state.service.create_group(&req.name, req.parent_id).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

async fn move_group_handler(
    State(state): State<ApiState>,
    Path(id): Path<GroupId>,
    Json(req): Json<MoveGroupRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.move_group(&id, req.parent_id).await?))
}

async fn delete_group_handler(
    State(state): State<ApiState>,
    Path(id): Path<GroupId>,
    Query(params): Query<DeleteGroupParams>,
) -> ApiResult<impl IntoResponse> {
    state.service.delete_group(&id, params.policy).await?;
    Ok(Json(serde_json::json!({ "id": id, "deleted": true })))
}

async fn list_jobs_handler(State(state): State<ApiState>, Query(query): Query<JobQuery>) -> impl IntoResponse {
    Json(state.service.list_jobs(&query).await)
}

async fn get_job_handler(State(state): State<ApiState>, Path(id): Path<JobId>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.get_job(&id).await?))
}

async fn retry_job_handler(State(state): State<ApiState>, Path(id): Path<JobId>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.retry_job(&id).await?))
}

/// The cycle runs in its own task so a client disconnect cannot drop it
/// halfway through a push.
async fn run_cycle_handler(State(state): State<ApiState>) -> ApiResult<Response> {
    let service = state.service.clone();
    let outcome = match tokio::spawn(async move { service.run_cycle().await }).await {
        Ok(outcome) => outcome?,
        Err(e) => {
            tracing::error!("manual cycle task failed: {}", e);
            return Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "cycle task failed" })),
            )
                .into_response());
        }
    };
    let response = match outcome {
        CycleOutcome::Completed(report) => (StatusCode::OK, Json(report)).into_response(),
        CycleOutcome::Skipped => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "skipped": true, "reason": "a cycle is already running" })),
        )
            .into_response(),
    };
    Ok(response)
}

async fn cancel_cycle_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let cancelled = state.service.cancel_active_cycle();
    Json(serde_json::json!({ "cancelled": cancelled }))
}

async fn stats_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.service.stats().await)
}

async fn windows_handler(State(state): State<ApiState>, Query(params): Query<WindowParams>) -> impl IntoResponse {
    Json(state.service.event_windows(params.endpoint_id.as_ref()))
}
