use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
};
use serde::Deserialize;

use dealboard_common::NewDeal;

use crate::board::{BoardController, BoardFilters, MoveRequest};
use crate::errors::BoardError;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub controller: Arc<BoardController>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn shared(controller: Arc<BoardController>) -> SharedState {
        Arc::new(Self { controller })
    }
}

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStageRequest {
    #[serde(default)]
    pub stage_id: Option<String>,
}

// ── Error handling ────────────────────────────────────────────────────

/// Error response, rendered as `{status, message, correlationId?}` with the
/// matching HTTP status.
pub struct ApiError(BoardError);

impl From<BoardError> for ApiError {
    fn from(err: BoardError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = self.0.body();
        let status =
            StatusCode::from_u16(body.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(%status, error = %self.0, "request failed");
        } else {
            tracing::debug!(%status, error = %self.0, "request rejected");
        }
        (status, Json(body)).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/deals", get(list_deals).post(create_deal))
        .route("/api/deals/{id}/stage", patch(update_deal_stage))
        .route("/api/pipelines", get(list_pipelines))
        .route("/api/board", get(get_board))
        .route("/api/board/filters", put(update_filters))
        .route("/api/board/move", post(move_deal))
        .route("/api/board/refresh", post(refresh_board))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_deals(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let deals = state.controller.load_deals().await?;
    Ok(Json(deals))
}

async fn list_pipelines(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let catalog = state.controller.load_pipelines().await?;
    Ok(Json(catalog))
}

async fn update_deal_stage(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let stage_id = req
        .stage_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| BoardError::InvalidInput("stageId is required".into()))?;
    let deal = state.controller.assign_stage(&id, &stage_id).await?;
    Ok(Json(deal))
}

async fn create_deal(
    State(state): State<SharedState>,
    Json(req): Json<NewDeal>,
) -> Result<impl IntoResponse, ApiError> {
    let deal = state.controller.create_deal(req).await?;
    Ok((StatusCode::CREATED, Json(deal)))
}

async fn get_board(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.controller.board())
}

async fn update_filters(
    State(state): State<SharedState>,
    Json(filters): Json<BoardFilters>,
) -> impl IntoResponse {
    state.controller.set_filters(filters);
    Json(state.controller.board())
}

async fn move_deal(
    State(state): State<SharedState>,
    Json(req): Json<MoveRequest>,
) -> impl IntoResponse {
    Json(state.controller.move_deal(req).await)
}

async fn refresh_board(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let report = state.controller.refresh().await?;
    Ok(Json(report))
}
