//! Call and confbridge lookups

use super::{ApiResponse, AppState};
use crate::domain::call::Call;
use crate::domain::confbridge::Confbridge;
use crate::domain::shared::DomainError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::{error, info};
use uuid::Uuid;

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<T>>)>;

fn failure<T>(err: DomainError) -> (StatusCode, Json<ApiResponse<T>>) {
    let status = match &err {
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::ValidationError(_)
        | DomainError::InvalidOperation(_)
        | DomainError::InvalidStateTransition(_) => StatusCode::BAD_REQUEST,
        DomainError::AlreadyExists(_) => StatusCode::CONFLICT,
        DomainError::Upstream(_) | DomainError::Internal(_) => {
            error!("API request failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(ApiResponse::error(err.to_string())))
}

/// Health check endpoint
pub async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("OK"))
}

pub async fn get_call(State(state): State<AppState>, Path(call_id): Path<Uuid>) -> ApiResult<Call> {
    info!("API: Getting call {}", call_id);
    state
        .core
        .call
        .get(call_id)
        .await
        .map(|call| Json(ApiResponse::success(call)))
        .map_err(failure)
}

pub async fn get_confbridge(
    State(state): State<AppState>,
    Path(confbridge_id): Path<Uuid>,
) -> ApiResult<Confbridge> {
    info!("API: Getting confbridge {}", confbridge_id);
    state
        .core
        .confbridge
        .get(confbridge_id)
        .await
        .map(|confbridge| Json(ApiResponse::success(confbridge)))
        .map_err(failure)
}
