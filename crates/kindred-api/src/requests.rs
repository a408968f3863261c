use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use kindred_db::parse_id;
use kindred_types::api::Claims;
use kindred_types::models::{RequestIntent, ReviewDecision};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// `POST /requests/send/{status}/{user_id}`: status is `interested` or `ignored`.
pub async fn send_request(
    State(state): State<AppState>,
    Path((status, user_id)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let intent: RequestIntent = status
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("{}", e)))?;
    let to = parse_id(&user_id)?;
    let from = claims.sub;

    let request = state
        .blocking(move |db| db.send_request(from, to, intent))
        .await?;

    info!("{} ({}) sent '{}' request to {}", claims.username, from, request.status, to);
    Ok((StatusCode::CREATED, Json(request)))
}

/// `POST /requests/review/{status}/{user_id}`: status is `accepted` or
/// `rejected`; `user_id` is the original sender.
pub async fn review_request(
    State(state): State<AppState>,
    Path((status, user_id)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let decision: ReviewDecision = status
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("{}", e)))?;
    let from = parse_id(&user_id)?;
    let receiver = claims.sub;

    let request = state
        .blocking(move |db| db.review_request(receiver, from, decision))
        .await?;

    info!("{} ({}) {} request from {}", claims.username, receiver, request.status, from);
    Ok(Json(request))
}

/// `DELETE /requests/{user_id}`: withdraw a pending request sent to `user_id`.
pub async fn cancel_request(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let to = parse_id(&user_id)?;
    let sender = claims.sub;

    let request = state
        .blocking(move |db| db.cancel_request(sender, to))
        .await?;

    info!("{} ({}) cancelled request to {}", claims.username, sender, to);
    Ok(Json(request))
}

pub async fn received_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let user_id = claims.sub;
    let requests = state
        .blocking(move |db| db.list_pending_requests(user_id))
        .await?;
    Ok(Json(requests))
}

pub async fn connections(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let user_id = claims.sub;
    let users = state
        .blocking(move |db| db.list_connections(user_id))
        .await?;
    Ok(Json(users))
}
