//! HTTP surface: auth, connection requests and chat history.

pub mod auth;
pub mod chats;
pub mod error;
pub mod middleware;
pub mod requests;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};

use crate::auth::AppState;

/// Every REST route. `/auth/*` is public, the rest requires a bearer token.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/requests/send/{status}/{user_id}", post(requests::send_request))
        .route("/requests/review/{status}/{user_id}", post(requests::review_request))
        .route("/requests/received", get(requests::received_requests))
        .route("/requests/{user_id}", delete(requests::cancel_request))
        .route("/connections", get(requests::connections))
        .route("/chats", get(chats::list_chats))
        .route("/chats/with/{user_id}", get(chats::chat_with))
        .route("/chats/{chat_id}/messages", get(chats::messages))
        .route("/chats/{chat_id}/seen", post(chats::mark_seen))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}
