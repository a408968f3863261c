pub mod config;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use kindred_api::auth::{AppStateInner, decode_token};
use kindred_api::error::ApiError;
use kindred_db::Database;
use kindred_gateway::connection;
use kindred_gateway::{Dispatcher, Gateway, GatewayConfig};

use crate::config::ServerConfig;

#[derive(Clone)]
struct GatewayState {
    gateway: Gateway,
    jwt_secret: Arc<str>,
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

/// The full application: REST routes, the `/gateway` WebSocket and `/health`.
pub fn app(db: Arc<Database>, config: &ServerConfig) -> Router {
    let api_state = Arc::new(AppStateInner {
        db: db.clone(),
        jwt_secret: config.jwt_secret.clone(),
        token_ttl_days: config.token_ttl_days,
        require_connection: config.require_connection,
    });

    let gateway = Gateway::new(
        db,
        Dispatcher::new(),
        GatewayConfig {
            require_connection: config.require_connection,
        },
    );

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(GatewayState {
            gateway,
            jwt_secret: config.jwt_secret.as_str().into(),
        });

    Router::new()
        .merge(kindred_api::router(api_state))
        .merge(ws_route)
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Upgrade to the gateway. The token is checked before upgrading so an
/// unauthenticated client never gets a socket.
async fn ws_upgrade(
    State(state): State<GatewayState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = query.token else {
        return ApiError::Unauthorized.into_response();
    };
    let claims = match decode_token(&state.jwt_secret, &token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("Gateway upgrade rejected: {}", e);
            return ApiError::Unauthorized.into_response();
        }
    };

    debug!("Gateway upgrade for {} ({})", claims.username, claims.sub);
    ws.on_upgrade(move |socket| {
        connection::handle_connection_authenticated(socket, state.gateway, claims.sub, claims.username)
    })
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
