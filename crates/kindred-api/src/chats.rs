use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::debug;
use uuid::Uuid;

use kindred_db::{StoreError, parse_id};
use kindred_types::api::{ChatWithMessages, Claims, MarkSeenRequest, MarkSeenResponse};

use crate::auth::AppState;
use crate::error::ApiResult;

/// `GET /chats`: the caller's chat list, most recent first.
pub async fn list_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let user_id = claims.sub;
    let chats = state.blocking(move |db| db.chat_list(user_id)).await?;
    Ok(Json(chats))
}

/// `GET /chats/with/{user_id}`: open (or create) the chat with a peer and
/// return its history.
pub async fn chat_with(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let peer = parse_id(&user_id)?;
    let me = claims.sub;
    let require_connection = state.require_connection;

    let (chat, messages) = state
        .blocking(move |db| {
            if me == peer {
                return Err(StoreError::SelfReference);
            }
            if require_connection && !db.are_connected(me, peer)? {
                return Err(StoreError::Forbidden("users are not connected"));
            }
            let chat = db.find_or_create_chat(me, peer)?;
            let messages = db.list_messages(chat.id, me)?;
            Ok((chat, messages))
        })
        .await?;

    Ok(Json(ChatWithMessages { chat, messages }))
}

/// `GET /chats/{chat_id}/messages`
pub async fn messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let chat_id = parse_id(&chat_id)?;
    let me = claims.sub;
    let messages = state
        .blocking(move |db| db.list_messages(chat_id, me))
        .await?;
    Ok(Json(messages))
}

/// `POST /chats/{chat_id}/seen`: mark the listed messages, or the whole chat
/// when no ids are given.
pub async fn mark_seen(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(claims): Extension<Claims>,
    body: Option<Json<MarkSeenRequest>>,
) -> ApiResult<impl IntoResponse> {
    let chat_id = parse_id(&chat_id)?;
    let me = claims.sub;
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let message_ids = req
        .message_ids
        .map(|ids| ids.iter().map(|raw| parse_id(raw)).collect::<Result<Vec<Uuid>, _>>())
        .transpose()?;

    let marked = state
        .blocking(move |db| match message_ids {
            Some(ids) => db.mark_seen(chat_id, me, &ids),
            None => db.mark_chat_seen(chat_id, me),
        })
        .await?;

    debug!("{} marked {} messages seen in chat {}", me, marked.len(), chat_id);
    Ok(Json(MarkSeenResponse {
        marked: marked.len(),
    }))
}
