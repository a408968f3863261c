use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use kindred_db::{Database, Entity, StoreError, StoreResult, parse_id};
use kindred_types::events::{ChatRef, GatewayCommand, GatewayEvent};

use crate::dispatcher::{ConnId, Dispatcher, short};
use crate::room::compute_room_id;

#[derive(Debug, Clone, Copy, Default)]
pub struct GatewayConfig {
    /// Only users with an accepted connection request may open or write
    /// to each other's room.
    pub require_connection: bool,
}

/// The authenticated side of one WebSocket.
#[derive(Debug, Clone)]
pub struct Session {
    pub conn_id: ConnId,
    pub user_id: Uuid,
    pub username: String,
}

/// Protocol handler shared by every connection of the process.
#[derive(Clone)]
pub struct Gateway {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher, config: GatewayConfig) -> Self {
        Self {
            db,
            dispatcher,
            config,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Register a connection for an already authenticated user and queue
    /// its `ready` event.
    pub async fn open_session(
        &self,
        user_id: Uuid,
        username: String,
    ) -> (Session, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (conn_id, rx) = self.dispatcher.register(user_id).await;
        let session = Session {
            conn_id,
            user_id,
            username,
        };
        self.dispatcher
            .send_to_connection(
                conn_id,
                GatewayEvent::Ready {
                    user_id,
                    username: session.username.clone(),
                },
            )
            .await;
        (session, rx)
    }

    /// Connection closed: implicit leave from every room.
    pub async fn close_session(&self, session: &Session) {
        let left = self.dispatcher.unregister(session.conn_id).await;
        debug!(
            "{} ({}) closed connection {}, left {} rooms",
            session.username,
            session.user_id,
            session.conn_id,
            left.len()
        );
    }

    /// Run one client command. Failures are answered with an `error`
    /// event to the issuing connection only.
    pub async fn handle_command(&self, session: &Session, cmd: GatewayCommand) {
        let command = cmd.name();
        if let Err(e) = self.dispatch(session, cmd).await {
            match &e {
                StoreError::Database(_) | StoreError::Internal(_) => {
                    error!("{} ({}) {} failed: {}", session.username, session.user_id, command, e)
                }
                _ => warn!("{} ({}) {} rejected: {}", session.username, session.user_id, command, e),
            }
            self.reject(session, Some(command), &e).await;
        }
    }

    /// Send an `error` event for `e` to this session.
    pub async fn reject(&self, session: &Session, command: Option<&str>, e: &StoreError) {
        let message = match e {
            StoreError::Database(_) | StoreError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        self.dispatcher
            .send_to_connection(
                session.conn_id,
                GatewayEvent::Error {
                    code: e.kind(),
                    message,
                    command: command.map(str::to_string),
                },
            )
            .await;
    }

    async fn dispatch(&self, session: &Session, cmd: GatewayCommand) -> StoreResult<()> {
        match cmd {
            GatewayCommand::JoinChat { self_id, peer_id } => {
                self.join_chat(session, &self_id, &peer_id).await
            }
            GatewayCommand::LeaveChat { self_id, peer_id } => {
                self.leave_chat(session, &self_id, &peer_id).await
            }
            GatewayCommand::SendMessage {
                sender_info,
                sender_id,
                receiver_id,
                text,
            } => {
                self.send_message(session, sender_info, &sender_id, &receiver_id, text)
                    .await
            }
            GatewayCommand::MarkSeen {
                chat_id,
                message_ids,
            } => self.mark_seen(session, &chat_id, &message_ids).await,
        }
    }

    async fn join_chat(&self, session: &Session, self_id: &str, peer_id: &str) -> StoreResult<()> {
        let peer = self.resolve_peer(session, self_id, peer_id).await?;
        self.check_policy(session.user_id, peer).await?;

        let room_id = compute_room_id(session.user_id, peer);
        if self.dispatcher.join(session.conn_id, &room_id).await {
            info!(
                "{} ({}) joined room {} with {}",
                session.username,
                session.user_id,
                short(&room_id),
                peer
            );
        }
        self.dispatcher
            .send_to_connection(
                session.conn_id,
                GatewayEvent::Joined {
                    room_id,
                    peer_id: peer,
                },
            )
            .await;
        Ok(())
    }

    async fn leave_chat(&self, session: &Session, self_id: &str, peer_id: &str) -> StoreResult<()> {
        let peer = parse_id(peer_id)?;
        self.check_identity(session, self_id)?;

        let room_id = compute_room_id(session.user_id, peer);
        if self.dispatcher.leave(session.conn_id, &room_id).await {
            info!(
                "{} ({}) left room {}",
                session.username,
                session.user_id,
                short(&room_id)
            );
        }
        self.dispatcher
            .send_to_connection(
                session.conn_id,
                GatewayEvent::Left {
                    room_id,
                    peer_id: peer,
                },
            )
            .await;
        Ok(())
    }

    async fn send_message(
        &self,
        session: &Session,
        sender_info: Option<serde_json::Value>,
        sender_id: &str,
        receiver_id: &str,
        text: String,
    ) -> StoreResult<()> {
        let receiver = self.resolve_peer(session, sender_id, receiver_id).await?;
        self.check_policy(session.user_id, receiver).await?;

        let sender = session.user_id;
        let room_id = compute_room_id(sender, receiver);

        // Persist and fan out under the room lock so all members agree on order.
        let lock = self.dispatcher.room_lock(&room_id);
        let outcome = {
            let _guard = lock.lock().await;
            self.persist_and_broadcast(&room_id, sender, receiver, sender_info, text)
                .await
        };
        drop(lock);
        self.dispatcher.release_room_lock_if_idle(&room_id).await;

        let (message_id, delivered) = outcome?;
        debug!(
            "{} ({}) -> {} message {} delivered to {} connections",
            session.username, sender, receiver, message_id, delivered
        );
        Ok(())
    }

    async fn persist_and_broadcast(
        &self,
        room_id: &str,
        sender: Uuid,
        receiver: Uuid,
        sender_info: Option<serde_json::Value>,
        text: String,
    ) -> StoreResult<(Uuid, usize)> {
        let (chat, message) = self
            .blocking(move |db| {
                let chat = db.find_or_create_chat(sender, receiver)?;
                let message = db.append_message(chat.id, sender, &text)?;
                Ok((chat, message))
            })
            .await?;

        let message_id = message.id;
        let delivered = self
            .dispatcher
            .broadcast_to_room(
                room_id,
                GatewayEvent::MessageReceived {
                    message_payload: message,
                    sender_info,
                    chat: ChatRef {
                        chat_id: chat.id,
                        participants: chat.participants,
                    },
                },
            )
            .await;
        Ok((message_id, delivered))
    }

    async fn mark_seen(&self, session: &Session, chat_id: &str, message_ids: &[String]) -> StoreResult<()> {
        let chat_id = parse_id(chat_id)?;
        let message_ids = message_ids
            .iter()
            .map(|raw| parse_id(raw))
            .collect::<StoreResult<Vec<Uuid>>>()?;

        let user_id = session.user_id;
        let (chat, marked) = self
            .blocking(move |db| {
                let chat = db.get_chat(chat_id)?;
                let marked = db.mark_seen(chat_id, user_id, &message_ids)?;
                Ok((chat, marked))
            })
            .await?;

        if marked.is_empty() {
            return Ok(());
        }
        let peer = chat
            .peer_of(user_id)
            .ok_or(StoreError::Forbidden("not a participant of this chat"))?;

        self.dispatcher
            .broadcast_to_room(
                &compute_room_id(user_id, peer),
                GatewayEvent::MessagesSeen {
                    chat_id,
                    user_id,
                    message_ids: marked,
                },
            )
            .await;
        Ok(())
    }

    /// Parse both ids, bind the claimed identity to the session and make
    /// sure the peer is a real user.
    async fn resolve_peer(&self, session: &Session, self_id: &str, peer_id: &str) -> StoreResult<Uuid> {
        let peer = parse_id(peer_id)?;
        self.check_identity(session, self_id)?;
        if peer == session.user_id {
            return Err(StoreError::SelfReference);
        }

        if !self.blocking(move |db| db.user_exists(peer)).await? {
            return Err(StoreError::NotFound(Entity::User));
        }
        Ok(peer)
    }

    fn check_identity(&self, session: &Session, claimed: &str) -> StoreResult<()> {
        if parse_id(claimed)? != session.user_id {
            return Err(StoreError::Forbidden("identity does not match this connection"));
        }
        Ok(())
    }

    async fn check_policy(&self, user_id: Uuid, peer: Uuid) -> StoreResult<()> {
        if !self.config.require_connection {
            return Ok(());
        }
        if self.blocking(move |db| db.are_connected(user_id, peer)).await? {
            Ok(())
        } else {
            Err(StoreError::Forbidden("users are not connected"))
        }
    }

    /// Run blocking SQLite work off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Database) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                StoreError::Internal(format!("blocking task failed: {}", e))
            })?
    }
}
