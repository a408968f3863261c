//! Chat store: one chat per unordered pair, messages and read receipts.

use std::collections::HashMap;

use kindred_types::models::{Chat, Message};
use rusqlite::{Connection, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    current_time, Database, Entity, OptionalExt, StoreError, StoreResult, canonical_pair,
    is_foreign_key_violation, pair_key, time_col, timestamp, uuid_col,
};

/// Longest accepted message body, in characters.
pub const MAX_MESSAGE_LEN: usize = 4000;

const CHAT_COLUMNS: &str = "id, user_a, user_b, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, chat_id, sender_id, text, created_at, updated_at";

impl Database {
    /// Return the chat for this pair, creating it on first use.
    ///
    /// Concurrent callers race on the UNIQUE pair key: the losers' inserts
    /// are no-ops and everyone reads back the same row.
    pub fn find_or_create_chat(&self, a: Uuid, b: Uuid) -> StoreResult<Chat> {
        if a == b {
            return Err(StoreError::SelfReference);
        }
        let (user_a, user_b) = canonical_pair(a, b);
        let key = pair_key(a, b);

        self.with_conn(|conn| {
            let now = timestamp(current_time());
            let inserted = conn
                .execute(
                    "INSERT INTO chats (id, user_a, user_b, pair_key, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                     ON CONFLICT(pair_key) DO NOTHING",
                    rusqlite::params![
                        Uuid::new_v4().to_string(),
                        user_a.to_string(),
                        user_b.to_string(),
                        key,
                        now,
                    ],
                )
                .map_err(|e| {
                    if is_foreign_key_violation(&e) {
                        StoreError::NotFound(Entity::User)
                    } else {
                        e.into()
                    }
                })?;

            let chat = query_chat_by_pair(conn, &key)?
                .ok_or_else(|| StoreError::Internal(format!("chat for pair {} vanished", key)))?;
            if inserted == 1 {
                info!("Created chat {} for {} and {}", chat.id, user_a, user_b);
            }
            Ok(chat)
        })
    }

    pub fn get_chat(&self, chat_id: Uuid) -> StoreResult<Chat> {
        self.with_conn(|conn| query_chat(conn, chat_id)?.ok_or(StoreError::NotFound(Entity::Chat)))
    }

    /// Persist a message. The sender is recorded as its first viewer.
    pub fn append_message(&self, chat_id: Uuid, sender: Uuid, text: &str) -> StoreResult<Message> {
        validate_text(text)?;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            participant_chat(&tx, chat_id, sender)?;

            let created_at = current_time();
            let message = Message {
                id: Uuid::new_v4(),
                chat_id,
                sender,
                text: text.to_string(),
                seen_by: vec![sender],
                created_at,
                updated_at: created_at,
            };
            let ts = timestamp(created_at);

            tx.execute(
                "INSERT INTO messages (id, chat_id, sender_id, text, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![
                    message.id.to_string(),
                    chat_id.to_string(),
                    sender.to_string(),
                    message.text,
                    ts,
                ],
            )?;
            tx.execute(
                "INSERT INTO message_seen (message_id, user_id, seen_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![message.id.to_string(), sender.to_string(), ts],
            )?;
            tx.execute(
                "UPDATE chats SET updated_at = ?1 WHERE id = ?2",
                rusqlite::params![ts, chat_id.to_string()],
            )?;
            tx.commit()?;

            debug!("Appended message {} to chat {}", message.id, chat_id);
            Ok(message)
        })
    }

    /// Add `user_id` to the viewers of each named message of the chat.
    /// Ids that are unknown, already seen or belong to another chat are
    /// skipped. Returns the ids whose receipt was newly recorded.
    pub fn mark_seen(&self, chat_id: Uuid, user_id: Uuid, message_ids: &[Uuid]) -> StoreResult<Vec<Uuid>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            participant_chat(&tx, chat_id, user_id)?;
            let marked = record_receipts(&tx, chat_id, user_id, message_ids)?;
            tx.commit()?;
            Ok(marked)
        })
    }

    /// Mark every message of the chat as seen by `user_id`.
    pub fn mark_chat_seen(&self, chat_id: Uuid, user_id: Uuid) -> StoreResult<Vec<Uuid>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            participant_chat(&tx, chat_id, user_id)?;

            let unseen = {
                let mut stmt = tx.prepare(
                    "SELECT m.id FROM messages m
                     WHERE m.chat_id = ?1
                       AND NOT EXISTS (
                           SELECT 1 FROM message_seen s
                           WHERE s.message_id = m.id AND s.user_id = ?2
                       )",
                )?;
                let ids = stmt
                    .query_map([chat_id.to_string(), user_id.to_string()], |row| uuid_col(row, 0))?
                    .collect::<Result<Vec<_>, _>>()?;
                ids
            };

            let marked = record_receipts(&tx, chat_id, user_id, &unseen)?;
            tx.commit()?;
            Ok(marked)
        })
    }

    /// Messages of the chat in creation order. Only participants may read.
    pub fn list_messages(&self, chat_id: Uuid, requester: Uuid) -> StoreResult<Vec<Message>> {
        self.with_conn(|conn| {
            participant_chat(conn, chat_id, requester)?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM messages WHERE chat_id = ?1 ORDER BY created_at ASC, rowid ASC",
                MESSAGE_COLUMNS
            ))?;
            let mut messages = stmt
                .query_map([chat_id.to_string()], message_from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            let mut seen = query_seen_for_chat(conn, chat_id)?;
            for message in &mut messages {
                message.seen_by = seen.remove(&message.id).unwrap_or_default();
            }

            Ok(messages)
        })
    }
}

fn validate_text(text: &str) -> StoreResult<()> {
    if text.trim().is_empty() {
        return Err(StoreError::InvalidMessage("text is empty"));
    }
    if text.chars().count() > MAX_MESSAGE_LEN {
        return Err(StoreError::InvalidMessage("text is too long"));
    }
    Ok(())
}

/// Insert receipts for the messages of `chat_id` among `message_ids` and
/// touch their `updated_at`. Returns the ids that gained a receipt.
fn record_receipts(
    conn: &Connection,
    chat_id: Uuid,
    user_id: Uuid,
    message_ids: &[Uuid],
) -> StoreResult<Vec<Uuid>> {
    let now = timestamp(current_time());
    let mut insert = conn.prepare(
        "INSERT OR IGNORE INTO message_seen (message_id, user_id, seen_at)
         SELECT id, ?2, ?3 FROM messages WHERE id = ?1 AND chat_id = ?4",
    )?;
    let mut touch = conn.prepare("UPDATE messages SET updated_at = ?1 WHERE id = ?2")?;

    let mut marked = Vec::new();
    for id in message_ids {
        let inserted = insert.execute(rusqlite::params![
            id.to_string(),
            user_id.to_string(),
            now,
            chat_id.to_string(),
        ])?;
        if inserted == 1 {
            touch.execute(rusqlite::params![now, id.to_string()])?;
            marked.push(*id);
        }
    }
    Ok(marked)
}

/// Load a chat and check that `user_id` takes part in it.
pub(crate) fn participant_chat(conn: &Connection, chat_id: Uuid, user_id: Uuid) -> StoreResult<Chat> {
    let chat = query_chat(conn, chat_id)?.ok_or(StoreError::NotFound(Entity::Chat))?;
    if !chat.has_participant(user_id) {
        return Err(StoreError::Forbidden("not a participant of this chat"));
    }
    Ok(chat)
}

pub(crate) fn query_chat(conn: &Connection, chat_id: Uuid) -> StoreResult<Option<Chat>> {
    conn.query_row(
        &format!("SELECT {} FROM chats WHERE id = ?1", CHAT_COLUMNS),
        [chat_id.to_string()],
        chat_from_row,
    )
    .optional()
}

fn query_chat_by_pair(conn: &Connection, key: &str) -> StoreResult<Option<Chat>> {
    conn.query_row(
        &format!("SELECT {} FROM chats WHERE pair_key = ?1", CHAT_COLUMNS),
        [key],
        chat_from_row,
    )
    .optional()
}

/// Most recent message of a chat, with its viewers.
pub(crate) fn query_last_message(conn: &Connection, chat_id: Uuid) -> StoreResult<Option<Message>> {
    let last = conn
        .query_row(
            &format!(
                "SELECT {} FROM messages WHERE chat_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                MESSAGE_COLUMNS
            ),
            [chat_id.to_string()],
            message_from_row,
        )
        .optional()?;

    let Some(mut message) = last else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT user_id FROM message_seen WHERE message_id = ?1 ORDER BY seen_at ASC, rowid ASC",
    )?;
    message.seen_by = stmt
        .query_map([message.id.to_string()], |row| uuid_col(row, 0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(message))
}

/// Viewers of every message in a chat, in the order they saw it.
fn query_seen_for_chat(conn: &Connection, chat_id: Uuid) -> StoreResult<HashMap<Uuid, Vec<Uuid>>> {
    let mut stmt = conn.prepare(
        "SELECT s.message_id, s.user_id
         FROM message_seen s
         JOIN messages m ON m.id = s.message_id
         WHERE m.chat_id = ?1
         ORDER BY s.seen_at ASC, s.rowid ASC",
    )?;

    let rows = stmt
        .query_map([chat_id.to_string()], |row| Ok((uuid_col(row, 0)?, uuid_col(row, 1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut seen: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (message_id, user_id) in rows {
        seen.entry(message_id).or_default().push(user_id);
    }
    Ok(seen)
}

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: uuid_col(row, 0)?,
        participants: [uuid_col(row, 1)?, uuid_col(row, 2)?],
        created_at: time_col(row, 3)?,
        updated_at: time_col(row, 4)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: uuid_col(row, 0)?,
        chat_id: uuid_col(row, 1)?,
        sender: uuid_col(row, 2)?,
        text: row.get(3)?,
        seen_by: Vec::new(),
        created_at: time_col(row, 4)?,
        updated_at: time_col(row, 5)?,
    })
}
