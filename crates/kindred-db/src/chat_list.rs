//! Per-user chat list: peer, last message and unread count for every chat.
//!
//! Computed on each call; nothing is materialized.

use std::cmp::Ordering;

use kindred_types::models::{ChatSummary, Peer};
use uuid::Uuid;

use crate::chats::query_last_message;
use crate::{Database, StoreResult, uuid_col};

impl Database {
    pub fn chat_list(&self, user_id: Uuid) -> StoreResult<Vec<ChatSummary>> {
        let mut summaries = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, u.id, u.username
                 FROM chats c
                 JOIN users u ON u.id = CASE WHEN c.user_a = ?1 THEN c.user_b ELSE c.user_a END
                 WHERE c.user_a = ?1 OR c.user_b = ?1",
            )?;
            let chats = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok((
                        uuid_col(row, 0)?,
                        Peer {
                            id: uuid_col(row, 1)?,
                            username: row.get(2)?,
                        },
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut unread_stmt = conn.prepare(
                "SELECT COUNT(*) FROM messages m
                 WHERE m.chat_id = ?1
                   AND m.sender_id <> ?2
                   AND NOT EXISTS (
                       SELECT 1 FROM message_seen s
                       WHERE s.message_id = m.id AND s.user_id = ?2
                   )",
            )?;

            let mut summaries = Vec::with_capacity(chats.len());
            for (chat_id, peer) in chats {
                let unread: i64 = unread_stmt
                    .query_row([chat_id.to_string(), user_id.to_string()], |r| r.get(0))?;
                summaries.push(ChatSummary {
                    chat_id,
                    peer,
                    last_message: query_last_message(conn, chat_id)?,
                    unread_count: unread.max(0) as u64,
                });
            }
            Ok(summaries)
        })?;

        sort_by_recency(&mut summaries);
        Ok(summaries)
    }
}

/// Most recent conversation first; chats without messages go last.
pub fn sort_by_recency(summaries: &mut [ChatSummary]) {
    summaries.sort_by(|a, b| match (&a.last_message, &b.last_message) {
        (Some(x), Some(y)) => y.created_at.cmp(&x.created_at),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::db_with_users;

    #[test]
    fn first_message_counts_as_unread_for_receiver() {
        let (db, users) = db_with_users(2);
        let (a, b) = (users[0], users[1]);

        let chat = db.find_or_create_chat(a, b).unwrap();
        let hi = db.append_message(chat.id, a, "hi").unwrap();

        let for_b = db.chat_list(b).unwrap();
        assert_eq!(for_b.len(), 1);
        assert_eq!(for_b[0].chat_id, chat.id);
        assert_eq!(for_b[0].peer.id, a);
        assert_eq!(for_b[0].peer.username, "user0");
        assert_eq!(for_b[0].unread_count, 1);
        assert_eq!(for_b[0].last_message.as_ref().unwrap().id, hi.id);

        let for_a = db.chat_list(a).unwrap();
        assert_eq!(for_a[0].unread_count, 0);
        assert_eq!(for_a[0].peer.id, b);
    }

    #[test]
    fn unread_count_matches_message_state() {
        let (db, users) = db_with_users(2);
        let (a, b) = (users[0], users[1]);
        let chat = db.find_or_create_chat(a, b).unwrap();

        let mut from_a = Vec::new();
        for i in 0..4 {
            from_a.push(db.append_message(chat.id, a, &format!("a{}", i)).unwrap().id);
            db.append_message(chat.id, b, &format!("b{}", i)).unwrap();
        }
        db.mark_seen(chat.id, b, &from_a[..2]).unwrap();

        for user in [a, b] {
            let expected = db
                .list_messages(chat.id, user)
                .unwrap()
                .iter()
                .filter(|m| m.is_unread_for(user))
                .count() as u64;
            let summary = &db.chat_list(user).unwrap()[0];
            assert_eq!(summary.unread_count, expected);
        }
        assert_eq!(db.chat_list(b).unwrap()[0].unread_count, 2);
        assert_eq!(db.chat_list(a).unwrap()[0].unread_count, 4);
    }

    #[test]
    fn sorted_by_last_message_with_empty_chats_last() {
        let (db, users) = db_with_users(4);
        let (me, x, y, z) = (users[0], users[1], users[2], users[3]);

        let empty = db.find_or_create_chat(me, z).unwrap();
        let older = db.find_or_create_chat(me, x).unwrap();
        let newer = db.find_or_create_chat(me, y).unwrap();

        db.append_message(older.id, x, "first").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        db.append_message(newer.id, y, "second").unwrap();

        let list = db.chat_list(me).unwrap();
        let order: Vec<Uuid> = list.iter().map(|s| s.chat_id).collect();
        assert_eq!(order, vec![newer.id, older.id, empty.id]);
        assert!(list[2].last_message.is_none());
        assert_eq!(list[2].unread_count, 0);
    }

    #[test]
    fn outsiders_see_no_chats() {
        let (db, users) = db_with_users(3);
        let chat = db.find_or_create_chat(users[0], users[1]).unwrap();
        db.append_message(chat.id, users[0], "hello").unwrap();
        assert!(db.chat_list(users[2]).unwrap().is_empty());
    }
}
