use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (users, connection requests)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            -- pair_key is min(id):max(id); one request per unordered pair
            CREATE TABLE connection_requests (
                id              TEXT PRIMARY KEY,
                from_user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                to_user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                pair_key        TEXT NOT NULL UNIQUE,
                status          TEXT NOT NULL
                    CHECK (status IN ('interested', 'ignored', 'accepted', 'rejected')),
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                CHECK (from_user_id <> to_user_id)
            );

            CREATE INDEX idx_connection_requests_to
                ON connection_requests(to_user_id, status);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (chats, messages, read receipts)");
        conn.execute_batch(
            "
            -- user_a < user_b; pair_key guards against concurrent creation
            CREATE TABLE chats (
                id          TEXT PRIMARY KEY,
                user_a      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                user_b      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                pair_key    TEXT NOT NULL UNIQUE,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                CHECK (user_a < user_b)
            );

            CREATE INDEX idx_chats_user_a ON chats(user_a);
            CREATE INDEX idx_chats_user_b ON chats(user_b);

            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                chat_id     TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                sender_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                text        TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                -- bumped when a read receipt is added
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX idx_messages_chat
                ON messages(chat_id, created_at);

            CREATE TABLE message_seen (
                message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                seen_at     TEXT NOT NULL,
                PRIMARY KEY (message_id, user_id)
            );

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }
}
