use kindred_types::models::User;
use rusqlite::Connection;
use uuid::Uuid;

use crate::models::UserRow;
use crate::{
    current_time, Database, OptionalExt, StoreError, StoreResult, is_unique_violation, timestamp,
};

impl Database {
    pub fn create_user(&self, id: Uuid, username: &str, password_hash: &str) -> StoreResult<User> {
        let now = current_time();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                (id.to_string(), username, password_hash, timestamp(now)),
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::UsernameTaken
                } else {
                    e.into()
                }
            })?;
            Ok(User {
                id,
                username: username.to_string(),
                created_at: now,
            })
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> StoreResult<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, username, password, created_at FROM users WHERE username = ?1",
                [username],
                |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        password: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn user_exists(&self, id: Uuid) -> StoreResult<bool> {
        self.with_conn(|conn| user_exists(conn, id))
    }
}

pub(crate) fn user_exists(conn: &Connection, id: Uuid) -> StoreResult<bool> {
    let found = conn
        .query_row("SELECT 1 FROM users WHERE id = ?1", [id.to_string()], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_username_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(Uuid::new_v4(), "ada", "hash").unwrap();
        let err = db.create_user(Uuid::new_v4(), "ada", "hash").unwrap_err();
        assert!(matches!(err, StoreError::UsernameTaken));
    }

    #[test]
    fn lookup_by_id_and_name() {
        let db = Database::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        db.create_user(id, "grace", "argon-hash").unwrap();

        assert!(db.user_exists(id).unwrap());
        assert!(!db.user_exists(Uuid::new_v4()).unwrap());

        let row = db.get_user_by_username("grace").unwrap().unwrap();
        assert_eq!(row.password, "argon-hash");
        assert_eq!(row.id, id.to_string());
        assert!(db.get_user_by_username("nobody").unwrap().is_none());
    }
}
