//! Connection graph: the request/accept state machine between two users.

use kindred_types::models::{ConnectionRequest, RequestIntent, RequestStatus, ReviewDecision, User};
use rusqlite::{Connection, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::users::user_exists;
use crate::{
    current_time, Database, Entity, OptionalExt, StoreError, StoreResult, is_foreign_key_violation,
    is_unique_violation, pair_key, time_col, timestamp, uuid_col,
};

const REQUEST_COLUMNS: &str = "id, from_user_id, to_user_id, status, created_at, updated_at";

impl Database {
    /// Open a request from `from` to `to`.
    ///
    /// The UNIQUE pair key rejects a second request for the same pair in
    /// either direction; the caller gets the existing record back.
    pub fn send_request(
        &self,
        from: Uuid,
        to: Uuid,
        intent: RequestIntent,
    ) -> StoreResult<ConnectionRequest> {
        if from == to {
            return Err(StoreError::SelfReference);
        }

        self.with_conn(|conn| {
            if !user_exists(conn, to)? {
                return Err(StoreError::NotFound(Entity::User));
            }

            let now = current_time();
            let request = ConnectionRequest {
                id: Uuid::new_v4(),
                from_user_id: from,
                to_user_id: to,
                status: intent.into(),
                created_at: now,
                updated_at: now,
            };
            let key = pair_key(from, to);

            let inserted = conn.execute(
                "INSERT INTO connection_requests
                    (id, from_user_id, to_user_id, pair_key, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![
                    request.id.to_string(),
                    from.to_string(),
                    to.to_string(),
                    key,
                    request.status.as_str(),
                    timestamp(now),
                ],
            );

            match inserted {
                Ok(_) => {
                    info!("{} -> {} connection request ({})", from, to, request.status);
                    Ok(request)
                }
                Err(e) if is_unique_violation(&e) => {
                    let existing = query_request_by_pair(conn, &key)?.ok_or_else(|| {
                        StoreError::Internal(format!("pair {} conflicted but has no request", key))
                    })?;
                    debug!("{} -> {} conflicts with request {}", from, to, existing.id);
                    Err(StoreError::Conflict(Box::new(existing)))
                }
                Err(e) if is_foreign_key_violation(&e) => Err(StoreError::NotFound(Entity::User)),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Accept or reject the open request `from -> receiver`.
    pub fn review_request(
        &self,
        receiver: Uuid,
        from: Uuid,
        decision: ReviewDecision,
    ) -> StoreResult<ConnectionRequest> {
        let next = RequestStatus::from(decision);

        self.with_conn(|conn| {
            let current = query_directed_request(conn, from, receiver)?
                .filter(|r| r.status.can_transition_to(next))
                .ok_or(StoreError::NotFound(Entity::Request))?;

            let now = current_time();
            let updated = conn.execute(
                "UPDATE connection_requests SET status = ?1, updated_at = ?2
                 WHERE id = ?3 AND status = ?4",
                rusqlite::params![
                    next.as_str(),
                    timestamp(now),
                    current.id.to_string(),
                    current.status.as_str(),
                ],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(Entity::Request));
            }

            info!("{} {} connection request from {}", receiver, next, from);
            Ok(ConnectionRequest {
                status: next,
                updated_at: now,
                ..current
            })
        })
    }

    /// Withdraw the still-open request `sender -> to`. Deleting it frees the
    /// pair for a later `send_request`.
    pub fn cancel_request(&self, sender: Uuid, to: Uuid) -> StoreResult<ConnectionRequest> {
        self.with_conn(|conn| {
            let current = query_directed_request(conn, sender, to)?
                .filter(|r| r.status.can_cancel())
                .ok_or(StoreError::NotFound(Entity::Request))?;

            let deleted = conn.execute(
                "DELETE FROM connection_requests WHERE id = ?1 AND status = ?2",
                rusqlite::params![current.id.to_string(), current.status.as_str()],
            )?;
            if deleted == 0 {
                return Err(StoreError::NotFound(Entity::Request));
            }

            info!("{} cancelled connection request to {}", sender, to);
            Ok(current)
        })
    }

    /// The request for this pair, whichever direction it was sent in.
    pub fn get_request_between(&self, a: Uuid, b: Uuid) -> StoreResult<Option<ConnectionRequest>> {
        self.with_conn(|conn| query_request_by_pair(conn, &pair_key(a, b)))
    }

    pub fn are_connected(&self, a: Uuid, b: Uuid) -> StoreResult<bool> {
        Ok(self
            .get_request_between(a, b)?
            .is_some_and(|r| r.status == RequestStatus::Accepted))
    }

    /// Peers of every accepted request touching `user_id`, most recent first.
    pub fn list_connections(&self, user_id: Uuid) -> StoreResult<Vec<User>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.created_at
                 FROM connection_requests r
                 JOIN users u ON u.id = CASE
                     WHEN r.from_user_id = ?1 THEN r.to_user_id
                     ELSE r.from_user_id
                 END
                 WHERE r.status = 'accepted'
                   AND (r.from_user_id = ?1 OR r.to_user_id = ?1)
                 ORDER BY r.updated_at DESC",
            )?;

            let users = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok(User {
                        id: uuid_col(row, 0)?,
                        username: row.get(1)?,
                        created_at: time_col(row, 2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(users)
        })
    }

    /// Open requests addressed to `user_id`, newest first.
    pub fn list_pending_requests(&self, user_id: Uuid) -> StoreResult<Vec<ConnectionRequest>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM connection_requests
                 WHERE to_user_id = ?1 AND status = 'interested'
                 ORDER BY created_at DESC",
                REQUEST_COLUMNS
            ))?;

            let requests = stmt
                .query_map([user_id.to_string()], request_from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(requests)
        })
    }
}

fn query_request_by_pair(conn: &Connection, key: &str) -> StoreResult<Option<ConnectionRequest>> {
    conn.query_row(
        &format!("SELECT {} FROM connection_requests WHERE pair_key = ?1", REQUEST_COLUMNS),
        [key],
        request_from_row,
    )
    .optional()
}

fn query_directed_request(
    conn: &Connection,
    from: Uuid,
    to: Uuid,
) -> StoreResult<Option<ConnectionRequest>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM connection_requests WHERE from_user_id = ?1 AND to_user_id = ?2",
            REQUEST_COLUMNS
        ),
        [from.to_string(), to.to_string()],
        request_from_row,
    )
    .optional()
}

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<ConnectionRequest> {
    let status: String = row.get(3)?;
    Ok(ConnectionRequest {
        id: uuid_col(row, 0)?,
        from_user_id: uuid_col(row, 1)?,
        to_user_id: uuid_col(row, 2)?,
        status: status.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?,
        created_at: time_col(row, 4)?,
        updated_at: time_col(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::db_with_users;

    #[test]
    fn self_request_is_rejected() {
        let (db, users) = db_with_users(1);
        let err = db
            .send_request(users[0], users[0], RequestIntent::Interested)
            .unwrap_err();
        assert!(matches!(err, StoreError::SelfReference));
    }

    #[test]
    fn request_to_unknown_user_is_not_found() {
        let (db, users) = db_with_users(1);
        let err = db
            .send_request(users[0], Uuid::new_v4(), RequestIntent::Interested)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(Entity::User)));
    }

    #[test]
    fn reverse_request_conflicts_with_first() {
        let (db, users) = db_with_users(2);
        let (a, b) = (users[0], users[1]);

        let first = db.send_request(a, b, RequestIntent::Interested).unwrap();
        assert_eq!(first.status, RequestStatus::Interested);

        match db.send_request(b, a, RequestIntent::Ignored) {
            Err(StoreError::Conflict(existing)) => assert_eq!(*existing, first),
            other => panic!("expected conflict, got {:?}", other),
        }
        match db.send_request(a, b, RequestIntent::Interested) {
            Err(StoreError::Conflict(existing)) => assert_eq!(existing.id, first.id),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn only_receiver_can_review() {
        let (db, users) = db_with_users(3);
        let (a, b, c) = (users[0], users[1], users[2]);
        db.send_request(a, b, RequestIntent::Interested).unwrap();

        // the sender cannot accept their own request
        assert!(matches!(
            db.review_request(a, b, ReviewDecision::Accepted),
            Err(StoreError::NotFound(Entity::Request))
        ));
        // a bystander cannot either
        assert!(matches!(
            db.review_request(c, a, ReviewDecision::Accepted),
            Err(StoreError::NotFound(Entity::Request))
        ));

        let accepted = db.review_request(b, a, ReviewDecision::Accepted).unwrap();
        assert_eq!(accepted.status, RequestStatus::Accepted);
        assert!(accepted.updated_at >= accepted.created_at);
    }

    #[test]
    fn review_never_touches_terminal_records() {
        let (db, users) = db_with_users(4);
        let (a, b, c, d) = (users[0], users[1], users[2], users[3]);

        db.send_request(a, b, RequestIntent::Ignored).unwrap();
        db.send_request(c, d, RequestIntent::Interested).unwrap();
        db.review_request(d, c, ReviewDecision::Rejected).unwrap();

        for (receiver, from) in [(b, a), (d, c)] {
            let before = db.get_request_between(receiver, from).unwrap().unwrap();
            for decision in [ReviewDecision::Accepted, ReviewDecision::Rejected] {
                assert!(matches!(
                    db.review_request(receiver, from, decision),
                    Err(StoreError::NotFound(Entity::Request))
                ));
            }
            let after = db.get_request_between(receiver, from).unwrap().unwrap();
            assert_eq!(before, after);
        }
    }

    #[test]
    fn accepted_pair_lists_each_other_once() {
        let (db, users) = db_with_users(3);
        let (a, b, c) = (users[0], users[1], users[2]);

        db.send_request(a, b, RequestIntent::Interested).unwrap();
        db.send_request(c, a, RequestIntent::Interested).unwrap();
        db.review_request(b, a, ReviewDecision::Accepted).unwrap();

        let of_a: Vec<Uuid> = db.list_connections(a).unwrap().iter().map(|u| u.id).collect();
        let of_b: Vec<Uuid> = db.list_connections(b).unwrap().iter().map(|u| u.id).collect();
        assert_eq!(of_a, vec![b]);
        assert_eq!(of_b, vec![a]);
        assert!(db.are_connected(a, b).unwrap());
        assert!(db.are_connected(b, a).unwrap());
        assert!(!db.are_connected(a, c).unwrap());
    }

    #[test]
    fn cancel_frees_the_pair() {
        let (db, users) = db_with_users(2);
        let (a, b) = (users[0], users[1]);

        let first = db.send_request(a, b, RequestIntent::Interested).unwrap();

        // only the sender may cancel
        assert!(matches!(
            db.cancel_request(b, a),
            Err(StoreError::NotFound(Entity::Request))
        ));

        let cancelled = db.cancel_request(a, b).unwrap();
        assert_eq!(cancelled.id, first.id);
        assert!(db.get_request_between(a, b).unwrap().is_none());

        let again = db.send_request(a, b, RequestIntent::Interested).unwrap();
        assert_ne!(again.id, first.id);
    }

    #[test]
    fn cannot_cancel_after_review() {
        let (db, users) = db_with_users(2);
        let (a, b) = (users[0], users[1]);

        db.send_request(a, b, RequestIntent::Interested).unwrap();
        db.review_request(b, a, ReviewDecision::Rejected).unwrap();

        assert!(matches!(
            db.cancel_request(a, b),
            Err(StoreError::NotFound(Entity::Request))
        ));
        assert_eq!(
            db.get_request_between(a, b).unwrap().unwrap().status,
            RequestStatus::Rejected
        );
    }

    #[test]
    fn pending_lists_only_open_incoming() {
        let (db, users) = db_with_users(4);
        let (me, x, y, z) = (users[0], users[1], users[2], users[3]);

        db.send_request(x, me, RequestIntent::Interested).unwrap();
        db.send_request(y, me, RequestIntent::Ignored).unwrap();
        db.send_request(me, z, RequestIntent::Interested).unwrap();

        let pending = db.list_pending_requests(me).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].from_user_id, x);
    }
}
