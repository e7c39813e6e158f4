use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use courier_types::models::{Contact, Message, ReceivedMessage, SentMessage, User};

use crate::Database;
use crate::StoreError;
use crate::models::UserRow;

impl Database {
    // -- Users --

    /// Single atomic insert; the primary-key constraint is the sole arbiter
    /// of username uniqueness, so one of two concurrent registrations wins
    /// and the other observes `DuplicateUsername`. Registration doubles as
    /// the first login, so `join_at` also seeds `last_login_at`.
    pub fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        first_name: &str,
        last_name: &str,
        phone: &str,
        join_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            match conn.execute(
                "INSERT INTO users
                     (username, password, first_name, last_name, phone, join_at, last_login_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![username, password_hash, first_name, last_name, phone, join_at],
            ) {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::DuplicateUsername(username.to_owned()))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user(&self, username: &str) -> Result<User, StoreError> {
        self.with_conn(|conn| query_user(conn, username).map(UserRow::into_user))
    }

    /// Stored password hash for authentication. Never exposed past the
    /// credential store.
    pub fn get_user_credentials(&self, username: &str) -> Result<String, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT password FROM users WHERE username = ?1",
                [username],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::UnknownUser(username.to_owned()))
        })
    }

    pub fn update_login_timestamp(
        &self,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, StoreError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET last_login_at = ?1 WHERE username = ?2",
                params![now, username],
            )?;
            if changed == 0 {
                return Err(StoreError::UnknownUser(username.to_owned()));
            }
            Ok(now)
        })
    }

    pub fn list_users(&self) -> Result<Vec<Contact>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT username, first_name, last_name, phone FROM users")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(Contact {
                        username: row.get(0)?,
                        first_name: row.get(1)?,
                        last_name: row.get(2)?,
                        phone: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Messages sent by `username`, most recent first, with the recipient's
    /// identity embedded. An existing user with no messages yields an empty
    /// Vec; only an unknown user is an error.
    pub fn messages_from(&self, username: &str) -> Result<Vec<SentMessage>, StoreError> {
        self.with_conn(|conn| {
            ensure_user_exists(conn, username)?;
            let mut stmt = conn.prepare(
                "SELECT m.id, u.username, u.first_name, u.last_name, u.phone,
                        m.body, m.sent_at, m.read_at
                 FROM messages m
                 JOIN users u ON m.to_username = u.username
                 WHERE m.from_username = ?1
                 ORDER BY m.sent_at DESC",
            )?;
            let rows = stmt
                .query_map([username], |row| {
                    Ok(SentMessage {
                        id: column_uuid(row, 0)?,
                        to_user: Contact {
                            username: row.get(1)?,
                            first_name: row.get(2)?,
                            last_name: row.get(3)?,
                            phone: row.get(4)?,
                        },
                        body: row.get(5)?,
                        sent_at: row.get(6)?,
                        read_at: row.get(7)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Messages received by `username`, most recent first, with the
    /// sender's identity embedded.
    pub fn messages_to(&self, username: &str) -> Result<Vec<ReceivedMessage>, StoreError> {
        self.with_conn(|conn| {
            ensure_user_exists(conn, username)?;
            let mut stmt = conn.prepare(
                "SELECT m.id, u.username, u.first_name, u.last_name, u.phone,
                        m.body, m.sent_at, m.read_at
                 FROM messages m
                 JOIN users u ON m.from_username = u.username
                 WHERE m.to_username = ?1
                 ORDER BY m.sent_at DESC",
            )?;
            let rows = stmt
                .query_map([username], |row| {
                    Ok(ReceivedMessage {
                        id: column_uuid(row, 0)?,
                        from_user: Contact {
                            username: row.get(1)?,
                            first_name: row.get(2)?,
                            last_name: row.get(3)?,
                            phone: row.get(4)?,
                        },
                        body: row.get(5)?,
                        sent_at: row.get(6)?,
                        read_at: row.get(7)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Both parties are verified inside the insert transaction; the FK
    /// constraints on `messages` are the backstop, so a dangling reference
    /// can never be created.
    pub fn create_message(
        &self,
        id: Uuid,
        from_username: &str,
        to_username: &str,
        body: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for username in [from_username, to_username] {
                ensure_user_exists(&tx, username)?;
            }
            tx.execute(
                "INSERT INTO messages (id, from_username, to_username, body, sent_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id.to_string(), from_username, to_username, body, sent_at],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: Uuid) -> Result<Message, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.body, m.sent_at, m.read_at,
                        f.username, f.first_name, f.last_name, f.phone,
                        t.username, t.first_name, t.last_name, t.phone
                 FROM messages m
                 JOIN users f ON m.from_username = f.username
                 JOIN users t ON m.to_username = t.username
                 WHERE m.id = ?1",
            )?;
            stmt.query_row([id.to_string()], |row| {
                Ok(Message {
                    id: column_uuid(row, 0)?,
                    body: row.get(1)?,
                    sent_at: row.get(2)?,
                    read_at: row.get(3)?,
                    from_user: Contact {
                        username: row.get(4)?,
                        first_name: row.get(5)?,
                        last_name: row.get(6)?,
                        phone: row.get(7)?,
                    },
                    to_user: Contact {
                        username: row.get(8)?,
                        first_name: row.get(9)?,
                        last_name: row.get(10)?,
                        phone: row.get(11)?,
                    },
                })
            })
            .optional()?
            .ok_or(StoreError::UnknownMessage(id))
        })
    }

    /// One-time `Unread -> Read` transition. The guard on `read_at IS NULL`
    /// makes concurrent marks serialize: exactly one caller sets the
    /// timestamp, every later caller gets `AlreadyRead`.
    pub fn mark_read(&self, id: Uuid, now: DateTime<Utc>) -> Result<DateTime<Utc>, StoreError> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE messages SET read_at = ?1 WHERE id = ?2 AND read_at IS NULL",
                params![now, id.to_string()],
            )?;
            if changed == 0 {
                let exists: Option<i64> = tx
                    .query_row(
                        "SELECT 1 FROM messages WHERE id = ?1",
                        [id.to_string()],
                        |row| row.get(0),
                    )
                    .optional()?;
                return Err(match exists {
                    Some(_) => StoreError::AlreadyRead(id),
                    None => StoreError::UnknownMessage(id),
                });
            }
            tx.commit()?;
            Ok(now)
        })
    }
}

fn query_user(conn: &Connection, username: &str) -> Result<UserRow, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT username, password, first_name, last_name, phone, join_at, last_login_at
         FROM users WHERE username = ?1",
    )?;
    stmt.query_row([username], |row| {
        Ok(UserRow {
            username: row.get(0)?,
            password: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            phone: row.get(4)?,
            join_at: row.get(5)?,
            last_login_at: row.get(6)?,
        })
    })
    .optional()?
    .ok_or_else(|| StoreError::UnknownUser(username.to_owned()))
}

fn ensure_user_exists(conn: &Connection, username: &str) -> Result<(), StoreError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM users WHERE username = ?1",
            [username],
            |row| row.get(0),
        )
        .optional()?;
    match found {
        Some(_) => Ok(()),
        None => Err(StoreError::UnknownUser(username.to_owned())),
    }
}

/// Message ids are stored as TEXT; surface a corrupt id as a conversion
/// failure instead of panicking.
fn column_uuid(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: uuid::Error| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn seed_user(db: &Database, username: &str) {
        db.create_user(
            username,
            "$argon2id$stub",
            "Test",
            "User",
            "+15550000000",
            Utc::now(),
        )
        .unwrap();
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn duplicate_username_fails_distinguishably() {
        let db = db();
        seed_user(&db, "alice");
        let err = db
            .create_user("alice", "hash2", "A", "B", "+1555", Utc::now())
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUsername(u) if u == "alice"));
    }

    #[test]
    fn get_user_round_trips_fields() {
        let db = db();
        let joined = at(0);
        db.create_user("alice", "hash", "Alice", "Ames", "+15551234567", joined)
            .unwrap();

        let user = db.get_user("alice").unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.first_name, "Alice");
        assert_eq!(user.join_at, joined);
        // Registration counts as the first login.
        assert_eq!(user.last_login_at, Some(joined));
    }

    #[test]
    fn unknown_user_is_not_found() {
        let db = db();
        assert!(matches!(
            db.get_user("ghost").unwrap_err(),
            StoreError::UnknownUser(_)
        ));
        assert!(matches!(
            db.get_user_credentials("ghost").unwrap_err(),
            StoreError::UnknownUser(_)
        ));
        assert!(matches!(
            db.update_login_timestamp("ghost", Utc::now()).unwrap_err(),
            StoreError::UnknownUser(_)
        ));
    }

    #[test]
    fn login_timestamp_is_recorded() {
        let db = db();
        seed_user(&db, "alice");
        let now = at(60);
        db.update_login_timestamp("alice", now).unwrap();
        assert_eq!(db.get_user("alice").unwrap().last_login_at, Some(now));
    }

    #[test]
    fn list_users_returns_every_contact() {
        let db = db();
        seed_user(&db, "alice");
        seed_user(&db, "bob");
        let mut usernames: Vec<String> = db
            .list_users()
            .unwrap()
            .into_iter()
            .map(|c| c.username)
            .collect();
        usernames.sort();
        assert_eq!(usernames, ["alice", "bob"]);
    }

    #[test]
    fn message_to_unknown_party_is_rejected() {
        let db = db();
        seed_user(&db, "alice");
        let err = db
            .create_message(Uuid::new_v4(), "alice", "ghost", "hi", at(0))
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownUser(u) if u == "ghost"));
    }

    #[test]
    fn new_message_starts_unread() {
        let db = db();
        seed_user(&db, "alice");
        seed_user(&db, "bob");
        let id = Uuid::new_v4();
        db.create_message(id, "alice", "bob", "hello", at(0)).unwrap();

        let msg = db.get_message(id).unwrap();
        assert_eq!(msg.from_user.username, "alice");
        assert_eq!(msg.to_user.username, "bob");
        assert_eq!(msg.body, "hello");
        assert!(msg.read_at.is_none());
    }

    #[test]
    fn mark_read_is_a_one_time_transition() {
        let db = db();
        seed_user(&db, "alice");
        seed_user(&db, "bob");
        let id = Uuid::new_v4();
        db.create_message(id, "alice", "bob", "hello", at(0)).unwrap();

        let first = at(10);
        assert_eq!(db.mark_read(id, first).unwrap(), first);
        assert_eq!(db.get_message(id).unwrap().read_at, Some(first));

        // Second mark is an error and leaves the original timestamp intact.
        assert!(matches!(
            db.mark_read(id, at(20)).unwrap_err(),
            StoreError::AlreadyRead(_)
        ));
        assert_eq!(db.get_message(id).unwrap().read_at, Some(first));
    }

    #[test]
    fn mark_read_on_missing_message_is_not_found() {
        let db = db();
        assert!(matches!(
            db.mark_read(Uuid::new_v4(), Utc::now()).unwrap_err(),
            StoreError::UnknownMessage(_)
        ));
    }

    #[test]
    fn outbox_is_ordered_most_recent_first() {
        let db = db();
        for name in ["alice", "bob", "carol", "dave"] {
            seed_user(&db, name);
        }
        db.create_message(Uuid::new_v4(), "alice", "bob", "first", at(1))
            .unwrap();
        db.create_message(Uuid::new_v4(), "alice", "carol", "second", at(2))
            .unwrap();
        db.create_message(Uuid::new_v4(), "alice", "dave", "third", at(3))
            .unwrap();

        let sent = db.messages_from("alice").unwrap();
        let bodies: Vec<&str> = sent.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["third", "second", "first"]);
        assert_eq!(sent[0].to_user.username, "dave");
    }

    #[test]
    fn inbox_embeds_the_sender() {
        let db = db();
        seed_user(&db, "alice");
        seed_user(&db, "bob");
        db.create_message(Uuid::new_v4(), "alice", "bob", "hello", at(0))
            .unwrap();

        let received = db.messages_to("bob").unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].from_user.username, "alice");
    }

    #[test]
    fn zero_messages_is_empty_not_missing() {
        let db = db();
        seed_user(&db, "alice");
        // An existing user with no traffic must not look like an unknown user.
        assert!(db.messages_from("alice").unwrap().is_empty());
        assert!(db.messages_to("alice").unwrap().is_empty());

        assert!(matches!(
            db.messages_from("ghost").unwrap_err(),
            StoreError::UnknownUser(_)
        ));
        assert!(matches!(
            db.messages_to("ghost").unwrap_err(),
            StoreError::UnknownUser(_)
        ));
    }

    #[test]
    fn racing_registrations_admit_exactly_one() {
        let db = Arc::new(db());
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let db = Arc::clone(&db);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    db.create_user(
                        "alice",
                        &format!("hash-{i}"),
                        "Alice",
                        "Ames",
                        "+15551234567",
                        Utc::now(),
                    )
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(
            |r| matches!(r, Err(StoreError::DuplicateUsername(u)) if u == "alice")
        ));
    }

    #[test]
    fn racing_marks_admit_exactly_one() {
        let db = Arc::new(db());
        seed_user(&db, "alice");
        seed_user(&db, "bob");
        let id = Uuid::new_v4();
        db.create_message(id, "alice", "bob", "hello", at(0)).unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|i| {
                let db = Arc::clone(&db);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    db.mark_read(id, at(10 + i64::from(i)))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(StoreError::AlreadyRead(m)) if *m == id)));

        // The stored timestamp is the winner's, untouched by the loser.
        assert_eq!(db.get_message(id).unwrap().read_at, Some(*winners[0]));
    }
}
