//! Database row types. Kept distinct from the courier-types API models
//! where a row carries fields that must not leave this layer.

use chrono::{DateTime, Utc};
use courier_types::models::User;

/// Full `users` row, including the stored password hash.
pub struct UserRow {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub join_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl UserRow {
    /// Strip the credential before the record crosses the API boundary.
    pub fn into_user(self) -> User {
        User {
            username: self.username,
            first_name: self.first_name,
            last_name: self.last_name,
            phone: self.phone,
            join_at: self.join_at,
            last_login_at: self.last_login_at,
        }
    }
}
