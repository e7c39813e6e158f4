pub mod auth;
pub mod credentials;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod policy;
pub mod tokens;
pub mod users;
