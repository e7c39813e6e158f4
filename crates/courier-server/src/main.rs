use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use courier_api::auth::{self, AppState, AppStateInner};
use courier_api::credentials::CredentialStore;
use courier_api::messages;
use courier_api::middleware::require_auth;
use courier_api::tokens::TokenIssuer;
use courier_api::users;

/// Process configuration, read once at startup and immutable afterwards.
struct Config {
    host: String,
    port: u16,
    db_path: PathBuf,
    jwt_secret: String,
    hash_cost: u32,
}

impl Config {
    fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            host: std::env::var("COURIER_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("COURIER_PORT")
                .unwrap_or_else(|_| "3000".into())
                .parse()?,
            db_path: std::env::var("COURIER_DB_PATH")
                .unwrap_or_else(|_| "courier.db".into())
                .into(),
            jwt_secret: std::env::var("COURIER_JWT_SECRET")
                .unwrap_or_else(|_| "dev-secret-change-me".into()),
            hash_cost: std::env::var("COURIER_HASH_COST")
                .unwrap_or_else(|_| "2".into())
                .parse()?,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Shared state: storage, credential store, and token issuer are all
    // constructed here and injected, never read from ambient env later.
    let db = courier_db::Database::open(&config.db_path)?;
    let state: AppState = Arc::new(AppStateInner {
        db,
        credentials: CredentialStore::new(config.hash_cost)?,
        tokens: TokenIssuer::new(&config.jwt_secret),
    });

    // Routes
    let public_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/users", get(users::list_users))
        .route("/users/{username}", get(users::get_user))
        .route("/users/{username}/from", get(users::messages_from))
        .route("/users/{username}/to", get(users::messages_to))
        .route("/messages", post(messages::send_message))
        .route("/messages/{id}", get(messages::get_message))
        .route("/messages/{id}/read", post(messages::mark_read))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Courier server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
