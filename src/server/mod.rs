// HTTP server - Axum router, bearer-token auth and shared state
// Every storage call leaves the async runtime through `AppState::with_db`.

pub mod routes;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    Router,
};
use rand::{thread_rng, Rng};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::ingest::{self, CommitGate};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(db: Database, config: ServerConfig) -> Self {
        AppState {
            db: Arc::new(Mutex::new(db)),
            config: Arc::new(config),
        }
    }

    /// Run `f` against the database on the blocking pool, bounded by the
    /// configured query timeout.
    pub async fn with_db<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.with_db_gated(move |db, _gate| f(db)).await
    }

    /// [`with_db`](Self::with_db) for writes. `f` gets a gate that is closed
    /// when the timeout fires, so a write still queued or in flight rolls back
    /// instead of committing after the caller was told it failed. A write that
    /// already entered the gate is awaited and its real outcome returned.
    pub async fn with_db_gated<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database, &CommitGate) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let gate = CommitGate::new();
        let task_gate = gate.clone();
        let mut task = tokio::task::spawn_blocking(move || {
            let db = db
                .lock()
                .map_err(|_| AppError::Unavailable("database lock poisoned".to_string()))?;
            f(&db, &task_gate)
        });

        match tokio::time::timeout(self.config.query_timeout, &mut task).await {
            Ok(joined) => flatten_join(joined),
            Err(_) if gate.close() => Err(AppError::Timeout),
            Err(_) => flatten_join(task.await),
        }
    }

    /// Run `f` as one gated write transaction
    pub async fn with_db_write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.with_db_gated(move |db, gate| ingest::gated_write(db, gate, f))
            .await
    }
}

fn flatten_join<T>(joined: std::result::Result<Result<T>, tokio::task::JoinError>) -> Result<T> {
    joined.unwrap_or_else(|e| Err(AppError::Unavailable(format!("database task failed: {}", e))))
}

/// Identity resolved from the bearer token, available to handlers as an extension
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

/// Generate a cryptographically random 256-bit token (64 hex chars)
pub fn generate_token() -> String {
    let mut rng = thread_rng();
    let bytes: Vec<u8> = (0..32).map(|_| rng.gen::<u8>()).collect();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Mint a new session token for an existing user
pub fn issue_token(db: &Database, user_id: &str) -> Result<String> {
    if db.get_user(user_id)?.is_none() {
        return Err(AppError::NotFound("User".to_string()));
    }
    let token = generate_token();
    db.create_session(user_id, &token)?;
    Ok(token)
}

/// Resolve a bearer token to the user it was issued for
pub fn resolve_token(db: &Database, token: &str) -> Result<Option<String>> {
    Ok(db.user_id_for_token(token)?)
}

fn bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Auth middleware - resolves the Bearer token to a user on every request
async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    // Public: liveness check
    if request.uri().path() == "/api/health" {
        return Ok(next.run(request).await);
    }

    let token = bearer_token(&request).ok_or(AppError::Unauthorized)?;
    let user_id = state
        .with_db(move |db| resolve_token(db, &token))
        .await?
        .ok_or(AppError::Unauthorized)?;

    request.extensions_mut().insert(AuthUser { user_id });
    Ok(next.run(request).await)
}

/// Build the full application router
pub fn build_router(state: AppState) -> Router {
    let mut cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
    match HeaderValue::from_str(&state.config.cors_origin) {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(_) => warn!(
            origin = %state.config.cors_origin,
            "ignoring invalid CORS origin, cross-origin requests will be refused"
        ),
    }

    Router::new()
        .merge(routes::api_routes())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the configured address and serve until Ctrl-C
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let addr = state.config.addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "server listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received, draining connections");
}
