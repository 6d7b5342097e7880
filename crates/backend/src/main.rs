use axum::{
    extract::FromRef,
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod auth;
mod config;
mod context;
mod db;
pub mod error;
mod google;
mod handlers;
mod models;
mod realtime;
mod schema;
mod summarize;
mod sync;

use config::AppConfig;
use context::DbContextSource;
use db::DbPool;
use auth::OAuthStates;
use realtime::{ConnectionRegistry, ContextPoller, Notifier};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub notifier: Notifier,
    pub config: Arc<AppConfig>,
    pub http: reqwest::Client,
    pub oauth_states: OAuthStates,
}

impl FromRef<AppState> for Notifier {
    fn from_ref(state: &AppState) -> Self {
        state.notifier.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inbox_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Arc::new(AppConfig::from_env()?);

    // Connections are opened lazily, so a bad database only shows up on first use
    let pool = db::establish_connection_pool(&config.database_url)?;

    let notifier = Notifier::new(
        ConnectionRegistry::new(),
        Arc::new(DbContextSource::new(pool.clone())),
    );

    let state = AppState {
        pool,
        notifier: notifier.clone(),
        config: config.clone(),
        http: reqwest::Client::new(),
        oauth_states: OAuthStates::new(),
    };

    let shutdown = CancellationToken::new();

    let poller = ContextPoller::new(notifier, config.mcp_poll_interval).spawn(shutdown.child_token());

    let sync_task = match (config.sync_poll_interval, &config.google) {
        (Some(interval), Some(_)) => Some(tokio::spawn(sync::start_sync_task(
            state.clone(),
            interval,
            shutdown.child_token(),
        ))),
        (Some(_), None) => {
            tracing::warn!("Google OAuth not configured, background sync disabled");
            None
        }
        (None, _) => {
            tracing::info!("Background sync disabled (SYNC_POLL_INTERVAL_SECS=0)");
            None
        }
    };

    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        }
        signal.cancel();
    });

    let serve_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { serve_token.cancelled().await })
        .await?;

    shutdown.cancel();
    if let Err(e) = poller.await {
        tracing::error!("Context poller panicked: {}", e);
    }
    if let Some(task) = sync_task {
        if let Err(e) = task.await {
            tracing::error!("Sync task panicked: {}", e);
        }
    }

    Ok(())
}

fn create_app(state: AppState) -> Router {
    let cors = build_cors_layer(state.config.cors_allowed_origins.as_deref());

    Router::new()
        .route("/health", get(handlers::health))
        // Google OAuth
        .route("/auth/start", get(auth::auth_start))
        .route("/auth/callback", get(auth::auth_callback))
        // Inbox items
        .route("/api/messages", get(handlers::list_messages))
        .route("/api/messages", post(handlers::create_message))
        .route(
            "/api/messages/:id/summarize",
            post(handlers::summarize_message),
        )
        .route("/api/messages/:id/calendar", post(handlers::add_to_calendar))
        .route("/api/context", get(handlers::get_context))
        .route("/api/sync", post(handlers::trigger_sync))
        // WebSocket push and manual refresh
        .merge(realtime::routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Build CORS layer from the configured origin list.
///
/// Without a list, CORS is permissive (for development only).
fn build_cors_layer(allowed_origins: Option<&str>) -> CorsLayer {
    match allowed_origins {
        Some(origins) => {
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();

            if origins.is_empty() {
                tracing::warn!(
                    "CORS_ALLOWED_ORIGINS is set but empty, using permissive CORS (not recommended for production)"
                );
                CorsLayer::permissive()
            } else {
                tracing::info!("CORS configured for origins: {:?}", origins);
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => {
            tracing::warn!(
                "CORS_ALLOWED_ORIGINS not set, using permissive CORS (not recommended for production)"
            );
            CorsLayer::permissive()
        }
    }
}
