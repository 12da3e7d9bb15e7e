//! Application entry point and server initialization
//!
//! This module contains the main function that:
//! - Loads environment configuration
//! - Initializes the database and seeds the admin session
//! - Starts the rate-limit cleanup task
//! - Starts the HTTP server with graceful shutdown support

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use portfolio::auth::{insert_session, SessionRecord, SessionResolver};
use portfolio::config::Config;
use portfolio::database::{init_db, AppState};
use portfolio::model::AdminUser;
use portfolio::rate_limit::InMemoryRateLimiter;
use portfolio::route::create_app;

const DEFAULT_LOG_FILTER: &str = "portfolio=debug,tower_http=debug";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load environment variables from .env file if it exists
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = Config::from_env()?;

    let db = Arc::new(init_db(&config.database_url)?);

    if let Some(token) = &config.admin_token {
        let admin = AdminUser {
            id: "admin".to_string(),
            email: config.admin_email.clone(),
            display_name: None,
            is_active: true,
        };
        insert_session(&db, token, &SessionRecord::new(admin, None))?;
        tracing::info!(email = %config.admin_email, "seeded admin session from ADMIN_TOKEN");
    }

    let limiter = Arc::new(InMemoryRateLimiter::new(
        config.rate_limit_max_requests,
        config.rate_limit_window,
    ));
    tokio::spawn(cleanup_rate_limits(limiter.clone()));

    let state = AppState::with_parts(
        db.clone(),
        limiter,
        Arc::new(SessionResolver::new(db)),
    );

    let app = create_app(state).layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!(
        port = config.port,
        database = %config.database_url,
        rate_limit = config.rate_limit_max_requests,
        window_secs = config.rate_limit_window.num_seconds(),
        "server running"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Drops expired rate-limit records once per window so the map only holds
/// clients seen recently.
async fn cleanup_rate_limits(limiter: Arc<InMemoryRateLimiter>) {
    let period = limiter
        .window()
        .to_std()
        .unwrap_or(Duration::from_secs(60));
    let mut interval = tokio::time::interval(period);

    loop {
        interval.tick().await;
        let removed = limiter.cleanup(Utc::now());
        if removed > 0 {
            tracing::debug!(removed, tracked = limiter.len(), "expired rate-limit records dropped");
        }
    }
}

/// Resolves when SIGINT (Ctrl+C) or, on Unix, SIGTERM is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, stopping server");
}
