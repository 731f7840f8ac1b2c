//! Authentication service.
//!
//! Serves the signup, signin, password reset and session endpoints on top of
//! PostgreSQL (or an in-memory store for local runs).

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Error};
use pico_args::Arguments;
use saas_auth::{
    SessionManager,
    auth::Repositories,
    db::{Database, InMemoryStore},
    email::{EmailSender, LogEmailSender, SmtpEmailSender},
};
use sa_server::{
    api::{self, social::OAuthProvider},
    config::{CliOverrides, ServerConfig, StorageConfig},
    logging, metrics,
};
use tracing::info;

const HELP: &str = "\
Run the authentication service

USAGE:
  sa_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  --in-memory              Keep everything in memory instead of PostgreSQL
  -h, --help               Print help information

ENVIRONMENT:
  APP_MODE                       production | development | test
  DATABASE_URL                   PostgreSQL connection string
  JWT_ACCESS_TOKEN_SECRET        Access token signing secret (32+ chars)
  JWT_NOTIFICATION_TOKEN_SECRET  Notification token signing secret (32+ chars)
  PASSWORD_PEPPER                Password hashing pepper (16+ chars)
  SMTP_HOST                      Outgoing mail relay; mail is logged when unset
  METRICS_BIND                   Prometheus listener (e.g., 127.0.0.1:9090)
  (See .env.example for all configuration options)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let overrides = CliOverrides {
        in_memory: pargs.contains("--in-memory"),
        bind: pargs
            .opt_value_from_str::<_, SocketAddr>("--bind")
            .context("Invalid --bind address")?,
        database_url: pargs
            .opt_value_from_str("--db-url")
            .context("Invalid --db-url")?,
    };

    logging::init();

    let config = ServerConfig::from_env(overrides)?;
    info!(
        "Starting authentication service at {} ({:?} mode)",
        config.bind, config.auth.mode
    );

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(anyhow::Error::msg)?;
        info!("Prometheus metrics listening on {}", addr);
    }

    let (repos, database): (Repositories, Option<Database>) = match &config.storage {
        StorageConfig::Postgres(db_config) => {
            let db = Database::new(db_config)
                .await
                .context("Failed to connect to database")?;
            db.migrate().await.context("Failed to run migrations")?;
            info!("Database connected and migrated");
            (db.repositories(), Some(db))
        }
        StorageConfig::InMemory => {
            tracing::warn!("Using the in-memory store; nothing survives a restart");
            (Arc::new(InMemoryStore::seeded()).repositories(), None)
        }
    };

    let mailer: Arc<dyn EmailSender> = match &config.smtp {
        Some(smtp) => {
            info!("Sending mail through {}:{}", smtp.host, smtp.port);
            Arc::new(SmtpEmailSender::new(smtp).context("Failed to set up SMTP transport")?)
        }
        None => {
            info!("SMTP_HOST not set, outgoing mail will only be logged");
            Arc::new(LogEmailSender)
        }
    };

    let sessions = SessionManager::new(config.auth.clone(), config.secrets.clone(), repos, mailer);

    let mut state = api::AppState::new(sessions);
    for client in &config.social {
        let provider = OAuthProvider::new(client.clone())
            .with_context(|| format!("Failed to set up {} sign-in", client.provider))?;
        info!("Social sign-in enabled for {}", client.provider);
        state = state.with_provider(Arc::new(provider));
    }

    if config.cleanup_interval_secs > 0 {
        spawn_cleanup(
            state.sessions.clone(),
            Duration::from_secs(config.cleanup_interval_secs),
        );
    }

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down server...");
    if let Some(db) = database {
        db.close().await;
    }

    Ok(())
}

/// Periodically purge expired codes and tokens.
fn spawn_cleanup(sessions: Arc<SessionManager>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match sessions.cleanup_expired().await {
                Ok(report) => metrics::cleanup_purged(report.verification_codes + report.tokens),
                Err(e) => tracing::error!(error = %e, "Expired token cleanup failed"),
            }
        }
    });
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for CTRL+C, shutting down");
    }
}
