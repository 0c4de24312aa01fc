use agora::{
    config::{self, app::app_config, rate_limit::RateLimitConfig, session::SessionConfig},
    migration,
    routes::create_app,
    services::{email::EmailService, session::SessionStore, upload::UploadConfig},
};
use axum::extract::Extension;
use sea_orm_migration::MigratorTrait;
use std::env;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    validate_config()?;
    tracing::info!("Starting Agora API v{}...", env!("CARGO_PKG_VERSION"));

    let db = config::database::get_database().await?;
    tracing::info!("Database connected successfully");

    migration::Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");

    let session_config = SessionConfig::from_env();
    let sessions = SessionStore::from_config(&session_config, db.clone()).await?;
    tracing::info!(
        "Session store ready ({:?}, ttl {}s)",
        session_config.backend,
        sessions.ttl_seconds()
    );

    let email_service = EmailService::from_env();
    if email_service.is_configured() {
        tracing::info!("SMTP email service configured");
    } else {
        tracing::warn!("SMTP not configured, password reset emails will be skipped");
    }

    let upload_dir = app_config().upload_dir.clone();
    let upload_config = UploadConfig {
        upload_dir: upload_dir.clone(),
    };

    let app = create_app(&upload_dir, &RateLimitConfig::from_env())?
        .layer(Extension(db))
        .layer(Extension(sessions))
        .layer(Extension(email_service))
        .layer(Extension(upload_config));

    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("{}:{}", host, port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "agora=debug,tower_http=debug,axum=info".into());
    let json = env::var("LOG_FORMAT").is_ok_and(|v| v.trim().eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Required configuration is checked before connecting anywhere.
fn validate_config() -> anyhow::Result<()> {
    if env::var("DATABASE_URL").is_err() {
        return Err(anyhow::anyhow!(
            "DATABASE_URL environment variable must be set"
        ));
    }

    let upload_dir = &app_config().upload_dir;
    std::fs::create_dir_all(upload_dir).map_err(|e| {
        anyhow::anyhow!("Failed to create upload directory '{}': {}", upload_dir, e)
    })?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, gracefully shutting down...");
}
