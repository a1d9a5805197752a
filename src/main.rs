use cms_media_uploads::config::MediaConfig;
use cms_media_uploads::context::MediaContext;
use cms_media_uploads::infrastructure::storage;
use cms_media_uploads::services::lease_sweeper::LeaseSweeper;
use cms_media_uploads::services::upload_coordinator::{TracingUnloadGuard, UploadCoordinator};
use cms_media_uploads::{AppState, create_app};
use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use validator::Validate;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing with EnvFilter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cms_media_uploads=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting CMS media preview server...");

    let config = MediaConfig::from_env();
    config.validate()?;
    info!(
        "🛡️  Media Config: Backend={}, Max Size={}MB, Part Size={}MB",
        config.storage_backend.as_str(),
        config.max_file_size / 1024 / 1024,
        config.part_size / 1024 / 1024
    );

    let storage = storage::setup_storage(&config).await;
    let media = MediaContext::with_unload_guard(storage, &config, Arc::new(TracingUnloadGuard));
    let coordinator = media.coordinator.clone();
    let state = AppState::new(media, config.clone());

    // Background lease sweeper
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let sweeper = LeaseSweeper::new(
        state.clone(),
        Duration::from_secs(config.lease_ttl_secs),
        shutdown_rx,
    );
    let sweeper_task = tokio::spawn(sweeper.run());

    let app = create_app(state).layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            })
            .on_response(
                |response: &axum::http::Response<_>,
                 latency: std::time::Duration,
                 _span: &tracing::Span| {
                    info!(
                        "📤 Finished in {:?} with status {}",
                        latency,
                        response.status()
                    );
                },
            ),
    );

    info!("✅ Preview server ready at http://{}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(coordinator))
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = sweeper_task.await;
    info!("🛑 Server shut down gracefully.");
    Ok(())
}

/// Waits for a shutdown signal, then for in-flight uploads to settle.
async fn shutdown_signal(coordinator: UploadCoordinator) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }

    let activity = coordinator.snapshot();
    if activity.blocking {
        info!(
            "⏳ Waiting for {} upload(s) to finish before exiting",
            activity.active_jobs
        );
        coordinator.wait_idle().await;
    }
}
