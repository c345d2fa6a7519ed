use std::net::SocketAddr;
use std::sync::Arc;

use gatewatch_core::Detector;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gatewatch_api::config::ServerConfig;
use gatewatch_api::router::build_app_router;
use gatewatch_api::state::AppState;
use gatewatch_pipeline::{EventWriter, JobManager, SourceFactory};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatewatch=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let pool = gatewatch_db::create_pool(&config.database_url)
        .await
        .expect("Failed to open database");
    gatewatch_db::init_schema(&pool)
        .await
        .expect("Failed to initialize database schema");
    gatewatch_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!(database_url = %config.database_url, "Database ready");

    // --- Media directories ---
    for dir in ["uploads", "outputs/videos", "outputs/images"] {
        tokio::fs::create_dir_all(config.pipeline.media_dir.join(dir))
            .await
            .expect("Failed to create media directory");
    }

    // --- Detector ---
    let detector = build_detector();

    // --- Job manager ---
    let store = EventWriter::new(pool.clone(), &config.pipeline.media_dir);
    let manager = JobManager::start(
        config.pipeline.clone(),
        Arc::clone(&detector),
        store,
        SourceFactory::Media,
    );
    tracing::info!("Job manager started");

    // --- App state + router ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        manager: Arc::clone(&manager),
        detector,
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown drain ---
    tracing::info!("Server stopped accepting connections, draining jobs");
    let graceful = manager.shutdown().await;
    if graceful {
        tracing::info!("Graceful shutdown complete");
        std::process::exit(0);
    } else {
        tracing::warn!("Some jobs did not terminate gracefully");
        std::process::exit(1);
    }
}

/// Construct the shared detector capability.
///
/// With the `onnx` feature and `MODEL_PATH` set, loads the ONNX model and
/// serializes inference (ONNX Runtime sessions are not reentrant here).
/// Otherwise falls back to a no-op detector so the service still serves
/// uploads, streams, and the control surface.
fn build_detector() -> Arc<dyn Detector> {
    #[cfg(feature = "onnx")]
    {
        if let Ok(model_path) = std::env::var("MODEL_PATH") {
            let detector = gatewatch_pipeline::detector::OnnxDetector::load(
                std::path::Path::new(&model_path),
                Default::default(),
            )
            .expect("Failed to load ONNX model");
            tracing::info!(model_path = %model_path, "ONNX detector loaded");
            return Arc::new(gatewatch_pipeline::SerialDetector::new(Box::new(detector)));
        }
        tracing::warn!("onnx feature enabled but MODEL_PATH is not set");
    }

    tracing::warn!("No detector backend configured; frames pass through undetected");
    Arc::new(gatewatch_pipeline::ScriptedDetector::default())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server shuts
/// down cleanly whether stopped interactively or by a process manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
