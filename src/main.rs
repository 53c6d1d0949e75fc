// define modules in crate
mod catalog;
mod config;
mod cqrs;
mod domain;
mod dtos;
mod engine;
mod errors;
mod repositories;
mod routes;
mod state;

use std::{error::Error, sync::Arc};

use axum::routing::get;
use axum_prometheus::PrometheusMetricLayer;
use config::{AppConfig, Storage};
use dotenv::dotenv;
use repositories::{InMemoryToyRepository, MongoDbToyRepository, ToyRepository};
use state::AppState;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{event, Level};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    let config = AppConfig::from_env()?;
    init_tracing(&config)?;

    let repository: Arc<dyn ToyRepository> = match &config.storage {
        Storage::MongoDb(info) => Arc::new(MongoDbToyRepository::new(info).await?),
        Storage::InMemory => {
            event!(Level::INFO, "Using in-memory toy storage");
            Arc::new(InMemoryToyRepository::new())
        }
    };

    // an unreachable cluster is reported but does not stop the server
    if let Err(e) = repository.ping().await {
        event!(Level::WARN, "Could not ping MongoDB deployment: {}", e);
    }

    let state = Arc::new(AppState::new(repository));

    let (prometheus_layer, metrics_handle) = PrometheusMetricLayer::pair();

    let app = routes::router(state, routes::cors_layer(&config.cors_origin)?)
        .route("/metrics", get(|| async move { metrics_handle.render() }))
        .layer(prometheus_layer)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    event!(Level::INFO, "Server is running on PORT: {}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    event!(Level::INFO, "Server stopped");
    Ok(())
}

fn init_tracing(config: &AppConfig) -> Result<(), std::io::Error> {
    let builder = tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_target(false)
        .with_ansi(false)
        .json()
        .with_file(true)
        .with_line_number(true)
        .with_current_span(true);

    match &config.log_path {
        Some(path) => builder.with_writer(std::fs::File::create(path)?).init(),
        None => builder.with_writer(std::io::stdout).init(),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            event!(Level::ERROR, "Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                event!(Level::ERROR, "Failed to listen for SIGTERM: {}", e);
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

    event!(Level::INFO, "Shutdown signal received");
}
