use anyhow::Context;
use atlas_score_api::artifact::ModelArtifact;
use atlas_score_api::config::Config;
use atlas_score_api::handlers::{self, AppState};
use atlas_score_api::simulation::SimulationEngine;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "atlas_score_api=debug,tower_http=debug";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Reads both artifact files named by the configuration.
fn load_artifact(config: &Config) -> anyhow::Result<ModelArtifact> {
    ModelArtifact::load_with_checksum(
        &config.model_path,
        &config.model_columns_path,
        config.model_sha256.as_deref(),
    )
    .with_context(|| {
        format!(
            "Failed to load model artifact from {} and {}",
            config.model_path.display(),
            config.model_columns_path.display()
        )
    })
}

/// Wraps the API routes in body-size and per-IP rate limits.
fn build_app(config: &Config, state: Arc<AppState>) -> anyhow::Result<Router> {
    let rate_limit = GovernorConfigBuilder::default()
        .per_second(config.rate_limit_per_second)
        .burst_size(config.rate_limit_burst)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .context("Invalid rate limiter configuration")?;

    let limits = ServiceBuilder::new()
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(GovernorLayer {
            config: Arc::new(rate_limit),
        });

    Ok(handlers::router(state)
        .layer(limits)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()))
}

/// Starts the scoring service.
///
/// The artifact is loaded before the listener is bound; if it cannot be
/// loaded the process exits with an error instead of serving.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded (port {})", config.port);

    let artifact = Arc::new(load_artifact(&config)?);
    let state = Arc::new(AppState::new(SimulationEngine::from_artifact(artifact)));
    let app = build_app(&config, state)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("ATLAS scoring API listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
