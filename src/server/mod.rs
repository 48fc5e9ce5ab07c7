pub mod handlers;
pub mod types;

pub use handlers::{AppState, SummarizeState, SummaryLimits};

use crate::{
    Result,
    config::Config,
    model::{BertQuestionAnswerer, ModelStore, T5Summarizer},
};
use axum::{
    Router,
    routing::{get, post},
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Builds the HTTP routes. Model endpoints are only mounted for models that are loaded.
pub fn router(state: AppState) -> Router {
    let mut app: Router = Router::new()
        .route("/health", get(handlers::health))
        .with_state(state.clone());

    if let Some(qa) = state.qa {
        let answer: Router = Router::new()
            .route("/answer", post(handlers::answer))
            .with_state(qa);
        app = app.merge(answer);
    }
    if let Some(summarizer) = state.summarizer {
        let summarize: Router = Router::new()
            .route("/summarize", post(handlers::summarize))
            .with_state(SummarizeState {
                summarizer,
                limits: state.limits,
            });
        app = app.merge(summarize);
    }

    app.layer(TraceLayer::new_for_http())
}

/// Loads every configured model. Nothing is served until this succeeds.
pub async fn load_models(config: &Config) -> Result<AppState> {
    let store = ModelStore::new(&config.cache_dir).with_token(std::env::var("HF_TOKEN").ok());
    let mut state = AppState::new();

    if let Some(qa_config) = &config.qa {
        let qa = BertQuestionAnswerer::load(&store, qa_config)
            .await
            .inspect_err(|e| {
                error!(
                    "Error loading QA model ({}): {}",
                    qa_config.source.model_id, e
                )
            })?;
        state = state.with_qa(Arc::new(qa));
    }

    if let Some(summarization) = &config.summarization {
        let summarizer = T5Summarizer::load(&store, summarization)
            .await
            .inspect_err(|e| {
                error!(
                    "Error loading summarization model ({}): {}",
                    summarization.source.model_id, e
                )
            })?;
        state = state
            .with_summarizer(Arc::new(summarizer))
            .with_limits(SummaryLimits {
                default_max_length: summarization.default_max_length,
                default_min_length: summarization.default_min_length,
                max_output_len: summarization.max_output_len,
            });
    }

    Ok(state)
}

pub async fn run(config: Config) -> Result<()> {
    let state = load_models(&config).await?;
    let app = router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    // Container runtimes stop processes with SIGTERM.
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
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
    info!("Shutdown signal received");
}
