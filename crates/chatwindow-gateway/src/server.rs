//! Gateway server: shared state, routes, and startup

use crate::chat::chat_handler;
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chatwindow_core::ChatConfig;
use chatwindow_llm::{CompletionProvider, OpenAiProvider};
use chatwindow_window::{EncoderPool, EncodingKind, SelectorConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub struct AppState {
    pub config: ChatConfig,
    pub selector: SelectorConfig,
    pub encoders: EncoderPool,
    pub provider: Arc<dyn CompletionProvider>,
}

impl AppState {
    pub fn new(
        config: ChatConfig,
        encoders: EncoderPool,
        provider: Arc<dyn CompletionProvider>,
    ) -> Self {
        let selector = SelectorConfig::from(&config.window);
        Self {
            config,
            selector,
            encoders,
            provider,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn start_gateway(config: ChatConfig) -> anyhow::Result<()> {
    let encoding: EncodingKind = config.window.encoding.parse()?;

    let provider = OpenAiProvider::new(config.api_host())
        .with_fallback_key(config.upstream.api_key.clone())
        .with_organization(config.upstream.organization.clone());

    let bind_addr: SocketAddr =
        format!("{}:{}", config.gateway.bind.to_addr(), config.gateway.port).parse()?;

    info!("Chatwindow Gateway v{} starting", env!("CARGO_PKG_VERSION"));
    info!("  Listening on: {}", bind_addr);
    info!("  Chat:      http://{}/api/chat", bind_addr);
    info!("  Upstream:  {}", provider.endpoint());
    info!("  Encoding:  {}", encoding);
    info!(
        "  Window:    reserved={} chunk={} strategy={:?} on_exhausted={:?}",
        config.window.reserved_reply_tokens,
        config.window.trim_chunk_chars,
        config.window.strategy,
        config.window.on_exhausted
    );
    if config.upstream.api_key.is_none() {
        warn!("  No fallback API key; requests must carry their own");
    }

    let state = Arc::new(AppState::new(
        config,
        EncoderPool::tiktoken(encoding),
        Arc::new(provider),
    ));

    // Load the encoder tables in the background so the first request
    // does not pay for it. A failure here is retried per request.
    let warm = Arc::clone(&state);
    tokio::spawn(async move {
        match warm.encoders.acquire().await {
            Ok(lease) => {
                lease.release();
                info!("Encoder {} loaded", warm.encoders.label());
            }
            Err(e) => warn!("Encoder preload failed: {}", e),
        }
    });

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "provider": state.provider.name(),
        "encoding": state.encoders.label(),
        "encoder_loaded": state.encoders.is_loaded(),
        "tokenizer_leases": state.encoders.outstanding(),
    }))
}
