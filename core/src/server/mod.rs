//! Rendezvous server: static UI, health check and the `/ws` control channel
//! where clients are matched and handshake payloads are relayed.

pub mod connection;
pub mod generation;
pub mod hub;
pub mod matcher;

use std::{future::Future, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::services::{ServeDir, ServeFile};

use self::{
    generation::{DisabledGenerator, GeminiConfig, GeminiGenerator, Generator},
    hub::HubHandle,
};
use crate::protocol::{HEALTH_BODY, HEALTH_PATH, MAX_ENVELOPE_BYTES, SIGNAL_PATH};

pub struct ServerConfig {
    pub bind: SocketAddr,
    pub static_dir: Option<PathBuf>,
    pub gemini: Option<GeminiConfig>,
}

#[derive(Clone)]
struct AppState {
    hub: HubHandle,
    generator: Arc<dyn Generator>,
}

/// Build the HTTP surface. A static directory, when given, is served as a
/// fallback with `index.html` standing in for unknown paths.
pub fn router(hub: HubHandle, generator: Arc<dyn Generator>, static_dir: Option<PathBuf>) -> Router {
    let app = Router::new()
        .route(HEALTH_PATH, get(health))
        .route(SIGNAL_PATH, get(ws_upgrade))
        .with_state(AppState { hub, generator });

    match static_dir {
        Some(dir) => match dir.is_dir() {
            true => {
                tracing::info!(dir = %dir.display(), "serving static assets");
                let index = ServeFile::new(dir.join("index.html"));
                app.fallback_service(ServeDir::new(dir).fallback(index))
            }
            false => {
                tracing::warn!(dir = %dir.display(), "static directory missing, not serving assets");
                app
            }
        },
        None => app,
    }
}

pub fn generator_from(gemini: Option<GeminiConfig>) -> Result<Arc<dyn Generator>> {
    match gemini {
        Some(config) => {
            tracing::info!(model = %config.model, "text generation enabled");
            let generator = GeminiGenerator::new(config).context("failed to build generation client")?;
            Ok(Arc::new(generator))
        }
        None => {
            tracing::info!("no API key configured, translation and icebreakers disabled");
            Ok(Arc::new(DisabledGenerator))
        }
    }
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    generator: Arc<dyn Generator>,
    static_dir: Option<PathBuf>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let (hub, hub_task) = hub::spawn();
    let app = router(hub, generator, static_dir);

    let local = listener.local_addr().context("listener has no local address")?;
    tracing::info!(%local, path = SIGNAL_PATH, "signaling server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")?;

    hub_task.abort();
    tracing::info!("signaling server stopped");
    Ok(())
}

pub async fn run(config: ServerConfig, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
    let generator = generator_from(config.gemini)?;
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    serve(listener, generator, config.static_dir, shutdown).await
}

async fn health() -> &'static str {
    HEALTH_BODY
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.max_message_size(MAX_ENVELOPE_BYTES)
        .on_upgrade(move |socket| connection::serve_socket(socket, state.hub, state.generator))
}
