mod configuration;
mod error;
mod routes;
mod state;

use std::sync::Arc;

use brandlens::gateway::LlmGateway;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let settings = configuration::Settings::new()?;
    let addr = settings.server.socket_addr();
    info!(
        user_query_secs = settings.timeouts.user_query_secs,
        server_query_secs = settings.timeouts.server_query_secs,
        data_processing_secs = settings.timeouts.data_processing_secs,
        interrupt_secs = settings.timeouts.interrupt_secs,
        "declared processing timeouts (not currently enforced)"
    );

    let gateway = LlmGateway::new(settings.gateway.gateway_config())?;
    let state = AppState {
        llm: Arc::new(gateway),
        settings: Arc::new(settings),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::configure(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
