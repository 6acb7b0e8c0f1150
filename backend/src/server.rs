use crate::api::{self, AppState};
use crate::database::{self, Settings};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

pub async fn serve(settings: Settings, addr: SocketAddr) -> anyhow::Result<()> {
    let slot = Arc::new(database::service_slot(settings));
    // Fail at startup on an unreadable database instead of on the first request.
    slot.get().await?;

    let app = api::create_routes(AppState { slot }).layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "backend listening");
    axum::serve(listener, app).await?;
    Ok(())
}
