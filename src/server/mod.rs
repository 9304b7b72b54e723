pub mod handlers;

pub use handlers::{create_router, AppState, DEFAULT_MAX_UPLOAD_BYTES};

use crate::utils::NidError;
use log::info;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Bind and serve the HTTP API until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), NidError> {
    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;
    info!("NID Parser API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
