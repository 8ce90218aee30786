use taskpilot_common::{Error, Result};
use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::SharedState;

/// Owns the listening socket and serves the router until shutdown.
pub struct GatewayServer {
    state: SharedState,
}

impl GatewayServer {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    pub async fn run(self) -> Result<()> {
        let addr = format!(
            "{}:{}",
            self.state.config.gateway.host, self.state.config.gateway.port
        );
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind {addr}: {e}")))?;

        info!("gateway listening on {addr}");

        let app = build_router(self.state);
        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Config(format!("server error: {e}")))?;

        Ok(())
    }
}
