pub mod api;
pub mod auth;
pub mod cache;
pub mod router;
pub mod server;
pub mod session;
pub mod state;

pub use server::GatewayServer;
pub use state::{AppState, SharedState};
