//! HTTP and WebSocket API for convo

pub mod error;
pub mod handlers;
pub mod server;
pub mod state;
pub mod ws;

pub use error::ApiError;
pub use server::{build_router, run_server, shutdown_signal};
pub use state::AppState;
