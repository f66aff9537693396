pub mod auth;
pub mod config;
pub mod core;
pub mod errors;
pub mod handlers;
pub mod keys;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod usage;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::ServerConfig;
pub use core::*;
pub use errors::{GatewayError, GatewayResult};
pub use state::AppState;
