pub mod config;
pub mod core;
pub mod errors;
pub mod gateway;
pub mod handlers;
pub mod pipeline;
pub mod routes;
pub mod session;
pub mod shutdown;
pub mod state;

// Re-export commonly used items for convenience
pub use config::ServerConfig;
pub use errors::app_error::{AppError, AppResult};
pub use gateway::{GatewayError, RuntimeConfigGateway};
pub use shutdown::{ShutdownCoordinator, ShutdownReport};
pub use state::AppState;
