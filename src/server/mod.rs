//! Translation HTTP server.
//!
//! Provides an HTTP API over the model registry:
//! - `GET /` welcome message
//! - `POST /translate/` form fields `text`, `language`
//! - `GET /health`, `GET /languages`
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use indic_nmt::server::{create_router, AppState, ServerConfig};
//!
//! let config = ServerConfig::default().with_port(8000);
//! let state = Arc::new(AppState::new(config.clone(), registry));
//! let listener = tokio::net::TcpListener::bind(config.addr).await?;
//! axum::serve(listener, create_router(state)).await?;
//! ```

mod config;
mod handlers;
mod state;

pub use config::ServerConfig;
pub use handlers::{
    cors_layer, create_router, health_check, ApiError, ErrorResponse, TranslateFields, TranslateForm,
    TranslateResponse, WELCOME_MESSAGE,
};
pub use state::AppState;
