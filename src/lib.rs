//! # indic-nmt - Marian translation service
//!
//! HTTP service exposing pretrained Marian (OPUS-MT) translation models for a
//! fixed set of languages (Hindi, Arabic, Urdu and Tagalog by default).
//!
//! ## Architecture
//!
//! ```text
//! client ── POST /translate/ ──> server ──> translate_text ──> ModelRegistry
//!                                                                  │
//!                                  MarianTranslator <──────────────┘
//!                                  tokenize ─> encode ─> generate ─> decode
//! ```
//!
//! - The [`ModelRegistry`] is loaded once at startup and is read-only
//!   afterwards. Loading fails fast if any language's artifacts are missing.
//! - [`translate_text`] returns a typed [`TranslateError`]; the HTTP layer
//!   maps it to `400` (bad input, unknown language) or `500` (anything else).
//!
//! ## HTTP API
//!
//! | Method | Path          | Body                         | Response                         |
//! |--------|---------------|------------------------------|----------------------------------|
//! | GET    | `/`           |                              | `{"message": ...}`               |
//! | POST   | `/translate/` | form: `text`, `language`     | `{"translated_text": ...}`       |
//! | GET    | `/health`     |                              | status, version, uptime          |
//! | GET    | `/languages`  |                              | served languages and models      |
//!
//! Errors are `{"detail": "..."}`.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use indic_nmt::{Config, ModelRegistry};
//! use indic_nmt::server::{create_router, AppState};
//!
//! let config = Config::discover(None)?.with_env();
//! let registry = ModelRegistry::load(&config.models, &config.generation)?;
//! let server = config.server_config()?;
//! let app = create_router(Arc::new(AppState::new(server.clone(), registry)));
//! let listener = tokio::net::TcpListener::bind(server.addr).await?;
//! axum::serve(listener, app).await?;
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases
//! - [`inference`]: Marian model loading and generation
//! - [`registry`]: Language code to translator mapping
//! - [`server`]: HTTP API server (Axum-based)
//! - [`translate`]: Translation function and input validation

pub mod config;
pub mod error;
pub mod inference;
pub mod registry;
pub mod server;
pub mod translate;

// Re-exports for convenience
pub use config::Config;
pub use error::{NmtError, Result};
pub use inference::{GenerationConfig, MarianTranslator};
pub use registry::ModelRegistry;
pub use server::{AppState, ServerConfig};
pub use translate::{translate_text, validate_text, TranslateError, Translator, MAX_TEXT_CHARS};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
