//! Server Module
//!
//! Configuration, service wiring and shared state for the Axum server.
//!
//! - **`config`** - `AppConfig` (defaults, TOML file, environment) and database bootstrap
//! - **`state`** - `AppState` and its `FromRef` implementations
//! - **`init`** - Service construction and app creation
//!
//! # Initialization Flow
//!
//! 1. `AppConfig::load` reads configuration
//! 2. `build_state` connects the stores and builds every service
//! 3. `create_router` mounts the routes on the state

/// Application state management
pub mod state;

/// Server configuration loading
pub mod config;

/// Server initialization
pub mod init;

pub use config::{AppConfig, ConfigError};
pub use init::{assemble_state, build_state, create_app, StartupError};
pub use state::AppState;
