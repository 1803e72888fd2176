//! Configuration for the patchcord engine.
//!
//! # Features
//!
//! - **Engine config**: [`EngineConfig`] loaded from and saved to TOML
//! - **Validation**: every load checks that values are usable
//! - **Paths**: platform-specific config directory
//!
//! # Example
//!
//! ```rust,no_run
//! use patchcord_config::{EngineConfig, default_config_path};
//!
//! let config = EngineConfig::load_or_default(default_config_path()).unwrap();
//! let options = config.canvas_options();
//! ```

mod engine;
mod error;

/// Platform-specific configuration paths.
pub mod paths;

pub use engine::{DEFAULT_LOG_FILTER, EngineConfig, LoopbackSection};
pub use error::ConfigError;
pub use paths::{CONFIG_FILE_NAME, default_config_path, user_config_dir};
