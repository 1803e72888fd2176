//! Engine configuration file.

use std::path::Path;
use std::time::Duration;

use patchcord_core::{CanvasOptions, DEFAULT_DRAIN_BUDGET, DEFAULT_MAX_FANOUT};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Default `tracing` filter directive.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Engine settings, stored as TOML.
///
/// Every field has a default, so an empty file is a valid configuration.
///
/// ```toml
/// max_fanout = 20
/// log_filter = "info,patchcord_core=debug"
/// drain_budget = 256
/// reply_timeout_ms = 2000
///
/// [loopback]
/// refused = ["broken.def"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of inlets one outlet may feed.
    pub max_fanout: usize,
    /// `tracing` filter used when `RUST_LOG` is not set.
    pub log_filter: String,
    /// Replies settled per scheduler drain pass.
    pub drain_budget: usize,
    /// How long a front end waits for outstanding replies before giving up.
    /// Absent means wait indefinitely; the engine itself never times out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_timeout_ms: Option<u64>,
    /// Simulated server settings.
    pub loopback: LoopbackSection,
}

/// `[loopback]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopbackSection {
    /// Definitions the simulated server refuses to instantiate.
    pub refused: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_fanout: DEFAULT_MAX_FANOUT,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            drain_budget: DEFAULT_DRAIN_BUDGET,
            reply_timeout_ms: None,
            loopback: LoopbackSection::default(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Load `path`, or return the defaults if it does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(err) if err.is_not_found() => Ok(Self::default()),
            other => other,
        }
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save to a file, creating parent directories as needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        self.validate()?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Check that every field holds a usable value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_fanout == 0 {
            return Err(ConfigError::invalid("max_fanout", "must be at least 1"));
        }
        if self.drain_budget == 0 {
            return Err(ConfigError::invalid("drain_budget", "must be at least 1"));
        }
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::invalid("log_filter", "must not be empty"));
        }
        if self.reply_timeout_ms == Some(0) {
            return Err(ConfigError::invalid(
                "reply_timeout_ms",
                "must be positive; omit it to wait indefinitely",
            ));
        }
        Ok(())
    }

    /// Canvas options derived from this configuration.
    pub fn canvas_options(&self) -> CanvasOptions {
        CanvasOptions {
            max_fanout: self.max_fanout,
        }
    }

    /// Reply wait limit, if one is configured.
    pub fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout_ms.map(Duration::from_millis)
    }
}
