//! Platform-specific configuration paths.
//!
//! - Linux: `~/.config/patchcord/`
//! - macOS: `~/Library/Application Support/patchcord/`
//! - Windows: `%APPDATA%\patchcord\`

use std::path::PathBuf;

/// Application name used for directory paths.
const APP_NAME: &str = "patchcord";

/// File name of the engine configuration.
pub const CONFIG_FILE_NAME: &str = "engine.toml";

/// Returns the user-specific configuration directory.
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the default location of the engine configuration file.
pub fn default_config_path() -> PathBuf {
    user_config_dir().join(CONFIG_FILE_NAME)
}
