//! CLI command implementations.

pub mod config;
pub mod patch;
pub mod simulate;
pub mod templates;
