//! Centralized directory paths for the concierge client.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | App data | `~/Library/Application Support/concierge/` | `~/.local/share/concierge/` |
//! | Config | `~/Library/Application Support/concierge/` | `~/.config/concierge/` |
//!
//! # Environment Overrides
//!
//! - `CONCIERGE_DATA_DIR` overrides [`data_dir`]
//! - `CONCIERGE_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root directory (sessions, spoken replies).
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("CONCIERGE_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("concierge"))
        .unwrap_or_else(|| PathBuf::from("/tmp/concierge-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("CONCIERGE_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("concierge"))
        .unwrap_or_else(|| PathBuf::from("/tmp/concierge-config"))
}

/// Synthesized replies written by the file audio output (`data_dir()/replies/`).
#[must_use]
pub fn replies_dir() -> PathBuf {
    data_dir().join("replies")
}

/// Main config file (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}
