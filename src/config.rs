//! Configuration for sshterm.
//!
//! This module provides:
//! - TOML configuration file loading from `~/.sshterm/config.toml`
//! - Built-in color schemes for the terminal's default colors
//! - Saved connection profiles
//!
//! # Configuration File
//!
//! ```toml
//! # Emulator: "full" (VT sequences) or "plain" (escape sequences stripped)
//! emulation = "full"
//!
//! # Channel poll interval in milliseconds
//! poll_interval_ms = 30
//!
//! # Log filter used when RUST_LOG is not set
//! log_level = "info"
//!
//! [theme]
//! scheme = "nord"
//! foreground = { r = 216, g = 222, b = 233 }
//! font = { family = "Cascadia Mono", size = 12.0 }
//!
//! [[profiles]]
//! name = "build box"
//! host = "build.example.com"
//! user = "ci"
//! key_path = "/home/me/.ssh/id_ed25519"
//! ```
//!
//! The config object is built once by the binary and passed down; nothing in
//! the core reads it from global state.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::emulator::{EmulationMode, FontSpec, Theme};
use crate::core::term::Rgb;
use crate::profile::Profile;

const DEFAULT_POLL_INTERVAL_MS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which emulator sessions are built with
    pub emulation: EmulationMode,
    /// How often the channel is polled
    pub poll_interval_ms: u64,
    /// Log filter when RUST_LOG is unset
    pub log_level: String,
    pub theme: ThemeConfig,
    pub profiles: Vec<Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            emulation: EmulationMode::Full,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            log_level: "info".to_string(),
            theme: ThemeConfig::default(),
            profiles: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from `~/.sshterm/config.toml`.
    ///
    /// A missing file gives defaults. A broken one also gives defaults, and
    /// its error is handed back so the caller can log it once logging is up.
    pub fn load() -> (Self, Option<ConfigError>) {
        match Self::config_path() {
            Some(path) => Self::load_or_default(&path),
            None => (Self::default(), None),
        }
    }

    pub fn load_or_default(path: &Path) -> (Self, Option<ConfigError>) {
        if !path.exists() {
            return (Self::default(), None);
        }
        match Self::load_from(path) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// `~/.sshterm`, created on first use
    pub fn config_dir() -> Option<PathBuf> {
        let dir = home_dir()?.join(".sshterm");
        if !dir.exists() {
            let _ = fs::create_dir_all(&dir);
        }
        Some(dir)
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    pub fn log_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("sshterm.log"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Find a saved profile by name
    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }
}

/// Theme settings: a base scheme with optional overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeConfig {
    pub scheme: String,
    pub foreground: Option<Rgb>,
    pub background: Option<Rgb>,
    pub font: FontSpec,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            scheme: "default".to_string(),
            foreground: None,
            background: None,
            font: FontSpec::default(),
        }
    }
}

impl ThemeConfig {
    pub fn to_theme(&self) -> Theme {
        let (fg, bg) = scheme_colors(&self.scheme);
        Theme {
            foreground: self.foreground.unwrap_or(fg),
            background: self.background.unwrap_or(bg),
            font: self.font.clone(),
        }
    }
}

/// Default (foreground, background) of a named scheme
fn scheme_colors(name: &str) -> (Rgb, Rgb) {
    match name.to_lowercase().as_str() {
        "solarized-dark" | "solarized_dark" => (Rgb::new(131, 148, 150), Rgb::new(0, 43, 54)),
        "solarized-light" | "solarized_light" => (Rgb::new(101, 123, 131), Rgb::new(253, 246, 227)),
        "nord" => (Rgb::new(216, 222, 233), Rgb::new(46, 52, 64)),
        "dracula" => (Rgb::new(248, 248, 242), Rgb::new(40, 42, 54)),
        "gruvbox-dark" | "gruvbox_dark" | "gruvbox" => (Rgb::new(235, 219, 178), Rgb::new(40, 40, 40)),
        "tokyo-night" | "tokyo_night" | "tokyonight" => (Rgb::new(169, 177, 214), Rgb::new(26, 27, 38)),
        _ => {
            let theme = Theme::default();
            (theme.foreground, theme.background)
        }
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.emulation, EmulationMode::Full);
        assert_eq!(config.poll_interval(), Duration::from_millis(30));
        assert_eq!(config.log_level, "info");
        assert!(config.profiles.is_empty());
        assert_eq!(config.theme.to_theme(), Theme::default());
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml_str(
            r#"
            emulation = "plain"
            poll_interval_ms = 50

            [theme]
            scheme = "nord"
            background = { r = 1, g = 2, b = 3 }
            font = { family = "Iosevka", size = 13.5 }

            [[profiles]]
            name = "box"
            host = "box.example.com"
            user = "ci"
            key_path = "/keys/id_ed25519"
            "#,
        )
        .unwrap();

        assert_eq!(config.emulation, EmulationMode::Plain);
        assert_eq!(config.poll_interval_ms, 50);

        let theme = config.theme.to_theme();
        assert_eq!(theme.foreground, Rgb::new(216, 222, 233));
        assert_eq!(theme.background, Rgb::new(1, 2, 3));
        assert_eq!(theme.font.family, "Iosevka");

        let profile = config.profile("box").unwrap();
        assert_eq!(profile.port, 22);
        assert_eq!(profile.key_path, Some(PathBuf::from("/keys/id_ed25519")));
        assert!(config.profile("missing").is_none());
    }

    #[test]
    fn test_invalid_config_is_parse_error() {
        let err = Config::from_toml_str("emulation = \"fancy\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let config = Config::from_toml_str("poll_interval_ms = 0").unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_level = \"debug\"").unwrap();
        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.log_level, "debug");

        let missing = Config::load_from(Path::new("/nonexistent/config.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_broken_file_gives_defaults_and_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_level = [oops").unwrap();
        let (config, err) = Config::load_or_default(file.path());
        assert_eq!(config.log_level, "info");
        assert!(matches!(err, Some(ConfigError::Parse(_))));

        let (config, err) = Config::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.emulation, EmulationMode::Full);
        assert!(err.is_none());
    }
}
