//! Configuration file support for lapse
//!
//! Config file location: `~/.config/lapse/config.toml` (XDG_CONFIG_HOME)
//!
//! Example config:
//! ```toml
//! show_differences_only = true
//!
//! [settings]
//! scm = "svn"
//! username = "ann"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Key of the built-in differences-only flag
pub const SHOW_DIFFERENCES_ONLY: &str = "show_differences_only";

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub show_differences_only: bool,
    /// Free-form string settings
    pub settings: BTreeMap<String, String>,
    /// Where `save` writes to
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            show_differences_only: true,
            settings: BTreeMap::new(),
            path: None,
        }
    }
}

impl Config {
    /// Get all possible config file paths in priority order
    fn config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // 1. XDG_CONFIG_HOME (if set)
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg).join("lapse").join("config.toml"));
        }

        // 2. ~/.config/lapse/config.toml
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("lapse").join("config.toml"));
        }

        // 3. Platform-specific config dir
        if let Some(config_dir) = dirs::config_dir() {
            let platform_path = config_dir.join("lapse").join("config.toml");
            if !paths.contains(&platform_path) {
                paths.push(platform_path);
            }
        }

        paths
    }

    /// Get the first existing config file path
    pub fn config_path() -> Option<PathBuf> {
        Self::config_paths().into_iter().find(|p| p.exists())
    }

    /// Load from the first existing config path, or defaults
    ///
    /// Saving later writes to the file that was read, or to the preferred
    /// location when none existed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self {
                path: Self::config_paths().into_iter().next(),
                ..Self::default()
            },
        }
    }

    /// Load from `path`; a missing or unparsable file yields defaults
    pub fn load_from(path: &Path) -> Self {
        let mut config: Self = std::fs::read_to_string(path)
            .ok()
            .and_then(|content| {
                toml::from_str(&content)
                    .map_err(|e| {
                        tracing::warn!(path = %path.display(), "Failed to parse config: {e}");
                        e
                    })
                    .ok()
            })
            .unwrap_or_default();
        config.path = Some(path.to_path_buf());
        config
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        if key == SHOW_DIFFERENCES_ONLY {
            return self.show_differences_only;
        }
        self.settings
            .get(key)
            .and_then(|value| value.parse().ok())
            .unwrap_or(default)
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        if key == SHOW_DIFFERENCES_ONLY {
            self.show_differences_only = value;
        } else {
            self.settings.insert(key.to_string(), value.to_string());
        }
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.settings
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    pub fn set_string(&mut self, key: &str, value: impl Into<String>) {
        self.settings.insert(key.to_string(), value.into());
    }

    /// Write the config back to its file
    pub fn save(&self) -> Result<()> {
        let path = self
            .path
            .as_deref()
            .context("No config location available")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }
}
