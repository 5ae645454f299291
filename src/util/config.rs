//! Configuration file support for Stagehand.
//!
//! Stagehand reads two optional configuration files on top of the project
//! manifest:
//! - Global: `~/.stagehand/config.toml` - User-wide defaults
//! - Project: `.stagehand/config.toml` - Machine-local project overrides
//!
//! Project config takes precedence over global config, and both take
//! precedence over the `[tools]` table of `Stagehand.toml`. Command-line
//! flags win over everything.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::builder::events::MessageFormat;

/// Stagehand configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build settings
    pub build: BuildConfig,

    /// External tool overrides
    pub tools: ToolOverrides,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BuildConfig {
    /// Maximum number of bundle tasks run at once
    pub jobs: Option<usize>,

    /// Output format for build progress
    pub message_format: Option<MessageFormat>,
}

/// Overrides for the external tools named in the manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ToolOverrides {
    pub rustc: Option<String>,
    pub cargo: Option<String>,
    /// Bundler driver command line (program followed by its fixed arguments)
    pub bundler: Option<Vec<String>>,
    pub packager: Option<String>,
    pub typecheck: Option<String>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    /// Load configuration, falling back to defaults if the file is missing or
    /// unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }
        if other.build.message_format.is_some() {
            self.build.message_format = other.build.message_format;
        }

        let tools = other.tools;
        if tools.rustc.is_some() {
            self.tools.rustc = tools.rustc;
        }
        if tools.cargo.is_some() {
            self.tools.cargo = tools.cargo;
        }
        if tools.bundler.is_some() {
            self.tools.bundler = tools.bundler;
        }
        if tools.packager.is_some() {
            self.tools.packager = tools.packager;
        }
        if tools.typecheck.is_some() {
            self.tools.typecheck = tools.typecheck;
        }
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.stagehand/config.toml)
/// 2. Global config (~/.stagehand/config.toml)
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global) = global_path {
        config.merge(Config::load_or_default(global));
    }

    config.merge(Config::load_or_default(project_path));

    config
}

/// Get the global stagehand config directory (~/.stagehand).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".stagehand"))
}

/// Get the project config path (.stagehand/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".stagehand").join("config.toml")
}
