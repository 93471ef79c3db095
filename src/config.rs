use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum_macros::Display;

use crate::internal::profile::Profile;

/// Directories searched, in order, when no test root is configured.
pub const TEST_ROOT_CANDIDATES: [&str; 2] = ["tests/wdio", "test/wdio"];

const CONFIG_FILE_NAME: &str = "config.ron";
const APP_DIR_NAME: &str = "screenshot-ledger";

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Display, Default)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global level used when `RUST_LOG` is not set
    pub level: LogLevel,
    /// Per-module overrides, e.g. `"screenshot_ledger::internal::watcher": Debug`
    pub module_levels: HashMap<String, LogLevel>,
    /// Directory for the rolling log file written in watch mode. Defaults to "logs".
    pub log_directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            module_levels: HashMap::new(),
            log_directory: None,
        }
    }
}

impl LoggingConfig {
    /// `EnvFilter` directive string: the global level followed by module overrides.
    pub fn filter_directives(&self) -> String {
        let mut modules: Vec<(&String, &LogLevel)> = self.module_levels.iter().collect();
        modules.sort_by(|l, r| l.0.cmp(r.0));
        let mut filter_str = self.level.to_string();
        for (module, level) in modules {
            filter_str.push_str(&format!(",{}={}", module, level));
        }
        filter_str
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Project directory holding `package.json` and the wdio tests
    #[serde(default = "default_project_dir")]
    pub project_dir: String,
    /// Test root, relative to `project_dir` or absolute. Discovered when absent.
    pub test_root: Option<String>,
    /// Screenshot profile. Detected from `package.json` when absent.
    pub profile: Option<Profile>,
    /// Breadcrumb separator overriding the profile default
    pub context_separator: Option<String>,
    /// Append counts to tree labels
    #[serde(default = "default_show_statistics")]
    pub show_statistics: bool,
    /// Emit elapsed-time debug logs for scans and ledger lookups
    pub enable_performance_metrics: bool,
    /// How long paths written by our own mutations are remembered
    #[serde(default = "default_write_ledger_ttl_ms")]
    pub write_ledger_ttl_ms: u64,
    pub logging: LoggingConfig,
}

fn default_project_dir() -> String {
    ".".to_string()
}

fn default_show_statistics() -> bool {
    true
}

fn default_write_ledger_ttl_ms() -> u64 {
    2000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            project_dir: default_project_dir(),
            test_root: None,
            profile: None,
            context_separator: None,
            show_statistics: default_show_statistics(),
            enable_performance_metrics: false,
            write_ledger_ttl_ms: default_write_ledger_ttl_ms(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from `explicit`, else `config.ron` in the working directory, next to
    /// the executable, or in the user config directory. Falls back to defaults.
    pub fn load(explicit: Option<&Path>) -> Self {
        let mut candidates = Vec::new();

        if let Some(path) = explicit {
            candidates.push(path.to_path_buf());
        }

        // 1. Current working directory
        candidates.push(PathBuf::from(CONFIG_FILE_NAME));

        // 2. Next to executable
        if let Ok(exe) = std::env::current_exe()
            && let Some(dir) = exe.parent()
        {
            candidates.push(dir.join(CONFIG_FILE_NAME));
        }

        // 3. User config directory
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME));
        }

        for path in candidates {
            if path.exists()
                && let Ok(content) = fs::read_to_string(&path)
            {
                match Self::parse(&content) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        tracing::error!("Failed to parse config at {}: {}", path.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Self::default()
    }

    pub fn parse(content: &str) -> Result<Self> {
        ron::from_str::<AppConfig>(content).context("invalid RON configuration")
    }

    /// Resolve paths and the profile into the settings a workspace runs with.
    pub fn resolve(&self) -> Result<WorkspaceSettings> {
        let project_dir = PathBuf::from(&self.project_dir);
        let test_root = match &self.test_root {
            Some(root) => project_dir.join(root),
            None => discover_test_root(&project_dir).with_context(|| {
                format!(
                    "no test root configured and none of {:?} exists under {}",
                    TEST_ROOT_CANDIDATES,
                    project_dir.display()
                )
            })?,
        };
        let profile = match self.profile {
            Some(profile) => profile,
            None => Profile::detect(&project_dir)?,
        };
        let context_separator = self
            .context_separator
            .clone()
            .unwrap_or_else(|| profile.default_separator().to_string());

        Ok(WorkspaceSettings {
            test_root,
            profile,
            context_separator,
            show_statistics: self.show_statistics,
            enable_performance_metrics: self.enable_performance_metrics,
            write_ledger_ttl: Duration::from_millis(self.write_ledger_ttl_ms),
        })
    }
}

/// First existing conventional test root under `project_dir`.
pub fn discover_test_root(project_dir: &Path) -> Option<PathBuf> {
    TEST_ROOT_CANDIDATES
        .iter()
        .map(|candidate| project_dir.join(candidate))
        .find(|path| path.is_dir())
}

/// Configuration threaded through one workspace.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceSettings {
    pub test_root: PathBuf,
    pub profile: Profile,
    pub context_separator: String,
    pub show_statistics: bool,
    pub enable_performance_metrics: bool,
    pub write_ledger_ttl: Duration,
}

impl WorkspaceSettings {
    pub fn new(test_root: impl Into<PathBuf>, profile: Profile) -> Self {
        Self {
            test_root: test_root.into(),
            profile,
            context_separator: profile.default_separator().to_string(),
            show_statistics: default_show_statistics(),
            enable_performance_metrics: false,
            write_ledger_ttl: Duration::from_millis(default_write_ledger_ttl_ms()),
        }
    }
}
