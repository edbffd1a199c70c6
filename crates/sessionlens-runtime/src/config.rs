//! Runtime configuration.
//!
//! Defaults target the agent CLI's on-disk layout; a small TOML file can
//! override the projects root and the follow-latest flag.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Root of the encoded project directories.
    pub projects_root: PathBuf,
    /// SQLite metadata cache location.
    pub cache_path: PathBuf,
    /// Directory for notification history and triggers.
    pub data_dir: PathBuf,
    /// Auto-select whichever session is receiving writes.
    pub follow_latest: bool,
    /// A session with no writes for this long flips back to idle.
    pub idle_timeout: Duration,
    /// How often idle sessions are swept.
    pub sweep_interval: Duration,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    projects_root: Option<String>,
    #[serde(default)]
    follow_latest: Option<bool>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let cache_dir = dirs::cache_dir().unwrap_or_else(|| home.join(".cache"));
        let data_dir = dirs::data_dir().unwrap_or_else(|| home.join(".local/share"));

        Self {
            projects_root: home.join(".claude").join("projects"),
            cache_path: cache_dir.join("sessionlens").join("sessions.db"),
            data_dir: data_dir.join("sessionlens"),
            follow_latest: false,
            idle_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

impl RuntimeConfig {
    /// Defaults merged with `~/.config/sessionlens/config.toml`, if present.
    pub fn load() -> Self {
        let mut config = Self::default();

        let Some(config_dir) = dirs::config_dir() else {
            return config;
        };
        let path = config_dir.join("sessionlens").join("config.toml");
        let Ok(raw) = std::fs::read_to_string(&path) else {
            return config;
        };

        match toml::from_str::<ConfigFile>(&raw) {
            Ok(file) => {
                if let Some(root) = file.projects_root {
                    config.projects_root = expand_tilde(&root);
                }
                if let Some(follow) = file.follow_latest {
                    config.follow_latest = follow;
                }
            }
            Err(err) => warn!(path = %path.display(), %err, "ignoring invalid config file"),
        }

        config
    }

    /// Test configuration rooted at a scratch directory, with fast timers.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            cache_path: root.join("cache").join("sessions.db"),
            data_dir: root.join("data"),
            projects_root: root.join("projects"),
            ..Self::default()
        }
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    PathBuf::from(path)
}
