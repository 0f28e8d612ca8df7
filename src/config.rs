//! Sync configuration
//!
//! Loaded from (later wins):
//! - Default values
//! - Config file (`<config dir>/cursor-sync/config.toml`)
//! - Environment variables (`CURSOR_SYNC_*`)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Shortest allowed interval between scheduled pushes
pub const MIN_SCHEDULE_INTERVAL_MINUTES: u64 = 5;

const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Profile label recorded in every manifest
    pub profile_name: String,

    /// Include globs, relative to the sync root they belong to
    pub enabled_paths: Vec<String>,

    /// Extra exclude globs applied after the include globs
    pub exclude_globs: Vec<String>,

    /// Files larger than this are never synced
    pub max_file_size_kb: u64,

    /// Ask before overwriting files on pull
    pub safe_mode: bool,

    /// Background push schedule
    pub schedule: ScheduleConfig,

    /// Directory holding sync state, credentials and backups
    pub state_dir: PathBuf,

    /// Remote API base URL
    pub api_base_url: String,
}

/// Background push schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub interval_minutes: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: 30,
        }
    }
}

impl ScheduleConfig {
    /// Configured interval, floored to the minimum
    pub fn interval(&self) -> Duration {
        let minutes = self.interval_minutes.max(MIN_SCHEDULE_INTERVAL_MINUTES);
        Duration::from_secs(minutes * 60)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            profile_name: "default".to_string(),
            enabled_paths: default_enabled_paths(),
            exclude_globs: Vec::new(),
            max_file_size_kb: 512,
            safe_mode: true,
            schedule: ScheduleConfig::default(),
            state_dir: default_state_dir(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }
}

/// Include globs used when none are configured
pub fn default_enabled_paths() -> Vec<String> {
    [
        "settings.json",
        "keybindings.json",
        "snippets/**",
        "extensions.json",
        "skills/**/SKILL.md",
        "skills-cursor/**/SKILL.md",
        "commands/**/*.md",
        "rules/*.mdc",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cursor-sync")
}

/// Default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cursor-sync").join("config.toml"))
}

impl SyncConfig {
    /// Load config from `path` (or the default location), then apply env overrides.
    ///
    /// A missing file yields defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(default_config_path);

        let mut config = match path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(&path).map_err(|e| SyncError::fs(&path, e))?;
                let config = Self::from_toml(&raw)?;
                tracing::debug!("Loaded config from {}", path.display());
                config
            }
            _ => Self::default(),
        };

        config.apply_env();
        config.state_dir = expand_path(&config.state_dir);
        Ok(config)
    }

    /// Parse a TOML document
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        if config.profile_name.trim().is_empty() {
            return Err(SyncError::Config("profile_name cannot be empty".to_string()));
        }
        Ok(config)
    }

    /// Apply `CURSOR_SYNC_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from any variable source
    pub fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(profile) = var("CURSOR_SYNC_PROFILE") {
            if !profile.trim().is_empty() {
                self.profile_name = profile;
            }
        }
        if let Some(dir) = var("CURSOR_SYNC_STATE_DIR") {
            self.state_dir = expand_path(Path::new(&dir));
        }
        if let Some(url) = var("CURSOR_SYNC_API_URL") {
            self.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(minutes) = var("CURSOR_SYNC_SCHEDULE_MINUTES") {
            match minutes.parse::<u64>() {
                Ok(m) => {
                    self.schedule.enabled = true;
                    self.schedule.interval_minutes = m;
                }
                Err(_) => tracing::warn!("Ignoring invalid CURSOR_SYNC_SCHEDULE_MINUTES={}", minutes),
            }
        }
    }

    /// Size cap in bytes
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_kb.saturating_mul(1024)
    }

    /// Persisted base snapshot
    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join("sync-state.json")
    }

    /// Backup generations root
    pub fn backups_dir(&self) -> PathBuf {
        self.state_dir.join("backups")
    }

    /// Stored access token
    pub fn credential_path(&self) -> PathBuf {
        self.state_dir.join("credentials")
    }
}

/// Expand a leading `~`
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.profile_name, "default");
        assert_eq!(config.max_file_size_bytes(), 512 * 1024);
        assert!(config.safe_mode);
        assert!(!config.schedule.enabled);
        assert!(config.enabled_paths.contains(&"rules/*.mdc".to_string()));
        assert!(config.state_path().ends_with("sync-state.json"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SyncConfig::from_toml(
            r#"
            profile_name = "laptop"
            exclude_globs = ["snippets/private-*"]

            [schedule]
            enabled = true
            interval_minutes = 15
            "#,
        )
        .unwrap();

        assert_eq!(config.profile_name, "laptop");
        assert_eq!(config.exclude_globs, vec!["snippets/private-*"]);
        assert_eq!(config.schedule.interval(), Duration::from_secs(15 * 60));
        assert_eq!(config.max_file_size_kb, 512);
        assert_eq!(config.enabled_paths, default_enabled_paths());
    }

    #[test]
    fn test_interval_floor() {
        let schedule = ScheduleConfig {
            enabled: true,
            interval_minutes: 1,
        };
        assert_eq!(schedule.interval(), Duration::from_secs(5 * 60));
    }

    #[test]
    fn test_huge_size_cap_saturates() {
        let config = SyncConfig {
            max_file_size_kb: u64::MAX,
            ..SyncConfig::default()
        };
        assert_eq!(config.max_file_size_bytes(), u64::MAX);
    }

    #[test]
    fn test_overrides_expand_state_dir() {
        let mut config = SyncConfig::default();
        config.apply_overrides(|name| match name {
            "CURSOR_SYNC_STATE_DIR" => Some("~/sync-state".to_string()),
            "CURSOR_SYNC_API_URL" => Some("https://ghe.example.com/api/v3/".to_string()),
            "CURSOR_SYNC_SCHEDULE_MINUTES" => Some("10".to_string()),
            _ => None,
        });

        let home = dirs::home_dir().unwrap();
        assert_eq!(config.state_dir, home.join("sync-state"));
        assert_eq!(config.api_base_url, "https://ghe.example.com/api/v3");
        assert!(config.schedule.enabled);
        assert_eq!(config.schedule.interval_minutes, 10);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            SyncConfig::from_toml("profile_name = 3"),
            Err(SyncError::Config(_))
        ));
        assert!(SyncConfig::from_toml("profile_name = \"  \"").is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SyncConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.max_file_size_kb, 512);
    }
}
