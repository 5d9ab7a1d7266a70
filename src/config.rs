use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::steps::StepLayout;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub wizard: WizardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Project base URL (e.g. `https://<ref>.supabase.co`); empty runs offline
    #[serde(default)]
    pub base_url: String,
    /// Public anon key sent as `apikey` and bearer token
    #[serde(default)]
    pub anon_key: String,
    /// Storage bucket for token-based uploads
    #[serde(default = "default_storage_bucket")]
    pub storage_bucket: String,
    /// Origin reported when a session is created
    #[serde(default = "default_origin_url")]
    pub origin_url: String,
    /// Deadline for JSON calls (transfers have none)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_storage_bucket() -> String {
    "builder-uploads".to_string()
}

fn default_origin_url() -> String {
    "cli://frame-builder".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            anon_key: String::new(),
            storage_bucket: default_storage_bucket(),
            origin_url: default_origin_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory for the durable client store and logs
    #[serde(default = "default_state_path")]
    pub state: String,
}

fn default_state_path() -> String {
    ".frame-builder".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state: default_state_path(),
        }
    }
}

/// Photo upload settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Degraded-mode simulator tick (default: 200ms)
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Smallest simulated progress increment per tick
    #[serde(default = "default_min_increment")]
    pub min_increment: f32,
    /// Upper bound (exclusive) of the simulated increment
    #[serde(default = "default_max_increment")]
    pub max_increment: f32,
    /// Seconds to wait for an upload grant before degrading; 0 waits forever
    #[serde(default = "default_grant_timeout")]
    pub grant_timeout_secs: u64,
    /// Largest accepted photo (default: 30 MB)
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    /// Accepted photo extensions, lowercase without dot
    #[serde(default = "default_accepted_extensions")]
    pub accepted_extensions: Vec<String>,
    /// Simulate progress when a real upload fails (false leaves the slot Failed)
    #[serde(default = "default_simulate_on_failure")]
    pub simulate_on_failure: bool,
}

fn default_tick_ms() -> u64 {
    200
}

fn default_min_increment() -> f32 {
    10.0
}

fn default_max_increment() -> f32 {
    35.0
}

fn default_grant_timeout() -> u64 {
    20
}

fn default_max_file_bytes() -> u64 {
    30 * 1024 * 1024
}

fn default_accepted_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "webp", "heic"]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

fn default_simulate_on_failure() -> bool {
    true
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            min_increment: default_min_increment(),
            max_increment: default_max_increment(),
            grant_timeout_secs: default_grant_timeout(),
            max_file_bytes: default_max_file_bytes(),
            accepted_extensions: default_accepted_extensions(),
            simulate_on_failure: default_simulate_on_failure(),
        }
    }
}

impl UploadConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn grant_timeout(&self) -> Option<Duration> {
        (self.grant_timeout_secs > 0).then(|| Duration::from_secs(self.grant_timeout_secs))
    }
}

/// Funnel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WizardConfig {
    /// Step layout: combined (personalization, upload) or split (size, colors, upload)
    #[serde(default)]
    pub layout: StepLayout,
    /// Support message template; `{size}` and `{frame}` are substituted
    #[serde(default = "default_support_message")]
    pub support_message: String,
}

fn default_support_message() -> String {
    "Hello! I'm ordering a custom illustration ({size}, {frame} frame) \
     but can't send my photos through the site. I'll send them here."
        .to_string()
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            layout: StepLayout::default(),
            support_message: default_support_message(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Write logs to a file under the state directory instead of stderr
    #[serde(default)]
    pub to_file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: false,
        }
    }
}

impl Config {
    /// Path to the project config file
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".frame-builder/config.toml")
    }

    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Start with embedded defaults so the CLI works without config files
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        let project_config = Self::project_config_path();
        if project_config.exists() {
            builder = builder.add_source(config::File::from(project_config));
        }

        // User config in ~/.config/frame-builder/ (optional global overrides)
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("frame-builder").join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment variables, e.g. FRAME_BUILDER__API__ANON_KEY
        builder = builder.add_source(
            config::Environment::with_prefix("FRAME_BUILDER")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Save config as TOML, defaulting to the project config path
    pub fn save(&self, path: Option<&std::path::Path>) -> Result<PathBuf> {
        let config_path = path
            .map(PathBuf::from)
            .unwrap_or_else(Self::project_config_path);

        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create config directory")?;
            }
        }

        let toml_str =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;
        std::fs::write(&config_path, toml_str).context("Failed to write config file")?;

        Ok(config_path)
    }

    /// Get absolute path to state directory
    pub fn state_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.paths.state);
        if path.is_absolute() {
            path
        } else {
            std::env::current_dir().unwrap_or_default().join(path)
        }
    }

    /// Get absolute path to logs directory
    pub fn logs_path(&self) -> PathBuf {
        self.state_path().join("logs")
    }

    /// Path of the durable client store
    pub fn store_path(&self) -> PathBuf {
        self.state_path().join("storage.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.upload.tick(), Duration::from_millis(200));
        assert_eq!(config.upload.grant_timeout(), Some(Duration::from_secs(20)));
        assert_eq!(config.upload.max_file_bytes, 30 * 1024 * 1024);
        assert!(config.upload.accepted_extensions.contains(&"heic".to_string()));
        assert_eq!(config.wizard.layout, StepLayout::Combined);
        assert!(config.api.base_url.is_empty());
    }

    #[test]
    fn test_zero_grant_timeout_disables() {
        let upload = UploadConfig {
            grant_timeout_secs: 0,
            ..UploadConfig::default()
        };
        assert_eq!(upload.grant_timeout(), None);
    }

    #[test]
    fn test_save_and_load_explicit_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = Config::default();
        config.api.base_url = "https://example.supabase.co".to_string();
        config.wizard.layout = StepLayout::Split;
        config.upload.tick_ms = 50;
        config.save(Some(&path)).unwrap();

        let loaded = Config::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(loaded.api.base_url, "https://example.supabase.co");
        assert_eq!(loaded.wizard.layout, StepLayout::Split);
        assert_eq!(loaded.upload.tick_ms, 50);
    }

    #[test]
    fn test_paths_relative_to_state() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.state = temp_dir.path().to_string_lossy().to_string();

        assert_eq!(config.logs_path(), temp_dir.path().join("logs"));
        assert_eq!(config.store_path(), temp_dir.path().join("storage.json"));
    }
}
