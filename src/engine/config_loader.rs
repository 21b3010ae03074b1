use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::retry::RetryPolicy;

/// Name of the application config inside the config directory.
pub const CONFIG_NAME: &str = "config.toml";

// Define error types for config loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

// Result type alias for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Paths {
    pub download_directory: String,
    pub cache_file: String,
    pub log_directory: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Download {
    /// Expand every target into its series' full episode list.
    pub download_all_episodes: bool,
    pub skip_existing: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Network {
    pub api_base_url: String,
    pub site_base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Retry {
    pub max_attempts: u32,
    pub multiplier_secs: f64,
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Threading {
    pub use_threading: bool,
    /// 0 means one worker per logical core.
    pub max_workers: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Logging {
    pub log_level: String,
    pub log_format: String,
    pub log_to_file: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Targets {
    #[serde(default)]
    pub tv_shows: Vec<String>,
    #[serde(default)]
    pub movies: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    pub paths: Paths,
    pub download: Download,
    pub network: Network,
    pub retry: Retry,
    pub threading: Threading,
    pub logging: Logging,
    #[serde(default)]
    pub targets: Targets,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paths: Paths {
                download_directory: "./downloads".to_string(),
                cache_file: "./data/download_cache.json".to_string(),
                log_directory: "./logs".to_string(),
            },
            download: Download {
                download_all_episodes: true,
                skip_existing: true,
            },
            network: Network {
                api_base_url: "https://services.err.ee/api/v2/vodContent/getContentPageData".to_string(),
                site_base_url: "https://jupiter.err.ee".to_string(),
                user_agent: format!("err_downloader/{}", env!("CARGO_PKG_VERSION")),
                timeout_secs: 60,
            },
            retry: Retry {
                max_attempts: 3,
                multiplier_secs: 1.0,
                min_delay_secs: 4.0,
                max_delay_secs: 10.0,
            },
            threading: Threading {
                use_threading: true,
                max_workers: 0,
            },
            logging: Logging {
                log_level: "info".to_string(),
                log_format: "line".to_string(),
                log_to_file: true,
            },
            targets: Targets::default(),
        }
    }
}

impl AppConfig {
    /// Number of episodes processed at once for a single series.
    pub fn worker_count(&self) -> usize {
        if !self.threading.use_threading {
            return 1;
        }
        match self.threading.max_workers {
            0 => num_cpus::get().max(1),
            n => n,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.network.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts.max(1),
            multiplier: Duration::from_secs_f64(self.retry.multiplier_secs.max(0.0)),
            min_delay: Duration::from_secs_f64(self.retry.min_delay_secs.max(0.0)),
            max_delay: Duration::from_secs_f64(self.retry.max_delay_secs.max(0.0)),
        }
    }

    pub fn download_dir(&self) -> PathBuf {
        resolve_path(&self.paths.download_directory)
    }

    pub fn cache_path(&self) -> PathBuf {
        resolve_path(&self.paths.cache_file)
    }

    pub fn log_dir(&self) -> PathBuf {
        resolve_path(&self.paths.log_directory)
    }
}

/// Expands a leading `~/` against `$HOME` and anchors relative paths at
/// the working directory.
fn resolve_path(path: &str) -> PathBuf {
    let expanded = match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    };
    std::path::absolute(&expanded).unwrap_or(expanded)
}

/// How the config was obtained. The manager is built before logging is set
/// up, so callers report this once the subscriber is installed.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    Loaded,
    /// No file existed; defaults were written.
    Created,
    /// The file did not parse and was replaced with defaults.
    Recovered {
        reason: String,
        backup: Option<PathBuf>,
    },
}

/// Loads and persists `config.toml`.
pub struct ConfigManager {
    app_config: AppConfig,
    config_dir: PathBuf,
    load_status: LoadStatus,
}

impl ConfigManager {
    pub fn new(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        fs::create_dir_all(&config_dir)?;

        let (app_config, load_status) = Self::load_app_config(&config_dir)?;
        let manager = Self {
            app_config,
            config_dir,
            load_status,
        };
        manager.create_default_config()?;

        Ok(manager)
    }

    fn load_app_config(config_dir: &Path) -> ConfigResult<(AppConfig, LoadStatus)> {
        let config_path = config_dir.join(CONFIG_NAME);

        if !config_path.exists() {
            return Ok((AppConfig::default(), LoadStatus::Created));
        }

        let content = fs::read_to_string(&config_path)?;
        match toml::from_str(&content) {
            Ok(config) => Ok((config, LoadStatus::Loaded)),
            Err(e) => {
                let backup = config_path.with_extension("toml.backup");
                let backup = fs::rename(&config_path, &backup).ok().map(|_| backup);
                let status = LoadStatus::Recovered {
                    reason: e.to_string(),
                    backup,
                };
                Ok((AppConfig::default(), status))
            }
        }
    }

    fn create_default_config(&self) -> ConfigResult<()> {
        let config_path = self.config_path();
        if !config_path.exists() {
            fs::write(&config_path, toml::to_string_pretty(&self.app_config)?)?;
        }
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_NAME)
    }

    pub fn app_config(&self) -> &AppConfig {
        &self.app_config
    }

    pub fn load_status(&self) -> &LoadStatus {
        &self.load_status
    }

    /// Writes `config` to disk and makes it the current config.
    pub fn save(&mut self, config: AppConfig) -> ConfigResult<()> {
        fs::write(self.config_path(), toml::to_string_pretty(&config)?)?;
        self.app_config = config;
        Ok(())
    }
}
