use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Error};
use indicatif::MultiProgress;
use reqwest::Client;
use tracing::{error, info, trace, warn};

use crate::engine::{
    AppConfig, ConfigManager, DownloadCache, HttpTransfer, LoadStatus, Orchestrator, RunReport,
    targets_from_config,
};
use crate::err::{ContentResolver, Discovery, HttpContentSource, add_urls_to_config};

/// The name of the cargo package.
const NAME: &str = env!("CARGO_PKG_NAME");

/// The version of the cargo package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The authors who created the package.
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

/// Handles the flow of a download or discovery run.
pub(crate) struct Program {
    config_manager: ConfigManager,
}

impl Program {
    /// Loads (or creates) `config.toml` inside `config_dir`.
    pub(crate) fn new(config_dir: &Path) -> Result<Self, Error> {
        let config_manager = ConfigManager::new(config_dir)
            .with_context(|| format!("Failed to load config from {}", config_dir.display()))?;
        Ok(Self { config_manager })
    }

    pub(crate) fn config(&self) -> &AppConfig {
        self.config_manager.app_config()
    }

    /// Reports how the config was loaded. Call after the logger is installed.
    pub(crate) fn log_config_status(&self) {
        let path = self.config_manager.config_path();
        match self.config_manager.load_status() {
            LoadStatus::Loaded => trace!("Loaded config from {}", path.display()),
            LoadStatus::Created => {
                warn!("Config file not found, created {} with default values", path.display())
            }
            LoadStatus::Recovered { reason, backup } => {
                error!("Failed to parse {}: {}", path.display(), reason);
                match backup {
                    Some(backup) => warn!("Old config moved to {}", backup.display()),
                    None => warn!("Failed to back up old config"),
                }
                info!("Continuing with default values");
            }
        }
    }

    fn log_startup(&self) {
        trace!("Program Name: {}", NAME);
        trace!("Program Version: {}", VERSION);
        trace!("Program Authors: {}", AUTHORS);
        trace!("Config File: {}", self.config_manager.config_path().display());
    }

    fn http_client(config: &AppConfig) -> Result<Client, Error> {
        Client::builder()
            .user_agent(config.network.user_agent.as_str())
            .connect_timeout(config.request_timeout())
            .read_timeout(config.request_timeout())
            .build()
            .context("Failed to build HTTP client")
    }

    fn resolver(config: &AppConfig, client: Client) -> Arc<ContentResolver> {
        let source = HttpContentSource::new(client, config.network.api_base_url.clone());
        Arc::new(ContentResolver::new(Arc::new(source)))
    }

    /// Downloads every configured target. Individual failures end up in the
    /// report; only setup problems are returned as errors.
    pub(crate) async fn download(&self) -> Result<RunReport, Error> {
        self.log_startup();
        let config = Arc::new(self.config().clone());
        let targets = targets_from_config(&config);
        if targets.is_empty() {
            warn!(
                "No targets configured; add URLs to [targets] in {}",
                self.config_manager.config_path().display()
            );
        }

        let client = Self::http_client(&config)?;
        let cache = Arc::new(DownloadCache::open(config.cache_path()));
        if cache.is_empty() {
            info!("Starting with an empty download cache at {}", cache.path().display());
        } else {
            trace!("Cache loaded from {} ({} entries)", cache.path().display(), cache.len());
        }

        let transfer = HttpTransfer::new(client.clone(), config.retry_policy())
            .with_progress(MultiProgress::new());
        let orchestrator = Orchestrator::new(
            config.clone(),
            cache,
            Self::resolver(&config, client),
            Arc::new(transfer),
        );

        let report = orchestrator.run(&targets).await;
        report.print_summary();

        if report.has_failures() {
            warn!("Completed with {} failures", report.failed.len());
        }
        Ok(report)
    }

    /// Looks for unlisted seasons of tracked shows. With `add`, appends them to
    /// the config file. Returns how many URLs were found (or added).
    pub(crate) async fn discover(&mut self, add: bool) -> Result<usize, Error> {
        self.log_startup();
        let config = self.config().clone();
        info!("Checking {} tracked show URLs for new seasons", config.targets.tv_shows.len());

        let client = Self::http_client(&config)?;
        let discovery = Discovery::new(
            Self::resolver(&config, client),
            config.network.site_base_url.clone(),
        );

        let missing = discovery.discover_missing(&config.targets.tv_shows).await;
        if missing.is_empty() {
            info!("No new seasons found");
            return Ok(0);
        }

        let found: usize = missing.values().map(BTreeSet::len).sum();
        info!("Found {} new season URL(s) across {} show(s)", found, missing.len());

        if !add {
            info!("Run again with --add to append them to the config");
            return Ok(found);
        }

        let mut updated = config;
        let added = add_urls_to_config(&missing, &mut updated);
        if added > 0 {
            self.config_manager
                .save(updated)
                .context("Failed to save updated config")?;
            info!(
                "Added {} URL(s) to {}",
                added,
                self.config_manager.config_path().display()
            );
        }
        Ok(added)
    }
}
