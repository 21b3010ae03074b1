//! Drives a whole run: targets in, [`RunReport`] out.
//!
//! Each target is expanded into episodes (or handled as a single video) and
//! every episode goes through the same pipeline: cache check, resolution,
//! skip-existing check, transfer, ledger update. Episodes of one series run
//! on a bounded pool; the number of concurrent transfers never exceeds
//! [`AppConfig::worker_count`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::engine::cache::DownloadCache;
use crate::engine::config_loader::AppConfig;
use crate::engine::report::{RunReport, TransferOutcome};
use crate::engine::transfer::{MediaTransfer, existing_file_len};
use crate::err::discovery::extract_show_slug;
use crate::err::resolver::sanitize_filename;
use crate::err::{ContentKind, ContentResolver, ResolveOutcome, SeriesOutcome, extract_reference};

/// One configured URL and the shelf it belongs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub reference: String,
    pub kind: ContentKind,
    /// Series name to use when the API does not provide a title.
    pub group_hint: Option<String>,
}

impl DownloadTarget {
    pub fn new(reference: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            reference: reference.into(),
            kind,
            group_hint: None,
        }
    }

    pub fn with_group_hint(mut self, hint: Option<String>) -> Self {
        self.group_hint = hint;
        self
    }
}

/// Series URLs first, then movies, in config order. Series targets carry
/// the show slug from their URL as a group hint.
pub fn targets_from_config(config: &AppConfig) -> Vec<DownloadTarget> {
    let tv_shows = config.targets.tv_shows.iter().map(|url| {
        DownloadTarget::new(url, ContentKind::Series).with_group_hint(extract_show_slug(url))
    });
    let movies = config
        .targets
        .movies
        .iter()
        .map(|url| DownloadTarget::new(url, ContentKind::Standalone));
    tv_shows.chain(movies).collect()
}

#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<AppConfig>,
    cache: Arc<DownloadCache>,
    resolver: Arc<ContentResolver>,
    transfer: Arc<dyn MediaTransfer>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<AppConfig>,
        cache: Arc<DownloadCache>,
        resolver: Arc<ContentResolver>,
        transfer: Arc<dyn MediaTransfer>,
    ) -> Self {
        Self {
            config,
            cache,
            resolver,
            transfer,
        }
    }

    /// Processes every target. Never aborts early; failures land in the report.
    pub async fn run(&self, targets: &[DownloadTarget]) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", run_id = %run_id);

        async {
            let series = targets.iter().filter(|t| t.kind == ContentKind::Series).count();
            info!(
                "Total URLs to process: {} (TV Shows: {}, Movies: {})",
                targets.len(),
                series,
                targets.len() - series
            );

            let mut report = RunReport::new();
            for target in targets {
                let span = info_span!("target", url = %target.reference);
                self.process_target(target, &mut report).instrument(span).await;
            }
            report
        }
        .instrument(span)
        .await
    }

    async fn process_target(&self, target: &DownloadTarget, report: &mut RunReport) {
        info!("{}", "=".repeat(80));
        info!("Processing URL: {}", target.reference);

        let Some(content_id) = extract_reference(&target.reference) else {
            error!("Failed to extract video ID from {}", target.reference);
            report.record(
                format!("URL: {}", target.reference),
                &TransferOutcome::Failed("failed to extract video ID".to_string()),
            );
            return;
        };

        if !self.config.download.download_all_episodes {
            info!("Downloading single video");
            self.process_single(content_id, target, report).await;
            return;
        }

        info!("Fetching all episodes from series...");
        match self.resolver.resolve_series(content_id).await {
            SeriesOutcome::NotFound => {
                warn!("Content removed upstream, skipping: {}", target.reference);
                report.record(format!("URL: {}", target.reference), &TransferOutcome::NotFound);
            }
            SeriesOutcome::Listing { name, episode_ids } if !episode_ids.is_empty() => {
                let series = name.or_else(|| target.group_hint.clone());
                self.process_episodes(&episode_ids, target.kind, series, report).await;
            }
            SeriesOutcome::Listing { name, .. } => {
                let title = name.map(|n| format!(" '{}'", n)).unwrap_or_default();
                warn!(
                    "No episodes found for{} {} (ID: {}), trying single video...",
                    title, target.reference, content_id
                );
                self.process_single(content_id, target, report).await;
            }
        }
    }

    async fn process_single(&self, content_id: u64, target: &DownloadTarget, report: &mut RunReport) {
        let outcome = self.process_episode(content_id, target.kind, None).await;
        if outcome.is_failure() {
            error!("Failed to download video from {}", target.reference);
        }
        report.record(
            format!("Video ID {} from {}", content_id, target.reference),
            &outcome,
        );
    }

    async fn process_episodes(
        &self,
        episode_ids: &[u64],
        kind: ContentKind,
        series: Option<String>,
        report: &mut RunReport,
    ) {
        let workers = self.config.worker_count();
        let series_label = series.as_deref().unwrap_or("Unknown");
        info!(
            "[{}] Starting download of {} episodes with {} workers",
            series_label,
            episode_ids.len(),
            workers
        );

        let label = |episode_id: u64| match &series {
            Some(name) => format!("{} - Episode ID {}", name, episode_id),
            None => format!("Episode ID {}", episode_id),
        };

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        let mut task_episodes = HashMap::new();

        for &episode_id in episode_ids {
            let worker = self.clone();
            let semaphore = semaphore.clone();
            let series = series.clone();
            let span = info_span!("episode", episode_id);

            let handle = tasks.spawn(
                async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return TransferOutcome::Failed("worker pool closed".to_string());
                    };
                    worker.process_episode(episode_id, kind, series.as_deref()).await
                }
                .instrument(span),
            );
            task_episodes.insert(handle.id(), episode_id);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let (episode_id, outcome) = match joined {
                Ok((task_id, outcome)) => (task_episodes.get(&task_id).copied(), outcome),
                Err(e) => {
                    error!("Episode worker crashed: {}", e);
                    (
                        task_episodes.get(&e.id()).copied(),
                        TransferOutcome::Failed(format!("worker crashed: {}", e)),
                    )
                }
            };

            let label = episode_id
                .map(&label)
                .unwrap_or_else(|| format!("[{}] unknown episode", series_label));
            if outcome.is_failure() {
                error!("Failed to download: {}", label);
            }
            report.record(label, &outcome);
        }
    }

    /// Runs one id through cache check, resolution and transfer.
    async fn process_episode(
        &self,
        content_id: u64,
        kind: ContentKind,
        series: Option<&str>,
    ) -> TransferOutcome {
        let key = content_id.to_string();
        let skip_existing = self.config.download.skip_existing;

        if skip_existing {
            if let Some(path) = self.cache.is_downloaded(&key) {
                info!("Episode {} already downloaded (cached), skipping", content_id);
                return TransferOutcome::Skipped(path);
            }
        }

        let media = match self.resolver.resolve_media(content_id, kind).await {
            ResolveOutcome::Resolved(media) => media,
            ResolveOutcome::DrmBlocked => return TransferOutcome::DrmBlocked,
            ResolveOutcome::NotFound => return TransferOutcome::NotFound,
            ResolveOutcome::Error(reason) => return TransferOutcome::Failed(reason),
        };

        let group = series
            .map(sanitize_filename)
            .filter(|name| !name.is_empty())
            .unwrap_or(media.group);
        let destination = self.destination(kind, &group, &media.title);

        if skip_existing && existing_file_len(&destination).is_some() {
            info!("File already exists, skipping: {}", destination.display());
            self.cache.mark_downloaded(&key, &destination);
            return TransferOutcome::Skipped(destination);
        }

        match self
            .transfer
            .fetch_to_file(&media.media_url, &destination, &media.title)
            .await
        {
            Ok(_) => {
                self.cache.mark_downloaded(&key, &destination);
                TransferOutcome::Success(destination)
            }
            Err(e) => {
                error!("Download failed for {}: {}", media.title, e);
                TransferOutcome::Failed(e.to_string())
            }
        }
    }

    fn destination(&self, kind: ContentKind, group: &str, title: &str) -> PathBuf {
        self.config
            .download_dir()
            .join(kind.directory_name())
            .join(group)
            .join(format!("{}.mp4", title))
    }
}
