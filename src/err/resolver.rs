//! Turns ERR content ids into downloadable media descriptions.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::err::models::ContentPage;

static VIDEO_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"/(\d+)(?:/|$)").expect("valid regex"));

/// Error types for metadata fetches
#[derive(Error, Debug)]
pub enum ContentError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Content not found (404)")]
    NotFound,

    #[error("HTTP error: {0}")]
    Status(StatusCode),

    #[error("Invalid JSON response: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where a target's files are grouped on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Series,
    Standalone,
}

impl ContentKind {
    pub fn directory_name(&self) -> &'static str {
        match self {
            ContentKind::Series => "tv_shows",
            ContentKind::Standalone => "movies",
        }
    }
}

/// Media ready to be transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    /// Folder the file is grouped under.
    pub group: String,
    /// File stem; also the name the skip-existing check looks for.
    pub title: String,
    pub media_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    Resolved(ResolvedMedia),
    DrmBlocked,
    NotFound,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesOutcome {
    Listing {
        name: Option<String>,
        episode_ids: Vec<u64>,
    },
    NotFound,
}

impl SeriesOutcome {
    fn empty() -> Self {
        SeriesOutcome::Listing {
            name: None,
            episode_ids: Vec::new(),
        }
    }
}

/// Provider of raw content pages.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_page(&self, content_id: u64) -> Result<ContentPage, ContentError>;
}

/// [`ContentSource`] backed by the public ERR API.
pub struct HttpContentSource {
    client: Client,
    api_base: String,
}

impl HttpContentSource {
    pub fn new(client: Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into(),
        }
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn fetch_page(&self, content_id: u64) -> Result<ContentPage, ContentError> {
        debug!("Fetching content page for content_id: {}", content_id);
        let response = self
            .client
            .get(&self.api_base)
            .query(&[("contentId", content_id)])
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(ContentError::NotFound),
            status if !status.is_success() => Err(ContentError::Status(status)),
            _ => {
                let body = response.bytes().await?;
                Ok(serde_json::from_slice(&body)?)
            }
        }
    }
}

/// Parses the numeric content id out of a show or video URL.
pub fn extract_reference(url: &str) -> Option<u64> {
    let captures = VIDEO_ID.captures(url)?;
    match captures[1].parse::<u64>() {
        Ok(id) if id > 0 => {
            debug!("Extracted video ID: {}", id);
            Some(id)
        }
        _ => {
            error!("Invalid video ID format in {}", url);
            None
        }
    }
}

/// Resolves content ids into media or episode listings.
pub struct ContentResolver {
    source: Arc<dyn ContentSource>,
}

impl ContentResolver {
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self { source }
    }

    pub async fn resolve_media(&self, content_id: u64, kind: ContentKind) -> ResolveOutcome {
        info!("Fetching video details for content_id: {}", content_id);

        let page = match self.source.fetch_page(content_id).await {
            Ok(page) => page,
            Err(ContentError::NotFound) => return ResolveOutcome::NotFound,
            Err(e) => {
                error!("Failed to fetch video details: {}", e);
                return ResolveOutcome::Error(e.to_string());
            }
        };

        let Some(content) = page.main_content() else {
            return ResolveOutcome::Error("response has no mainContent".to_string());
        };

        let primary = content.medias.first();
        if primary
            .and_then(|media| media.restrictions.as_ref())
            .is_some_and(|r| r.drm)
        {
            warn!("Content {} is DRM protected, skipping", content_id);
            return ResolveOutcome::DrmBlocked;
        }

        let Some(heading) = content.heading.as_deref().filter(|h| !h.trim().is_empty()) else {
            return ResolveOutcome::Error("response has no heading".to_string());
        };

        let Some(file) = primary
            .and_then(|media| media.src.as_ref())
            .and_then(|src| src.file.as_deref())
        else {
            error!("Failed to extract media URL for content {}", content_id);
            return ResolveOutcome::Error("response has no media file".to_string());
        };

        let group = heading.replace('.', "");
        let title = match (kind, content.season, content.episode) {
            (ContentKind::Series, Some(season), Some(episode)) if season > 0 && episode > 0 => {
                with_year(format!("{} S{:02}E{:02}", group.trim(), season, episode), content.year)
            }
            _ => {
                let base = content
                    .stats_heading
                    .as_deref()
                    .filter(|h| !h.trim().is_empty())
                    .unwrap_or(heading);
                with_year(base.to_string(), content.year)
            }
        };

        let media = ResolvedMedia {
            group: sanitize_filename(&group),
            title: sanitize_filename(&title),
            media_url: format!("https:{}", file.replace('\\', "")),
        };
        info!("Video details: {}", media.title);
        debug!("MP4 URL: {}", media.media_url);

        ResolveOutcome::Resolved(media)
    }

    /// Flattens every season of a series into one ordered list of episode ids.
    pub async fn resolve_series(&self, series_id: u64) -> SeriesOutcome {
        info!("Fetching series data for ID: {}", series_id);

        let page = match self.source.fetch_page(series_id).await {
            Ok(page) => page,
            Err(ContentError::NotFound) => return SeriesOutcome::NotFound,
            Err(e) => {
                error!("Failed to get series data: {}", e);
                return SeriesOutcome::empty();
            }
        };

        let name = page
            .main_content()
            .and_then(|c| c.stats_series_title.as_deref().or(c.heading.as_deref()))
            .map(|n| n.replace('.', "").trim().to_string())
            .filter(|n| !n.is_empty());

        let seasons = page.seasons();
        if !seasons.is_empty() {
            info!("Found {} seasons", seasons.len());
        }

        let mut episode_ids = Vec::new();
        for season in seasons {
            let ids = season.episode_ids();
            info!(
                "Season '{}': {} episodes",
                season.name.as_deref().unwrap_or("Unknown"),
                ids.len()
            );
            episode_ids.extend(ids);
        }

        if !episode_ids.is_empty() {
            info!("Total: {} episodes from all seasons", episode_ids.len());
        }

        SeriesOutcome::Listing { name, episode_ids }
    }

    /// Season entry ids of the series `series_id` belongs to.
    pub async fn season_entry_ids(&self, series_id: u64) -> Result<Vec<u64>, ContentError> {
        let page = self.source.fetch_page(series_id).await?;
        Ok(page.seasons().iter().filter_map(|s| s.entry_id()).collect())
    }
}

fn with_year(base: String, year: Option<u32>) -> String {
    match year {
        Some(year) if year > 0 => format!("{} {}", base, year),
        _ => base,
    }
}

/// Sanitizes a name to be safe for use in file systems
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}
