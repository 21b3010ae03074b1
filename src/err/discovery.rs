//! Finds seasons of tracked shows that are not in the config yet.
//!
//! Discovery only reads from the API. It never downloads and never touches
//! the download cache; its output is a set of candidate URLs that can be
//! appended to `targets.tv_shows`.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::engine::config_loader::AppConfig;
use crate::err::resolver::{ContentResolver, extract_reference};

static SHOW_SLUG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/\d+/([^/?#]+)").expect("valid regex"));

/// Missing season URLs keyed by show slug.
pub type MissingSeasons = BTreeMap<String, BTreeSet<String>>;

/// The path segment after the numeric id, e.g. `babulja` in `/1038081/babulja`.
pub fn extract_show_slug(url: &str) -> Option<String> {
    SHOW_SLUG
        .captures(url)
        .map(|captures| captures[1].to_string())
        .filter(|slug| !slug.is_empty())
}

pub struct Discovery {
    resolver: Arc<ContentResolver>,
    site_base: String,
}

impl Discovery {
    pub fn new(resolver: Arc<ContentResolver>, site_base: impl Into<String>) -> Self {
        Self {
            resolver,
            site_base: site_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Candidate URLs for every season of the show `content_id` belongs to.
    pub async fn find_season_urls(&self, content_id: u64, slug: &str) -> BTreeSet<String> {
        match self.resolver.season_entry_ids(content_id).await {
            Ok(ids) => ids
                .into_iter()
                .map(|id| format!("{}/{}/{}", self.site_base, id, slug))
                .collect(),
            Err(e) => {
                warn!("Failed to list seasons for {} ({}): {}", slug, content_id, e);
                BTreeSet::new()
            }
        }
    }

    pub async fn discover_missing(&self, known_urls: &[String]) -> MissingSeasons {
        let mut shows: BTreeMap<String, BTreeSet<u64>> = BTreeMap::new();
        let mut known_ids = HashSet::new();

        for url in known_urls {
            let (Some(slug), Some(id)) = (extract_show_slug(url), extract_reference(url)) else {
                warn!("Skipping URL without id/slug: {}", url);
                continue;
            };
            known_ids.insert(id);
            shows.entry(slug).or_default().insert(id);
        }

        let mut missing = MissingSeasons::new();
        for (slug, ids) in shows {
            let mut candidates = BTreeSet::new();
            for id in ids {
                candidates.extend(self.find_season_urls(id, &slug).await);
            }

            let new_urls: BTreeSet<String> = candidates
                .into_iter()
                .filter(|url| extract_reference(url).is_some_and(|id| !known_ids.contains(&id)))
                .collect();

            if !new_urls.is_empty() {
                info!("[{}] {} new season URL(s)", slug, new_urls.len());
                for url in &new_urls {
                    info!("  - {}", url);
                }
                missing.insert(slug, new_urls);
            }
        }

        missing
    }
}

/// Appends unseen URLs to `targets.tv_shows`; returns how many were added.
pub fn add_urls_to_config(missing: &MissingSeasons, config: &mut AppConfig) -> usize {
    let mut added = 0;
    for url in missing.values().flatten() {
        if !config.targets.tv_shows.contains(url) {
            config.targets.tv_shows.push(url.clone());
            info!("Added: {}", url);
            added += 1;
        }
    }

    if added > 0 {
        config.targets.tv_shows.sort();
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::err::testing::StaticSource;
    use serde_json::json;

    const SITE: &str = "https://jupiter.err.ee";

    fn show_page() -> serde_json::Value {
        json!({
            "data": {
                "mainContent": {"heading": "Babulja"},
                "seasonList": {"items": [
                    {"name": "1", "firstContentId": 100},
                    {"name": "2", "contents": [{"id": 200}, {"id": 201}]},
                    {"name": "3", "firstContentId": 300}
                ]}
            }
        })
    }

    fn discovery(source: StaticSource) -> Discovery {
        let resolver = Arc::new(ContentResolver::new(Arc::new(source)));
        Discovery::new(resolver, format!("{}/", SITE))
    }

    #[test]
    fn test_extract_show_slug() {
        assert_eq!(
            extract_show_slug("https://jupiter.err.ee/1038081/babulja").as_deref(),
            Some("babulja")
        );
        assert_eq!(
            extract_show_slug("https://jupiter.err.ee/1038081/babulja/").as_deref(),
            Some("babulja")
        );
        assert_eq!(extract_show_slug("https://jupiter.err.ee/1038081"), None);
    }

    #[tokio::test]
    async fn test_find_season_urls() {
        let discovery = discovery(StaticSource::new().with_page(100, show_page()));
        let urls = discovery.find_season_urls(100, "babulja").await;

        let expected: BTreeSet<String> = [100, 200, 300]
            .iter()
            .map(|id| format!("{}/{}/babulja", SITE, id))
            .collect();
        assert_eq!(urls, expected);
    }

    #[tokio::test]
    async fn test_discover_missing_only_reports_new_ids() {
        let source = StaticSource::new()
            .with_page(100, show_page())
            .with_page(300, show_page());
        let discovery = discovery(source);

        let known = vec![
            format!("{}/100/babulja", SITE),
            format!("{}/300/babulja", SITE),
        ];
        let missing = discovery.discover_missing(&known).await;

        assert_eq!(missing.len(), 1);
        assert_eq!(
            missing["babulja"],
            BTreeSet::from([format!("{}/200/babulja", SITE)])
        );
    }

    #[tokio::test]
    async fn test_complete_show_is_omitted() {
        let source = StaticSource::new().with_page(
            100,
            json!({"data": {"seasonList": {"items": [{"firstContentId": 100}]}}}),
        );
        let discovery = discovery(source);

        let missing = discovery.discover_missing(&[format!("{}/100/film", SITE)]).await;
        assert!(missing.is_empty());
    }

    #[test]
    fn test_add_urls_to_config_sorts_and_dedups() {
        let mut config = AppConfig::default();
        config.targets.tv_shows = vec![format!("{}/300/b", SITE)];

        let mut missing = MissingSeasons::new();
        missing.insert(
            "b".to_string(),
            BTreeSet::from([format!("{}/100/b", SITE), format!("{}/300/b", SITE)]),
        );

        assert_eq!(add_urls_to_config(&missing, &mut config), 1);
        assert_eq!(
            config.targets.tv_shows,
            vec![format!("{}/100/b", SITE), format!("{}/300/b", SITE)]
        );
    }
}
