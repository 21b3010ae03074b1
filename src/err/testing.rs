//! In-memory stand-ins for the ERR API.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use crate::err::models::ContentPage;
use crate::err::resolver::{ContentError, ContentSource};

/// Serves canned pages; unknown ids answer 404.
#[derive(Default)]
pub struct StaticSource {
    pages: HashMap<u64, Value>,
    statuses: HashMap<u64, StatusCode>,
    calls: AtomicUsize,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, id: u64, page: Value) -> Self {
        self.pages.insert(id, page);
        self
    }

    pub fn with_status(mut self, id: u64, status: StatusCode) -> Self {
        self.statuses.insert(id, status);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for StaticSource {
    async fn fetch_page(&self, content_id: u64) -> Result<ContentPage, ContentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.statuses.get(&content_id) {
            return Err(ContentError::Status(*status));
        }
        match self.pages.get(&content_id) {
            Some(page) => Ok(serde_json::from_value(page.clone())?),
            None => Err(ContentError::NotFound),
        }
    }
}

/// A standard single-episode page.
pub fn episode_page(heading: &str, season: u32, episode: u32, drm: bool) -> Value {
    serde_json::json!({
        "data": {
            "mainContent": {
                "heading": heading,
                "statsHeading": format!("{} ({})", heading, episode),
                "year": 2020,
                "season": season,
                "episode": episode,
                "medias": [{
                    "src": {"file": format!("//vod.err.ee/{}/{}.mp4", heading, episode)},
                    "restrictions": {"drm": drm}
                }]
            }
        }
    })
}

/// A series page listing `episode_ids` in a single season.
pub fn series_page(title: &str, episode_ids: &[u64]) -> Value {
    let contents: Vec<Value> = episode_ids.iter().map(|id| serde_json::json!({"id": id})).collect();
    serde_json::json!({
        "data": {
            "mainContent": {"heading": title, "statsSeriesTitle": title},
            "seasonList": {"items": [{"name": "1", "contents": contents}]}
        }
    })
}
