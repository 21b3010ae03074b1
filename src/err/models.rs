//! Serde view of the `getContentPageData` response.
//!
//! Only the fields the downloader reads are modelled. Everything is optional
//! because the API omits whole branches depending on the content type.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentPage {
    #[serde(default)]
    pub data: Option<PageData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageData {
    #[serde(default)]
    pub main_content: Option<MainContent>,
    #[serde(default)]
    pub season_list: Option<SeasonList>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainContent {
    #[serde(default)]
    pub heading: Option<String>,
    #[serde(default)]
    pub stats_heading: Option<String>,
    #[serde(default)]
    pub stats_series_title: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub year: Option<u32>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub season: Option<u32>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub episode: Option<u32>,
    #[serde(default)]
    pub medias: Vec<Media>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Media {
    #[serde(default)]
    pub src: Option<MediaSrc>,
    #[serde(default)]
    pub restrictions: Option<Restrictions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaSrc {
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Restrictions {
    #[serde(default)]
    pub drm: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeasonList {
    #[serde(default)]
    pub items: Vec<Season>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Season {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub contents: Option<Vec<SeasonContent>>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub first_content_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeasonContent {
    pub id: u64,
}

impl ContentPage {
    pub fn main_content(&self) -> Option<&MainContent> {
        self.data.as_ref()?.main_content.as_ref()
    }

    pub fn seasons(&self) -> &[Season] {
        self.data
            .as_ref()
            .and_then(|data| data.season_list.as_ref())
            .map(|list| list.items.as_slice())
            .unwrap_or_default()
    }
}

impl Season {
    /// Episode ids listed for this season, in API order.
    ///
    /// Seasons either carry their full `contents` list or only a pointer to
    /// their first episode.
    pub fn episode_ids(&self) -> Vec<u64> {
        match (&self.contents, self.first_content_id) {
            (Some(contents), _) => contents.iter().map(|c| c.id).collect(),
            (None, Some(first)) => vec![first],
            (None, None) => Vec::new(),
        }
    }

    /// The id a viewer lands on when opening the season.
    pub fn entry_id(&self) -> Option<u64> {
        self.first_content_id
            .or_else(|| self.contents.as_ref()?.first().map(|c| c.id))
    }
}

/// Accepts `12`, `"12"`, `null` or garbage; garbage becomes `None`.
fn lenient_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr + TryFrom<u64>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64().and_then(|n| T::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numbers_as_strings() {
        let content: MainContent =
            serde_json::from_value(json!({"year": "2021", "season": 2, "episode": null})).unwrap();
        assert_eq!(content.year, Some(2021));
        assert_eq!(content.season, Some(2));
        assert_eq!(content.episode, None);
    }

    #[test]
    fn test_season_shapes() {
        let page: ContentPage = serde_json::from_value(json!({
            "data": {
                "seasonList": {
                    "items": [
                        {"name": "1", "contents": [{"id": 10}, {"id": 11}]},
                        {"name": "2", "firstContentId": 20},
                        {"name": "3"}
                    ]
                }
            }
        }))
        .unwrap();

        let seasons = page.seasons();
        assert_eq!(seasons[0].episode_ids(), vec![10, 11]);
        assert_eq!(seasons[0].entry_id(), Some(10));
        assert_eq!(seasons[1].episode_ids(), vec![20]);
        assert_eq!(seasons[2].entry_id(), None);
    }

    #[test]
    fn test_empty_page() {
        let page: ContentPage = serde_json::from_value(json!({})).unwrap();
        assert!(page.main_content().is_none());
        assert!(page.seasons().is_empty());
    }
}
