use serde::Deserialize;

use crate::{error::SyncError, sync::VideoRef};

const SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    id: ItemId,
    snippet: Snippet,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemId {
    video_id: Option<String>,
}

#[derive(Deserialize)]
struct Snippet {
    title: String,
    thumbnails: Thumbnails,
}

#[derive(Deserialize)]
struct Thumbnails {
    medium: Thumbnail,
}

#[derive(Deserialize)]
struct Thumbnail {
    url: String,
}

/// Catalog search against the YouTube Data API.
#[derive(Clone)]
pub struct YouTubeSearch {
    http_client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
    max_results: u32,
}

impl YouTubeSearch {
    pub fn new(api_key: Option<String>, max_results: u32) -> YouTubeSearch {
        YouTubeSearch {
            http_client: reqwest::Client::new(),
            api_key,
            endpoint: SEARCH_URL.to_owned(),
            max_results,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> YouTubeSearch {
        self.endpoint = endpoint.into();
        self
    }

    /// Blank text searches nothing. Any failure drops the whole result.
    pub async fn search(&self, text: &str) -> Result<Vec<VideoRef>, SyncError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let Some(api_key) = &self.api_key else {
            return Err(SyncError::SearchFailed("no YouTube API key configured".to_owned()));
        };

        let max_results = self.max_results.to_string();
        let body = self
            .http_client
            .get(&self.endpoint)
            .query(&[
                ("key", api_key.as_str()),
                ("part", "snippet"),
                ("type", "video"),
                ("maxResults", max_results.as_str()),
                ("q", text),
            ])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(SyncError::search)?
            .text()
            .await
            .map_err(SyncError::search)?;

        let results = parse_results(&body)?;
        tracing::debug!(query = text, results = results.len(), "video search");
        Ok(results)
    }
}

pub fn parse_results(body: &str) -> Result<Vec<VideoRef>, SyncError> {
    let response: SearchResponse = serde_json::from_str(body).map_err(SyncError::search)?;
    Ok(response
        .items
        .into_iter()
        .filter_map(|item| {
            Some(VideoRef {
                video_id: item.id.video_id?,
                title: item.snippet.title,
                thumbnail: item.snippet.thumbnails.medium.url,
            })
        })
        .collect())
}
