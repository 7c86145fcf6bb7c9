//! Song search against the YouTube Music web client API.

use color_eyre::{Result, eyre::Context};
use reqwest::Client;
use serde_json::{Value, json};

use crate::ports::fallback::FallbackSong;

const SEARCH_URL: &str = "https://music.youtube.com/youtubei/v1/search?prettyPrint=false";
const CLIENT_NAME: &str = "WEB_REMIX";
const CLIENT_VERSION: &str = "1.20241127.01.00";
/// Restricts results to the "Songs" shelf.
const SONGS_FILTER: &str = "EgWKAQIIAWoMEA4QChADEAQQCRAF";
const ARTIST_PAGE_TYPE: &str = "MUSIC_PAGE_TYPE_ARTIST";

pub struct YtMusicSearch {
    client: Client,
    region: String,
}

impl YtMusicSearch {
    pub fn new(client: Client, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
        }
    }

    fn search_body(&self, query: &str) -> Value {
        json!({
            "context": {
                "client": {
                    "clientName": CLIENT_NAME,
                    "clientVersion": CLIENT_VERSION,
                    "hl": "en",
                    "gl": self.region,
                }
            },
            "query": query,
            "params": SONGS_FILTER,
        })
    }

    pub async fn search_songs(&self, query: &str) -> Result<Vec<FallbackSong>> {
        let response = self
            .client
            .post(SEARCH_URL)
            .header("Origin", "https://music.youtube.com")
            .json(&self.search_body(query))
            .send()
            .await
            .wrap_err("Failed to reach YouTube Music search")?
            .error_for_status()
            .wrap_err("YouTube Music search was rejected")?
            .json::<Value>()
            .await
            .wrap_err("Failed to deserialize YouTube Music search response")?;

        Ok(parse_search_response(&response))
    }
}

/// Extract songs from a search response. Shelves or rows that don't look
/// like songs are skipped rather than failing the whole parse.
pub fn parse_search_response(response: &Value) -> Vec<FallbackSong> {
    let mut songs = Vec::new();
    collect_shelves(response, &mut songs);
    songs
}

fn collect_shelves(value: &Value, songs: &mut Vec<FallbackSong>) {
    match value {
        Value::Object(map) => {
            if let Some(shelf) = map.get("musicShelfRenderer") {
                if let Some(items) = shelf.get("contents").and_then(Value::as_array) {
                    songs.extend(
                        items
                            .iter()
                            .filter_map(|item| item.get("musicResponsiveListItemRenderer"))
                            .filter_map(parse_song),
                    );
                }
                return;
            }
            for child in map.values() {
                collect_shelves(child, songs);
            }
        }
        Value::Array(items) => {
            for child in items {
                collect_shelves(child, songs);
            }
        }
        _ => {}
    }
}

fn column_runs(renderer: &Value, index: usize) -> Option<&Vec<Value>> {
    renderer
        .get("flexColumns")?
        .get(index)?
        .get("musicResponsiveListItemFlexColumnRenderer")?
        .get("text")?
        .get("runs")?
        .as_array()
}

fn parse_song(renderer: &Value) -> Option<FallbackSong> {
    let id = renderer
        .pointer("/playlistItemData/videoId")
        .and_then(Value::as_str)?
        .to_string();

    let title = column_runs(renderer, 0)?
        .first()?
        .get("text")?
        .as_str()?
        .to_string();

    let artists = column_runs(renderer, 1)
        .map(|runs| {
            runs.iter()
                .filter(|run| {
                    run.pointer(
                        "/navigationEndpoint/browseEndpoint/browseEndpointContextSupportedConfigs/browseEndpointContextMusicConfig/pageType",
                    )
                    .and_then(Value::as_str)
                        == Some(ARTIST_PAGE_TYPE)
                })
                .filter_map(|run| run.get("text").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(FallbackSong { id, title, artists })
}
