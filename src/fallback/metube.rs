use color_eyre::{
    Result,
    eyre::{Report, WrapErr, eyre},
};
use reqwest::{Client, Method, Response};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::ports::fallback::{FallbackJob, FallbackJobStatus};

#[derive(Debug, Serialize)]
pub(crate) struct AddRequest<'a> {
    pub url: String,
    pub quality: &'a str,
    pub format: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddResponse {
    pub status: String,
    #[serde(default)]
    pub msg: Option<String>,
}

/// `GET history`; only `done` matters here.
#[derive(Debug, Deserialize)]
pub(crate) struct History {
    #[serde(default)]
    pub done: Vec<HistoryEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryEntry {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub status: String,
}

impl HistoryEntry {
    fn into_job(self) -> FallbackJob {
        let status = if self.status == "finished" {
            FallbackJobStatus::Finished
        } else {
            FallbackJobStatus::Failed
        };
        FallbackJob {
            id: self.id,
            title: self.title,
            filename: self.filename,
            status,
        }
    }
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://music.youtube.com/watch?v={}", video_id)
}

/// Minimal client for a MeTube instance (`<url>/add`, `<url>/history`).
pub struct MetubeClient {
    client: Client,
    base_urls: Vec<Url>,
}

impl MetubeClient {
    pub fn new(client: Client, base_urls: Vec<Url>) -> Self {
        Self { client, base_urls }
    }

    async fn send(&self, method: Method, path: &str, body: Option<&AddRequest<'_>>) -> Result<Response> {
        let mut last_error = None;

        for base in &self.base_urls {
            let url = endpoint(base, path)?;
            let mut request = self.client.request(method.clone(), url);
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    return response
                        .error_for_status()
                        .wrap_err_with(|| format!("MeTube rejected {} {}", method, path));
                }
                Err(e) => {
                    tracing::warn!("Failed to reach MeTube at {}: {}", base, e);
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => Report::new(e).wrap_err("Could not connect to any configured MeTube instance"),
            None => eyre!("No MeTube urls configured"),
        })
    }

    pub async fn add(&self, video_id: &str, quality: &str, format: &str) -> Result<()> {
        let body = AddRequest {
            url: watch_url(video_id),
            quality,
            format,
        };
        let response = self
            .send(Method::POST, "add", Some(&body))
            .await?
            .json::<AddResponse>()
            .await
            .wrap_err("Failed to deserialize MeTube add response")?;

        if response.status != "ok" {
            return Err(eyre!(
                "MeTube refused {}: {}",
                body.url,
                response.msg.unwrap_or(response.status)
            ));
        }
        Ok(())
    }

    pub async fn finished_jobs(&self) -> Result<Vec<FallbackJob>> {
        let history = self
            .send(Method::GET, "history", None)
            .await?
            .json::<History>()
            .await
            .wrap_err("Failed to deserialize MeTube history")?;
        Ok(history.done.into_iter().map(HistoryEntry::into_job).collect())
    }
}

fn endpoint(base: &Url, path: &str) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path)
        .wrap_err_with(|| format!("Invalid MeTube path: {}", path))
}
