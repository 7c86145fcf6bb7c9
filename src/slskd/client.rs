use color_eyre::eyre::{Report, Result, WrapErr, eyre};
use reqwest::{Client, Method, Response};
use serde_json::json;
use url::Url;
use urlencoding::encode;

use crate::config::SlskdConfig;
use crate::ports::peer::PeerService;
use crate::slskd::types::{
    CreateSearch, DownloadRequest, SearchSnapshot, UserPresence, UserStatus, UserTransfers,
};

const API_KEY_HEADER: &str = "X-Api-Key";

/// HTTP adapter for the slskd REST API (`<url>/api/v0/...`).
///
/// Several base URLs may be configured; they are tried in order and the
/// first one that accepts a connection answers the call.
pub struct SlskdClient {
    client: Client,
    base_urls: Vec<Url>,
    api_key: String,
}

impl SlskdClient {
    pub fn new(config: &SlskdConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &SlskdConfig) -> Self {
        Self {
            client,
            base_urls: config.urls.clone(),
            api_key: config.api_key.clone(),
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Response> {
        let mut last_error = None;

        for base in &self.base_urls {
            let url = api_url(base, path)?;
            let mut request = self
                .client
                .request(method.clone(), url)
                .header(API_KEY_HEADER, &self.api_key);
            if let Some(body) = &body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    return response
                        .error_for_status()
                        .wrap_err_with(|| format!("slskd rejected {} {}", method, path));
                }
                Err(e) => {
                    tracing::warn!("Failed to reach slskd at {}: {}", base, e);
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => Report::new(e).wrap_err("Could not connect to any configured slskd instance"),
            None => eyre!("No slskd urls configured"),
        })
    }
}

/// Build `<base>/api/v0/<path>`, keeping any sub-path the base carries.
fn api_url(base: &Url, path: &str) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(&format!("api/v0/{}", path))
        .wrap_err_with(|| format!("Invalid slskd api path: {}", path))
}

#[async_trait::async_trait]
impl PeerService for SlskdClient {
    async fn create_search(&self, search_text: &str) -> Result<SearchSnapshot> {
        let body = serde_json::to_value(CreateSearch { search_text })?;
        self.send(Method::POST, "searches", Some(body))
            .await?
            .json::<SearchSnapshot>()
            .await
            .wrap_err("Failed to deserialize created search")
    }

    async fn list_searches(&self) -> Result<Vec<SearchSnapshot>> {
        self.send(Method::GET, "searches", None)
            .await?
            .json::<Vec<SearchSnapshot>>()
            .await
            .wrap_err("Failed to deserialize search list")
    }

    async fn get_search_with_responses(&self, search_id: &str) -> Result<SearchSnapshot> {
        let path = format!("searches/{}?includeResponses=true", encode(search_id));
        self.send(Method::GET, &path, None)
            .await?
            .json::<SearchSnapshot>()
            .await
            .wrap_err_with(|| format!("Failed to deserialize responses for search {}", search_id))
    }

    async fn complete_search(&self, search_id: &str) -> Result<()> {
        let path = format!("searches/{}", encode(search_id));
        self.send(Method::PUT, &path, None).await?;
        Ok(())
    }

    async fn user_presence(&self, username: &str) -> Result<UserPresence> {
        let path = format!("users/{}/status", encode(username));
        let status = self
            .send(Method::GET, &path, None)
            .await?
            .json::<UserStatus>()
            .await
            .wrap_err_with(|| format!("Failed to deserialize status of user {}", username))?;
        Ok(status.presence)
    }

    async fn list_downloads(&self, username: &str) -> Result<UserTransfers> {
        let path = format!("transfers/downloads/{}", encode(username));
        self.send(Method::GET, &path, None)
            .await?
            .json::<UserTransfers>()
            .await
            .wrap_err_with(|| format!("Failed to deserialize downloads for user {}", username))
    }

    async fn enqueue_download(&self, username: &str, file: &DownloadRequest) -> Result<()> {
        let path = format!("transfers/downloads/{}", encode(username));
        self.send(Method::POST, &path, Some(json!([file])))
            .await
            .wrap_err_with(|| format!("Failed to enqueue {} from {}", file.filename, username))?;
        Ok(())
    }

    async fn cancel_download(&self, username: &str, transfer_id: &str) -> Result<()> {
        // `remove=true` drops the record too, so a retry is the only entry left.
        let path = format!(
            "transfers/downloads/{}/{}?remove=true",
            encode(username),
            encode(transfer_id)
        );
        self.send(Method::DELETE, &path, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url_plain_host() {
        let base = Url::parse("http://localhost:5030").unwrap();
        let url = api_url(&base, "searches").unwrap();
        assert_eq!(url.as_str(), "http://localhost:5030/api/v0/searches");
    }

    #[test]
    fn test_api_url_keeps_sub_path() {
        let base = Url::parse("https://example.com/slskd").unwrap();
        let url = api_url(&base, "searches/abc?includeResponses=true").unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.com/slskd/api/v0/searches/abc?includeResponses=true"
        );
    }

    #[test]
    fn test_api_url_encoded_username() {
        let base = Url::parse("http://localhost:5030/").unwrap();
        let path = format!("users/{}/status", encode("dj shadow?"));
        let url = api_url(&base, &path).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:5030/api/v0/users/dj%20shadow%3F/status"
        );
    }

    #[test]
    fn test_api_url_cancel_removes_record() {
        let base = Url::parse("http://localhost:5030").unwrap();
        let path = format!(
            "transfers/downloads/{}/{}?remove=true",
            encode("peer"),
            encode("transfer-1")
        );
        let url = api_url(&base, &path).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:5030/api/v0/transfers/downloads/peer/transfer-1?remove=true"
        );
    }

    #[tokio::test]
    async fn test_send_without_urls_fails() {
        let client = SlskdClient::with_client(
            Client::new(),
            &SlskdConfig {
                urls: vec![],
                api_key: "key".to_string(),
                download_directory: "/tmp".to_string(),
            },
        );
        let err = client.list_searches().await.unwrap_err();
        assert!(err.to_string().contains("No slskd urls configured"));
    }
}
