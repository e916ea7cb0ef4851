//! HTTP implementation of [`RemoteBuildClient`] against the server's v1 API.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::{ContentFilter, RemoteBuildClient, TaskStatus};
use crate::content::ContentItem;
use crate::error::RemoteError;

#[derive(Debug, Deserialize)]
struct BuildOutput {
    task_id: String,
}

/// Talks to `<server>/__api__/v1/...` with an API key.
#[derive(Debug, Clone)]
pub struct ConnectClient {
    api_base: Url,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl ConnectClient {
    pub fn new(server_url: &str, api_key: Option<String>) -> Result<Self, RemoteError> {
        let api_base = api_base_url(server_url)?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("connect-build/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            api_base,
            api_key,
            http,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
        self.api_base
            .join(path)
            .map_err(|_| RemoteError::InvalidUrl(format!("{}{}", self.api_base, path)))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(reqwest::header::AUTHORIZATION, format!("Key {}", key)),
            None => request,
        }
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        url: &Url,
    ) -> Result<T, RemoteError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                message: error_message(&body),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl RemoteBuildClient for ConnectClient {
    async fn submit_build(
        &self,
        guid: &str,
        bundle_id: Option<&str>,
    ) -> Result<String, RemoteError> {
        let url = self.endpoint(&format!("v1/content/{}/build", guid))?;
        let body = serde_json::json!({ "bundle_id": bundle_id });
        let output: BuildOutput = self
            .send(self.http.post(url.clone()).json(&body), &url)
            .await?;
        Ok(output.task_id)
    }

    async fn poll_task(
        &self,
        task_id: &str,
        first: Option<u64>,
    ) -> Result<TaskStatus, RemoteError> {
        let mut url = self.endpoint(&format!("v1/tasks/{}", task_id))?;
        if let Some(first) = first {
            url.query_pairs_mut()
                .append_pair("first", &first.to_string());
        }
        self.send(self.http.get(url.clone()), &url).await
    }

    async fn fetch_content_items(
        &self,
        filter: &ContentFilter,
    ) -> Result<Vec<ContentItem>, RemoteError> {
        match filter {
            ContentFilter::Guid(guid) => {
                let url = self.endpoint(&format!("v1/content/{}", guid))?;
                let item: ContentItem = self.send(self.http.get(url.clone()), &url).await?;
                Ok(vec![item])
            }
            ContentFilter::All => {
                let url = self.endpoint("v1/content")?;
                self.send(self.http.get(url.clone()), &url).await
            }
        }
    }
}

/// `https://host/connect` -> `https://host/connect/__api__/`
fn api_base_url(server_url: &str) -> Result<Url, RemoteError> {
    let mut url =
        Url::parse(server_url).map_err(|_| RemoteError::InvalidUrl(server_url.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(RemoteError::InvalidUrl(server_url.to_string()));
    }
    let path = url.path().trim_end_matches('/').to_string();
    let path = path.strip_suffix("/__api__").unwrap_or(&path).to_string();
    url.set_path(&format!("{}/__api__/", path));
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Pull the `error` field out of a JSON error body when there is one.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
