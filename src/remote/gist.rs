//! GitHub Gist backend
//!
//! Requires the `gist` feature to be enabled.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, RETRY_AFTER, USER_AGENT};
use reqwest::Method;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Credential, FileUpdates, RemoteConnector, RemoteResult, RemoteStore};
use crate::error::RemoteError;
use crate::types::RemoteDocument;

const CLIENT_USER_AGENT: &str = "cursor-sync";

/// Gist REST client bound to one access token
pub struct GistClient {
    client: reqwest::Client,
    base_url: String,
    credential: Credential,
}

impl GistClient {
    pub fn new(base_url: impl Into<String>, credential: Credential) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, credential)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>, credential: Credential) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential,
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
    ) -> RemoteResult<T> {
        let url = format!("{}{}", self.base_url, endpoint);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(AUTHORIZATION, format!("token {}", self.credential.expose()))
            .header(ACCEPT, "application/vnd.github.v3+json")
            .header(USER_AGENT, CLIENT_USER_AGENT);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::network(e.to_string()))?;

        let status = response.status();
        if let Some(remaining) = response.headers().get("X-RateLimit-Remaining") {
            tracing::trace!("{} {}: rate limit remaining {:?}", method, endpoint, remaining);
        }

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            #[derive(Deserialize)]
            struct ErrorBody {
                message: Option<String>,
            }
            let body_message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|b| b.message);

            let err = RemoteError::from_status(status.as_u16(), retry_after.as_deref(), body_message);
            tracing::debug!("{} {} failed: {}", method, endpoint, err);
            return Err(err);
        }

        response.json::<T>().await.map_err(|e| {
            RemoteError::new(
                crate::error::FailureCategory::Unknown,
                format!("Failed to parse response JSON: {}", e),
            )
        })
    }
}

#[async_trait]
impl RemoteStore for GistClient {
    async fn validate_credential(&self) -> RemoteResult<()> {
        self.request::<IgnoredAny>(Method::GET, "/gists?per_page=1", None)
            .await
            .map(|_| ())
    }

    async fn list_page(&self, page: u32, per_page: u32) -> RemoteResult<Vec<RemoteDocument>> {
        let endpoint = format!("/gists?per_page={}&page={}", per_page, page);
        self.request(Method::GET, &endpoint, None).await
    }

    async fn get(&self, id: &str) -> RemoteResult<RemoteDocument> {
        self.request(Method::GET, &format!("/gists/{}", id), None).await
    }

    async fn create(
        &self,
        files: &BTreeMap<String, String>,
        description: &str,
    ) -> RemoteResult<RemoteDocument> {
        let files: serde_json::Map<String, Value> = files
            .iter()
            .map(|(name, content)| (name.clone(), json!({ "content": content })))
            .collect();
        let body = json!({
            "description": description,
            "public": false,
            "files": files,
        });
        self.request(Method::POST, "/gists", Some(body)).await
    }

    async fn update(&self, id: &str, files: &FileUpdates) -> RemoteResult<RemoteDocument> {
        let files: serde_json::Map<String, Value> = files
            .iter()
            .map(|(name, content)| {
                let value = match content {
                    Some(content) => json!({ "content": content }),
                    None => Value::Null,
                };
                (name.clone(), value)
            })
            .collect();
        self.request(Method::PATCH, &format!("/gists/{}", id), Some(json!({ "files": files })))
            .await
    }
}

/// Builds a [`GistClient`] per credential, sharing one connection pool
#[derive(Clone)]
pub struct GistConnector {
    client: reqwest::Client,
    base_url: String,
}

impl GistConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl RemoteConnector for GistConnector {
    fn connect(&self, credential: &Credential) -> Arc<dyn RemoteStore> {
        Arc::new(GistClient::with_client(
            self.client.clone(),
            self.base_url.clone(),
            credential.clone(),
        ))
    }
}
