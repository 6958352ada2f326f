//! ADO REST client: typed GET/POST/PATCH/DELETE scoped to one org/project.

use std::sync::Arc;
use std::time::Duration;

use adomcp_types::AdoClientError;
use serde::Serialize;
use serde_json::Value;

use crate::error::{map_http_status, map_reqwest_error, retry_after_seconds};
use crate::retry::{backoff, MAX_GET_ATTEMPTS};
use crate::token::{TokenProvider, ADO_RESOURCE_ID};

/// Default ADO REST API version requested on every call.
pub const DEFAULT_API_VERSION: &str = "7.1";

/// Deadline applied to GET requests.
const GET_TIMEOUT: Duration = Duration::from_secs(30);
/// Deadline applied to PATCH/POST/DELETE requests.
const WRITE_TIMEOUT: Duration = Duration::from_secs(60);

/// Typed HTTP client for one `(organization, project)` pair.
///
/// # Example
///
/// ```no_run
/// use adomcp_client::AdoClient;
/// use adomcp_client::token::StaticTokenProvider;
/// use std::sync::Arc;
///
/// let client = AdoClient::new("contoso", "widgets", Arc::new(StaticTokenProvider::new("pat")));
/// ```
pub struct AdoClient {
    organization: String,
    project: String,
    api_version: String,
    base_url: String,
    token_provider: Arc<dyn TokenProvider>,
    http: reqwest::Client,
}

impl AdoClient {
    /// Creates a client with the default base URL and API version `7.1`.
    #[must_use]
    pub fn new(
        organization: impl Into<String>,
        project: impl Into<String>,
        token_provider: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            organization: organization.into(),
            project: project.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            base_url: "https://dev.azure.com".to_string(),
            token_provider,
            http: reqwest::Client::new(),
        }
    }

    /// Overrides the API version string (default `"7.1"`).
    #[must_use]
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Overrides the base URL, useful for testing against a mock server.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn url(&self, rel_path: &str) -> String {
        format!(
            "{}/{}/{}/_apis/{}",
            self.base_url, self.organization, self.project, rel_path
        )
    }

    fn version_query_sep(rel_path: &str) -> char {
        if rel_path.contains('?') {
            '&'
        } else {
            '?'
        }
    }

    async fn token(&self) -> Result<String, AdoClientError> {
        self.token_provider.get_token(ADO_RESOURCE_ID).await
    }

    /// Issues a GET request, retrying on `NETWORK`/`UPSTREAM`/`RATE_LIMIT` up
    /// to [`MAX_GET_ATTEMPTS`] times with jittered exponential backoff.
    pub async fn get<T: serde::de::DeserializeOwned>(&self, rel_path: &str) -> Result<T, AdoClientError> {
        let url = format!(
            "{}{}api-version={}",
            self.url(rel_path),
            Self::version_query_sep(rel_path),
            self.api_version
        );

        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::debug!(url = %url, attempt, "ado get");
            let token = self.token().await?;
            let result = self
                .http
                .get(&url)
                .bearer_auth(&token)
                .timeout(GET_TIMEOUT)
                .send()
                .await;

            match self.finish::<T>(result).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < MAX_GET_ATTEMPTS && is_retryable(&err) => {
                    let delay = backoff(attempt);
                    tracing::warn!(url = %url, attempt, delay_ms = delay.as_millis() as u64, "retrying ado get");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Issues a POST request with a JSON body. Retries only on `NETWORK`.
    pub async fn post<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        rel_path: &str,
        body: &B,
    ) -> Result<T, AdoClientError> {
        self.write(reqwest::Method::POST, rel_path, Some(body), "application/json")
            .await
    }

    /// Issues a PATCH request with a `application/json-patch+json` body (or
    /// `content_type` if given). Retries only on `NETWORK`.
    pub async fn patch<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        rel_path: &str,
        body: &B,
        content_type: Option<&str>,
    ) -> Result<T, AdoClientError> {
        self.write(
            reqwest::Method::PATCH,
            rel_path,
            Some(body),
            content_type.unwrap_or("application/json-patch+json"),
        )
        .await
    }

    /// Issues a DELETE request. Retries only on `NETWORK`.
    pub async fn delete<T: serde::de::DeserializeOwned>(&self, rel_path: &str) -> Result<T, AdoClientError> {
        self.write::<(), T>(reqwest::Method::DELETE, rel_path, None, "application/json")
            .await
    }

    async fn write<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        rel_path: &str,
        body: Option<&B>,
        content_type: &str,
    ) -> Result<T, AdoClientError> {
        let url = format!(
            "{}{}api-version={}",
            self.url(rel_path),
            Self::version_query_sep(rel_path),
            self.api_version
        );

        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::debug!(url = %url, method = %method, attempt, "ado write");
            let token = self.token().await?;
            let mut request = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&token)
                .header("content-type", content_type)
                .timeout(WRITE_TIMEOUT);
            if let Some(body) = body {
                request = request.json(body);
            }

            let result = request.send().await;
            match self.finish::<T>(result).await {
                Ok(value) => return Ok(value),
                Err(AdoClientError::Network(msg)) if attempt < MAX_GET_ATTEMPTS => {
                    let delay = backoff(attempt);
                    tracing::warn!(url = %url, attempt, delay_ms = delay.as_millis() as u64, reason = %msg, "retrying ado write");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn finish<T: serde::de::DeserializeOwned>(
        &self,
        result: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<T, AdoClientError> {
        let response = result.map_err(map_reqwest_error)?;
        let status = response.status();
        let retry_after = retry_after_seconds(response.headers());
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.token_provider.invalidate().await;
        }
        let text = response.text().await.map_err(map_reqwest_error)?;
        if !status.is_success() {
            return Err(map_http_status(status, &text, retry_after));
        }
        if text.is_empty() {
            return serde_json::from_value(Value::Null).map_err(|e| AdoClientError::Decode(e.to_string()));
        }
        serde_json::from_str(&text).map_err(|e| AdoClientError::Decode(e.to_string()))
    }
}

fn is_retryable(err: &AdoClientError) -> bool {
    matches!(
        err,
        AdoClientError::Network(_) | AdoClientError::Upstream { .. } | AdoClientError::RateLimit { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::StaticTokenProvider;

    fn client() -> AdoClient {
        AdoClient::new("contoso", "widgets", Arc::new(StaticTokenProvider::new("pat")))
    }

    #[test]
    fn url_includes_org_and_project() {
        let client = client().base_url("http://localhost:9999");
        assert_eq!(
            client.url("wit/wiql"),
            "http://localhost:9999/contoso/widgets/_apis/wit/wiql"
        );
    }

    #[test]
    fn default_api_version_is_7_1() {
        assert_eq!(client().api_version, "7.1");
    }

    #[test]
    fn builder_overrides_api_version() {
        let client = client().api_version("7.2-preview");
        assert_eq!(client.api_version, "7.2-preview");
    }

    #[test]
    fn version_query_sep_depends_on_existing_query_string() {
        assert_eq!(AdoClient::version_query_sep("wit/wiql"), '?');
        assert_eq!(AdoClient::version_query_sep("wit/workitems?ids=1,2"), '&');
    }
}
