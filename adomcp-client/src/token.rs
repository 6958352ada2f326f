//! Token acquisition collaborator consumed by [`crate::AdoClient`].

use adomcp_types::AdoClientError;
use async_trait::async_trait;

/// Azure DevOps resource id used when requesting an AAD access token.
pub const ADO_RESOURCE_ID: &str = "499b84ac-1321-427f-aa17-267ca6975798";

/// Supplies bearer tokens for ADO requests, refreshing as needed.
///
/// Implementations are expected to cache the token internally and refresh
/// it ahead of expiry; [`AdoClient`](crate::AdoClient) calls `get_token` on
/// every request and does not cache on its own.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a bearer token valid for `resource`, refreshing if necessary.
    async fn get_token(&self, resource: &str) -> Result<String, AdoClientError>;

    /// Forces a refresh on the next call, used after an `AUTH` response.
    async fn invalidate(&self);
}

/// A [`TokenProvider`] that always returns a fixed token. Useful for tests
/// and for personal-access-token deployments where no refresh is needed.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    /// Wraps a pre-obtained token (e.g. a PAT) with no refresh behavior.
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self, _resource: &str) -> Result<String, AdoClientError> {
        Ok(self.token.clone())
    }

    async fn invalidate(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_returns_fixed_token() {
        let provider = StaticTokenProvider::new("abc123");
        let token = provider.get_token(ADO_RESOURCE_ID).await.unwrap();
        assert_eq!(token, "abc123");
    }
}
