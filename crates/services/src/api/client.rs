use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::envelope::ApiEnvelope;
use crate::auth::AuthState;
use crate::error::ApiError;

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Shared HTTP client for the exam backend.
///
/// Attaches the current bearer token from [`AuthState`] to every request and
/// unwraps [`ApiEnvelope`] responses.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    auth: Arc<AuthState>,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns `ApiError::Http` if the underlying client cannot be built.
    pub fn new(base_url: Url, timeout: Duration, auth: Arc<AuthState>) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: with_trailing_slash(base_url),
            auth,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves `path` relative to the base URL.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Url` if the path cannot be joined.
    pub fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// # Errors
    ///
    /// Returns `ApiError` on transport failures, rejections or undecodable bodies.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.client.get(self.endpoint(path)?);
        self.send(request).await
    }

    /// POSTs `body` as JSON. `idempotency_key` lets the backend deduplicate retries.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failures, rejections or undecodable bodies.
    pub async fn post<B, T>(
        &self,
        path: &str,
        body: &B,
        idempotency_key: Option<&str>,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.client.post(self.endpoint(path)?).json(body);
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_HEADER, key);
        }
        self.send(request).await
    }

    async fn send<T: DeserializeOwned>(&self, mut request: RequestBuilder) -> Result<T, ApiError> {
        if let Some(token) = self.auth.token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;

        match serde_json::from_slice::<ApiEnvelope<T>>(&bytes) {
            Ok(envelope) => envelope.into_result(status),
            Err(_) if !(200..300).contains(&status) => Err(ApiError::Rejected {
                status,
                message: body_snippet(&bytes),
            }),
            Err(err) => Err(ApiError::Decode(err)),
        }
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn body_snippet(bytes: &[u8]) -> String {
    const MAX: usize = 200;
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    if text.is_empty() {
        return "empty response body".into();
    }
    text.chars().take(MAX).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kwave_core::Clock;
    use storage::repository::InMemoryRepository;

    fn client(base: &str) -> ApiClient {
        let auth = Arc::new(AuthState::new(
            Arc::new(InMemoryRepository::new()),
            Clock::default(),
        ));
        ApiClient::new(Url::parse(base).unwrap(), Duration::from_secs(1), auth).unwrap()
    }

    #[test]
    fn endpoints_keep_the_base_path() {
        let api = client("https://api.kwave.test/v1");
        assert_eq!(
            api.endpoint("exam-results").unwrap().as_str(),
            "https://api.kwave.test/v1/exam-results"
        );
        assert_eq!(
            api.endpoint("/exam-sets/3").unwrap().as_str(),
            "https://api.kwave.test/v1/exam-sets/3"
        );
    }

    #[test]
    fn snippet_is_bounded() {
        let long = "x".repeat(1_000);
        assert_eq!(body_snippet(long.as_bytes()).len(), 200);
        assert_eq!(body_snippet(b"  "), "empty response body");
    }
}
