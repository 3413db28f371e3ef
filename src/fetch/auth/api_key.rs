use crate::fetch::client::HttpClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};

/// An [`HttpClient`] wrapper that injects an access token as an HTTP header.
///
/// The header is validated when the wrapper is built, so a malformed token is
/// reported up front instead of at send time.
pub struct ApiKey<C> {
    inner: C,
    header_name: HeaderName,
    value: HeaderValue,
}

impl<C> ApiKey<C> {
    pub fn new(inner: C, header_name: &str, value: &str) -> Result<Self> {
        let header_name = HeaderName::from_bytes(header_name.as_bytes())
            .with_context(|| format!("invalid header name '{header_name}'"))?;
        let mut value =
            HeaderValue::from_str(value).context("access token is not a valid header value")?;
        value.set_sensitive(true);
        Ok(Self {
            inner,
            header_name,
            value,
        })
    }

    /// `Authorization: Bearer <token>`, the scheme used by dataset hubs.
    pub fn bearer(inner: C, token: &str) -> Result<Self> {
        Self::new(inner, AUTHORIZATION.as_str(), &format!("Bearer {token}"))
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for ApiKey<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut()
            .insert(self.header_name.clone(), self.value.clone());
        self.inner.execute(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Option<String>>);

    #[async_trait]
    impl HttpClient for Recorder {
        async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            let auth = req
                .headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            *self.0.lock().unwrap() = auth;
            Ok(http::Response::new("ok").into())
        }
    }

    #[tokio::test]
    async fn test_bearer_injects_authorization_header() {
        let client = ApiKey::bearer(Recorder::default(), "hf_secret").unwrap();
        let req = reqwest::Request::new(
            reqwest::Method::GET,
            "https://example.org/data.parquet".parse().unwrap(),
        );
        client.execute(req).await.unwrap();

        assert_eq!(
            client.inner.0.lock().unwrap().as_deref(),
            Some("Bearer hf_secret")
        );
    }

    #[test]
    fn test_rejects_token_with_newline() {
        assert!(ApiKey::bearer(Recorder::default(), "bad\ntoken").is_err());
    }
}
