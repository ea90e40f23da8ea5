//! HTTP boundary.
//!
//! The client only ever sends form-encoded POSTs; what varies is the
//! credential attached. Statuses are never turned into errors here, the
//! client decides what each status means per operation.

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Credential attached to an outgoing request
#[derive(Clone, Copy, Debug)]
pub enum Auth<'a> {
    None,
    Basic { username: &'a str, password: &'a str },
    Bearer(&'a str),
}

/// Status and body of a provider response
#[derive(Clone, Debug)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// The provider answers every accepted request with exactly 200
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Network operations the OAuth client needs.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POSTs `form` as `application/x-www-form-urlencoded` to `url`.
    ///
    /// # Returns
    /// * `Ok(RawResponse)` - Any HTTP status, including 4xx/5xx
    /// * `Err` - Network-level failure only
    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        auth: Auth<'_>,
    ) -> Result<RawResponse>;
}

/// [`Transport`] backed by `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        auth: Auth<'_>,
    ) -> Result<RawResponse> {
        let request = self
            .client
            .post(url)
            .header("Accept", "application/json")
            .form(form);

        let request = match auth {
            Auth::None => request,
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
            Auth::Bearer(token) => request.bearer_auth(token),
        };

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        debug!(url = %url, status = status, body_len = body.len(), "Provider responded");

        Ok(RawResponse { status, body })
    }
}
