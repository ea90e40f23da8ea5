//! Provider endpoints and wire types.
//!
//! Everything the provider sends back is decoded into a typed structure here,
//! so a malformed body fails at the boundary instead of deep in the client.

use crate::store::JsonMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;

/// Production authorization server
pub const DEFAULT_API_BASE_URL: &str = "https://api.login.yahoo.com";

/// Scopes requested on every authorization
pub const SCOPES: &[&str] = &["openid", "email", "profile"];

/// Length of the generated anti-forgery state token
const STATE_LENGTH: usize = 30;

/// Provider endpoint table, resolved against a base URL.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderEndpoints {
    /// Browser redirect target for user consent
    pub authorize_url: String,

    /// Code exchange and refresh
    pub token_url: String,

    /// OpenID Connect user info
    pub userinfo_url: String,

    /// Grant revocation
    pub revoke_url: String,
}

impl ProviderEndpoints {
    pub fn with_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            authorize_url: format!("{}/oauth2/request_auth", base),
            token_url: format!("{}/oauth2/get_token", base),
            userinfo_url: format!("{}/openid/v1/userinfo", base),
            revoke_url: format!("{}/oauth2/revoke", base),
        }
    }

    /// Build authorization URL with state and redirect_uri
    pub fn build_auth_url(&self, client_id: &str, redirect_uri: &str, state: &str) -> String {
        let scopes = SCOPES.join(" ");
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            self.authorize_url,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        )
    }
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self::with_base_url(DEFAULT_API_BASE_URL)
    }
}

/// Generates a fresh anti-forgery `state` value.
pub fn generate_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LENGTH)
        .map(char::from)
        .collect()
}

/// Token endpoint response (code exchange and refresh)
#[derive(Clone, Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub xoauth_yahoo_guid: Option<String>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// Error body returned by the provider on a rejected request
#[derive(Clone, Debug, Deserialize)]
pub struct ProviderErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl ProviderErrorResponse {
    /// Best-effort description of a failed response body.
    ///
    /// Uses the standard `error`/`error_description` pair when present and
    /// falls back to the raw body text.
    pub fn describe(body: &[u8]) -> String {
        match serde_json::from_slice::<ProviderErrorResponse>(body) {
            Ok(ProviderErrorResponse {
                error,
                error_description: Some(description),
            }) => format!("{} - {}", error, description),
            Ok(ProviderErrorResponse { error, .. }) => error,
            Err(_) => {
                let text = String::from_utf8_lossy(body).trim().to_string();
                if text.is_empty() {
                    "Unknown error".to_string()
                } else {
                    text
                }
            }
        }
    }
}
