//! OAuth client core.
//!
//! Orchestrates the authorization-code flow against a single provider:
//!
//! 1. `authorization_url` → user consents in the browser
//! 2. Provider redirects back with `code`
//! 3. `exchange_code` → token persisted to the token file
//! 4. `get_user_info` → refreshes first if stale, then calls user info
//! 5. `revoke_grant` → token file removed on success
//!
//! There is no long-lived session. Each authenticated call loads the stored
//! token, passes it through [`OAuthClient::ensure_fresh`], and uses whatever
//! record comes back. Refreshing persists exactly once, inside
//! [`OAuthClient::refresh`].

use crate::config::{ClientConfig, ClientCredentials};
use crate::error::{OAuthError, Result};
use crate::provider::{generate_state, ProviderEndpoints, ProviderErrorResponse, TokenResponse};
use crate::store::{JsonFile, JsonMap};
use crate::token::{TokenRecord, TokenState};
use crate::transport::{Auth, HttpTransport, RawResponse, Transport};
use chrono::{Duration, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};


/// Authorization URL together with the anti-forgery state embedded in it.
///
/// The state is handed back so a caller that verifies the callback can
/// compare it; the client itself never checks it.
#[derive(Clone, Debug)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// Claims returned by the user info endpoint
pub type UserInfo = JsonMap;

/// OAuth 2.0 client for the authorization-code flow.
pub struct OAuthClient {
    credentials: ClientCredentials,
    endpoints: ProviderEndpoints,
    token_store: JsonFile,
    info_store: JsonFile,
    refresh_leeway: Duration,
    transport: Box<dyn Transport>,
}

impl OAuthClient {
    /// Creates a client backed by the `reqwest` transport.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.http_timeout)?;
        Ok(Self::with_transport(config, Box::new(transport)))
    }

    /// Creates a client over any [`Transport`].
    pub fn with_transport(config: ClientConfig, transport: Box<dyn Transport>) -> Self {
        Self {
            endpoints: ProviderEndpoints::with_base_url(&config.api_base_url),
            token_store: JsonFile::new(config.token_file),
            info_store: JsonFile::new(config.info_file),
            refresh_leeway: config.refresh_leeway,
            credentials: config.credentials,
            transport,
        }
    }

    pub fn endpoints(&self) -> &ProviderEndpoints {
        &self.endpoints
    }

    fn basic_auth(&self) -> Auth<'_> {
        Auth::Basic {
            username: &self.credentials.client_id,
            password: &self.credentials.client_secret,
        }
    }

    /// Builds the URL the user visits to grant consent.
    pub fn authorization_url(&self) -> AuthorizationRequest {
        let state = generate_state();
        let url = self.endpoints.build_auth_url(
            &self.credentials.client_id,
            &self.credentials.redirect_uri,
            &state,
        );

        debug!(state = %state, "Built authorization URL");

        AuthorizationRequest { url, state }
    }

    /// Exchanges an authorization code for a token and persists it.
    ///
    /// # Returns
    /// * `Ok(TokenRecord)` - Token issued and written to the token file
    /// * `Err(TokenExchange)` - Provider rejected the code or sent a malformed body
    /// * `Err(Transport)` - Network failure
    pub async fn exchange_code(&self, code: &str) -> Result<TokenRecord> {
        let code = code.trim();
        if code.is_empty() {
            return Err(OAuthError::TokenExchange {
                status: None,
                detail: "authorization code is empty".to_string(),
            });
        }

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("redirect_uri", self.credentials.redirect_uri.as_str()),
        ];

        debug!(token_url = %self.endpoints.token_url, "Exchanging authorization code for token");

        let response = self
            .transport
            .post_form(&self.endpoints.token_url, &form, Auth::None)
            .await?;

        if !response.is_ok() {
            return Err(OAuthError::TokenExchange {
                status: Some(response.status),
                detail: ProviderErrorResponse::describe(&response.body),
            });
        }

        let record = issue_token(&response).map_err(|detail| OAuthError::TokenExchange {
            status: Some(response.status),
            detail,
        })?;
        self.token_store.write(&record.to_stored())?;

        info!(
            has_refresh_token = record.can_refresh(),
            expires_in = ?record.expires_in,
            "Token exchange successful"
        );

        Ok(record)
    }

    /// Loads the stored token, if any.
    pub fn load_token(&self) -> Result<Option<TokenRecord>> {
        Ok(self.token_store.read()?.and_then(TokenRecord::from_stored))
    }

    fn require_token(&self) -> Result<TokenRecord> {
        self.load_token()?.ok_or_else(|| OAuthError::NoToken {
            path: self.token_store.path().to_path_buf(),
        })
    }

    /// Classifies the stored token without touching the network.
    pub fn token_state(&self) -> Result<TokenState> {
        Ok(TokenState::classify(
            self.load_token()?,
            Utc::now(),
            self.refresh_leeway,
        ))
    }

    /// Returns `token` unchanged when fresh, otherwise refreshes it first.
    pub async fn ensure_fresh(&self, token: TokenRecord) -> Result<TokenRecord> {
        match TokenState::classify(Some(token), Utc::now(), self.refresh_leeway) {
            TokenState::Valid(token) => Ok(token),
            TokenState::Stale(token) => {
                debug!(expires_at = ?token.expires_at, "Access token expired, refreshing");
                self.refresh(token).await
            }
            // classify only yields NoToken for None
            TokenState::NoToken => Err(OAuthError::NoToken {
                path: self.token_store.path().to_path_buf(),
            }),
        }
    }

    /// Exchanges the refresh token for a new access token.
    ///
    /// Persists only the fields the provider returned (merge-write), so a
    /// non-rotated `refresh_token` and any other stored fields survive. The
    /// returned record is `token` with the response overlaid.
    ///
    /// # Returns
    /// * `Ok(TokenRecord)` - Refreshed and persisted
    /// * `Err(Refresh)` - No refresh token, or provider rejected it; nothing is written
    pub async fn refresh(&self, mut token: TokenRecord) -> Result<TokenRecord> {
        let refresh_token = match token.refresh_token.as_deref() {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => {
                return Err(OAuthError::Refresh {
                    status: None,
                    detail: "stored token has no refresh_token".to_string(),
                })
            }
        };

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("redirect_uri", self.credentials.redirect_uri.as_str()),
        ];

        info!("Refreshing OAuth token");

        let response = self
            .transport
            .post_form(&self.endpoints.token_url, &form, self.basic_auth())
            .await?;

        if !response.is_ok() {
            let detail = ProviderErrorResponse::describe(&response.body);
            warn!(status = response.status, detail = %detail, "Token refresh rejected");
            return Err(OAuthError::Refresh {
                status: Some(response.status),
                detail,
            });
        }

        let refreshed = issue_token(&response).map_err(|detail| OAuthError::Refresh {
            status: Some(response.status),
            detail,
        })?;
        self.token_store.write(&refreshed.to_stored())?;

        info!(
            rotated_refresh_token = refreshed.refresh_token.is_some(),
            "OAuth token refreshed successfully"
        );

        token.merge(refreshed);
        Ok(token)
    }

    /// Forces a refresh of the stored token regardless of its expiry.
    pub async fn refresh_stored(&self) -> Result<TokenRecord> {
        let token = self.require_token()?;
        self.refresh(token).await
    }

    /// Fetches the authenticated user's claims.
    ///
    /// Any non-200 answer yields an empty map rather than an error, and leaves
    /// the info file untouched. Missing token, failed refresh and network
    /// errors still propagate.
    pub async fn get_user_info(&self) -> Result<UserInfo> {
        let token = self.require_token()?;
        let token = self.ensure_fresh(token).await?;

        let response = self
            .transport
            .post_form(
                &self.endpoints.userinfo_url,
                &[],
                Auth::Bearer(&token.access_token),
            )
            .await?;

        if !response.is_ok() {
            warn!(
                status = response.status,
                detail = %ProviderErrorResponse::describe(&response.body),
                "User info request failed"
            );
            return Ok(UserInfo::new());
        }

        let userinfo = match serde_json::from_slice::<Value>(&response.body) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(OAuthError::MalformedResponse(
                    "user info is not a JSON object".to_string(),
                ))
            }
            Err(e) => {
                return Err(OAuthError::MalformedResponse(format!(
                    "user info is not valid JSON: {}",
                    e
                )))
            }
        };

        self.info_store.write(&userinfo)?;

        info!(claims = userinfo.len(), "User info retrieved");

        Ok(userinfo)
    }

    /// Revokes the grant using the stored refresh token.
    ///
    /// # Returns
    /// * `Ok(true)` - Provider accepted; token file deleted
    /// * `Ok(false)` - Provider declined (the endpoint may not be implemented); nothing deleted
    /// * `Err(NoToken)` - No token, or no refresh token to revoke
    pub async fn revoke_grant(&self) -> Result<bool> {
        let token = self.require_token()?;
        let refresh_token = match token.refresh_token.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => {
                return Err(OAuthError::NoToken {
                    path: self.token_store.path().to_path_buf(),
                })
            }
        };

        let form = [
            ("token", refresh_token),
            ("token_type_hint", "refresh_token"),
        ];

        let response = self
            .transport
            .post_form(&self.endpoints.revoke_url, &form, self.basic_auth())
            .await?;

        if response.is_ok() {
            self.token_store.delete()?;
            info!("Grant revoked, token removed");
            return Ok(true);
        }

        warn!(
            status = response.status,
            detail = %ProviderErrorResponse::describe(&response.body),
            "Grant revocation declined"
        );
        Ok(false)
    }
}

/// Decodes a token endpoint body into a record issued now.
fn issue_token(response: &RawResponse) -> std::result::Result<TokenRecord, String> {
    let token_response: TokenResponse = serde_json::from_slice(&response.body)
        .map_err(|e| format!("malformed token response: {}", e))?;
    TokenRecord::issued(token_response, Utc::now())
        .ok_or_else(|| "expires_in is out of range".to_string())
}
