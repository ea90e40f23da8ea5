//! Error taxonomy for the OAuth client.

use std::path::PathBuf;

/// Errors produced by the OAuth client library.
///
/// Two provider failures are deliberately *not* errors: a non-200 user-info
/// response yields an empty map, and a non-200 revocation yields `false`.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    /// A required setting is missing or unparseable
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No token stored on disk (or the stored token cannot be used for this operation)
    #[error("No token found at {}: run `exchange-code` first", .path.display())]
    NoToken { path: PathBuf },

    /// The provider rejected the authorization code, or answered with a malformed body
    #[error("Token exchange failed{}: {detail}", status_suffix(.status))]
    TokenExchange { status: Option<u16>, detail: String },

    /// The provider rejected the refresh; the stored token must be re-exchanged
    #[error("Token refresh failed{}: {detail}", status_suffix(.status))]
    Refresh { status: Option<u16>, detail: String },

    /// Filesystem failure other than a missing or corrupt file
    #[error("Storage error at {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Network-level failure talking to the provider
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Provider answered 200 with a body we cannot interpret
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" with status {}", code),
        None => String::new(),
    }
}

impl OAuthError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OAuthError::Storage {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, OAuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_in_message() {
        let err = OAuthError::TokenExchange {
            status: Some(400),
            detail: "invalid_grant".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Token exchange failed with status 400: invalid_grant"
        );

        let err = OAuthError::Refresh {
            status: None,
            detail: "no refresh token".to_string(),
        };
        assert_eq!(err.to_string(), "Token refresh failed: no refresh token");
    }

    #[test]
    fn test_no_token_message_names_path() {
        let err = OAuthError::NoToken {
            path: PathBuf::from("/tmp/token.json"),
        };
        assert!(err.to_string().contains("/tmp/token.json"));
    }
}
