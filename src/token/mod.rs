//! OAuth token record and its derived usability.
//!
//! A [`TokenRecord`] is what lives in the token file. [`TokenState`] is the
//! classification the client acts on before every authenticated call:
//!
//! ```text
//! NoToken ──exchange──▶ Valid ──time passes──▶ Stale ──refresh ok──▶ Valid
//!                         │                      │
//!                         └──────revoke──────────┴──▶ NoToken
//!                                                │
//!                                          refresh fails
//!                                                ▼
//!                                     Invalid (re-exchange required)
//! ```
//!
//! `Invalid` is never stored: it surfaces as a `Refresh` error and the file is
//! left as it was.

use crate::provider::TokenResponse;
use crate::store::JsonMap;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Stored OAuth token.
///
/// Optional fields are omitted when absent so that a merge-write of a refresh
/// response never clobbers a stored value with `null`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Bearer credential for protected endpoints
    pub access_token: String,

    /// Long-lived credential used to mint new access tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Lifetime in seconds as reported by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    /// Absolute expiry, UNIX seconds on disk
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "epoch_seconds"
    )]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Yahoo's stable user GUID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xoauth_yahoo_guid: Option<String>,

    /// Any other provider fields, kept verbatim
    #[serde(flatten)]
    pub extra: JsonMap,
}

impl TokenRecord {
    /// Builds a record from a token endpoint response received at `issued_at`.
    ///
    /// Returns `None` when `expires_in` puts the expiry outside the
    /// representable time range.
    pub fn issued(response: TokenResponse, issued_at: DateTime<Utc>) -> Option<Self> {
        let expires_at = match response.expires_in {
            Some(seconds) => Some(
                Duration::try_seconds(seconds)
                    .and_then(|lifetime| issued_at.checked_add_signed(lifetime))?,
            ),
            None => None,
        };

        Some(Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            token_type: response.token_type,
            expires_in: response.expires_in,
            expires_at,
            scope: response.scope,
            id_token: response.id_token,
            xoauth_yahoo_guid: response.xoauth_yahoo_guid,
            extra: response.extra,
        })
    }

    /// Parses a stored object. A shape we cannot use counts as no token.
    pub fn from_stored(map: JsonMap) -> Option<Self> {
        match serde_json::from_value(Value::Object(map)) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "Stored token has an unusable shape, ignoring");
                None
            }
        }
    }

    /// Serializes into the flat object written to the token file.
    pub fn to_stored(&self) -> JsonMap {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            // A struct with a flattened map always serializes to an object
            _ => JsonMap::new(),
        }
    }

    /// True once `now` reaches the expiry minus `leeway`.
    ///
    /// A token with no recorded expiry never counts as expired. A leeway
    /// reaching past the start of time counts as expired.
    pub fn is_expired(&self, now: DateTime<Utc>, leeway: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => match expires_at.checked_sub_signed(leeway) {
                Some(deadline) => now >= deadline,
                None => true,
            },
            None => false,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Overlays a refreshed record onto this one.
    ///
    /// Mirrors the store's merge-write: fields the refresh response carried
    /// replace ours, fields it omitted (a non-rotated `refresh_token`, `scope`)
    /// are kept.
    pub fn merge(&mut self, refreshed: TokenRecord) {
        self.access_token = refreshed.access_token;
        overlay(&mut self.refresh_token, refreshed.refresh_token);
        overlay(&mut self.token_type, refreshed.token_type);
        overlay(&mut self.expires_in, refreshed.expires_in);
        overlay(&mut self.expires_at, refreshed.expires_at);
        overlay(&mut self.scope, refreshed.scope);
        overlay(&mut self.id_token, refreshed.id_token);
        overlay(&mut self.xoauth_yahoo_guid, refreshed.xoauth_yahoo_guid);
        self.extra.extend(refreshed.extra);
    }
}

fn overlay<T>(current: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *current = incoming;
    }
}

/// Usability of the stored token at a point in time.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenState {
    /// Nothing on disk
    NoToken,
    /// Usable as-is
    Valid(TokenRecord),
    /// Expired; must be refreshed before use
    Stale(TokenRecord),
}

impl TokenState {
    pub fn classify(record: Option<TokenRecord>, now: DateTime<Utc>, leeway: Duration) -> Self {
        match record {
            None => TokenState::NoToken,
            Some(record) if record.is_expired(now, leeway) => TokenState::Stale(record),
            Some(record) => TokenState::Valid(record),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TokenState::NoToken => "no-token",
            TokenState::Valid(_) => "valid",
            TokenState::Stale(_) => "stale",
        }
    }

    pub fn record(&self) -> Option<&TokenRecord> {
        match self {
            TokenState::NoToken => None,
            TokenState::Valid(record) | TokenState::Stale(record) => Some(record),
        }
    }
}

/// `Option<DateTime<Utc>>` as UNIX seconds.
///
/// Accepts fractional seconds on read, as written by other OAuth tooling.
mod epoch_seconds {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_i64(dt.timestamp()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(seconds) = Option::<f64>::deserialize(deserializer)? else {
            return Ok(None);
        };
        if !seconds.is_finite() {
            return Err(de::Error::custom("expires_at is not a finite number"));
        }
        DateTime::from_timestamp(seconds.trunc() as i64, 0)
            .map(Some)
            .ok_or_else(|| de::Error::custom("expires_at is out of range"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: Value) -> TokenResponse {
        serde_json::from_value(value).unwrap()
    }

    fn stored(value: Value) -> JsonMap {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_issued_derives_expiry() {
        let now = Utc::now();
        let record = TokenRecord::issued(
            response(json!({
                "access_token": "A",
                "refresh_token": "R",
                "expires_in": 3600,
                "token_type": "bearer"
            })),
            now,
        )
        .unwrap();

        assert_eq!(record.expires_at, Some(now + Duration::seconds(3600)));
        assert!(!record.is_expired(now, Duration::zero()));
        assert!(record.is_expired(now + Duration::seconds(3600), Duration::zero()));
        assert!(record.can_refresh());
    }

    #[test]
    fn test_leeway_brings_expiry_forward() {
        let now = Utc::now();
        let record = TokenRecord::issued(
            response(json!({ "access_token": "A", "expires_in": 60 })),
            now,
        )
        .unwrap();

        assert!(!record.is_expired(now, Duration::zero()));
        assert!(record.is_expired(now, Duration::seconds(90)));
    }

    #[test]
    fn test_no_expiry_is_never_expired() {
        let record =
            TokenRecord::issued(response(json!({ "access_token": "A" })), Utc::now()).unwrap();

        assert!(record.expires_at.is_none());
        assert!(!record.is_expired(Utc::now() + Duration::days(365), Duration::zero()));
        assert!(!record.can_refresh());
    }

    #[test]
    fn test_out_of_range_lifetime_is_rejected() {
        let now = Utc::now();

        for seconds in [i64::MAX, i64::MIN, 9_999_999_999_999_999] {
            let issued = TokenRecord::issued(
                response(json!({ "access_token": "A", "expires_in": seconds })),
                now,
            );
            assert!(issued.is_none(), "expires_in {} accepted", seconds);
        }
    }

    #[test]
    fn test_oversized_leeway_counts_as_expired() {
        let now = Utc::now();
        let record = TokenRecord::issued(
            response(json!({ "access_token": "A", "expires_in": 3600 })),
            now,
        )
        .unwrap();

        assert!(record.is_expired(now, Duration::MAX));
    }

    #[test]
    fn test_stored_shape_round_trips_extra_fields() {
        let map = stored(json!({
            "access_token": "A",
            "refresh_token": "R",
            "expires_at": 1700000000,
            "xoauth_yahoo_guid": "GUID",
            "custom": { "nested": true }
        }));

        let record = TokenRecord::from_stored(map.clone()).unwrap();
        assert_eq!(record.xoauth_yahoo_guid.as_deref(), Some("GUID"));
        assert_eq!(record.extra["custom"], json!({ "nested": true }));
        assert_eq!(record.to_stored(), map);
    }

    #[test]
    fn test_fractional_expires_at_is_accepted() {
        let record = TokenRecord::from_stored(stored(json!({
            "access_token": "A",
            "expires_at": 1700000000.75
        })))
        .unwrap();

        assert_eq!(record.expires_at.unwrap().timestamp(), 1700000000);
    }

    #[test]
    fn test_stored_without_access_token_is_unusable() {
        let map = stored(json!({ "refresh_token": "R" }));
        assert!(TokenRecord::from_stored(map).is_none());
    }

    #[test]
    fn test_to_stored_omits_absent_fields() {
        let record =
            TokenRecord::issued(response(json!({ "access_token": "A" })), Utc::now()).unwrap();
        let map = record.to_stored();

        assert_eq!(map.len(), 1);
        assert_eq!(map["access_token"], json!("A"));
    }

    #[test]
    fn test_merge_keeps_unreturned_fields() {
        let now = Utc::now();
        let mut current = TokenRecord::issued(
            response(json!({
                "access_token": "old",
                "refresh_token": "R",
                "expires_in": 3600,
                "scope": "openid email profile",
                "token_type": "bearer"
            })),
            now - Duration::hours(2),
        )
        .unwrap();
        let refreshed = TokenRecord::issued(
            response(json!({ "access_token": "new", "expires_in": 3600 })),
            now,
        )
        .unwrap();

        current.merge(refreshed);

        assert_eq!(current.access_token, "new");
        assert_eq!(current.refresh_token.as_deref(), Some("R"));
        assert_eq!(current.scope.as_deref(), Some("openid email profile"));
        assert_eq!(current.token_type.as_deref(), Some("bearer"));
        assert_eq!(current.expires_at, Some(now + Duration::seconds(3600)));
    }

    #[test]
    fn test_classify() {
        let now = Utc::now();
        let fresh = TokenRecord::issued(
            response(json!({ "access_token": "A", "expires_in": 3600 })),
            now,
        )
        .unwrap();
        let old = TokenRecord::issued(
            response(json!({ "access_token": "A", "expires_in": 3600 })),
            now - Duration::hours(2),
        )
        .unwrap();

        assert_eq!(
            TokenState::classify(None, now, Duration::zero()),
            TokenState::NoToken
        );
        assert_eq!(
            TokenState::classify(Some(fresh.clone()), now, Duration::zero()),
            TokenState::Valid(fresh)
        );
        let state = TokenState::classify(Some(old.clone()), now, Duration::zero());
        assert_eq!(state.label(), "stale");
        assert_eq!(state.record(), Some(&old));
    }
}
