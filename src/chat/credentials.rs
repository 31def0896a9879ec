//! Access token cell for the chat API.
//!
//! Acquiring and refreshing tokens happens elsewhere; whoever does it pushes
//! the new token in through [`TokenObserver`]. Nothing here polls.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tracing::info;

/// Tokens this close to expiry (seconds) are treated as already expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// An OAuth bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    #[must_use]
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        let skew = Duration::seconds(EXPIRY_SKEW_SECS);
        !self.token.is_empty() && self.expires_at.is_none_or(|at| at - skew > now)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Callback the external auth collaborator invokes on every token event.
pub trait TokenObserver: Send + Sync {
    fn on_token_refreshed(&self, token: AccessToken);

    fn on_token_revoked(&self);
}

/// Current access token, shared between the chat client and the control surface.
#[derive(Debug)]
pub struct Credentials {
    current: watch::Sender<Option<AccessToken>>,
}

impl Credentials {
    #[must_use]
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self { current }
    }

    #[must_use]
    pub fn with_token(token: AccessToken) -> Self {
        let (current, _) = watch::channel(Some(token));
        Self { current }
    }

    /// Bearer token, if one is present and not expired.
    #[must_use]
    pub fn bearer(&self) -> Option<String> {
        let now = Utc::now();
        self.current
            .borrow()
            .as_ref()
            .filter(|t| t.is_valid_at(now))
            .map(|t| t.token.clone())
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.bearer().is_some()
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenObserver for Credentials {
    fn on_token_refreshed(&self, token: AccessToken) {
        info!("access token refreshed (expires {:?})", token.expires_at);
        self.current.send_replace(Some(token));
    }

    fn on_token_revoked(&self) {
        info!("access token revoked");
        self.current.send_replace(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_credentials_are_invalid() {
        let creds = Credentials::new();
        assert!(!creds.is_valid());
        assert_eq!(creds.bearer(), None);
    }

    #[test]
    fn token_without_expiry_is_valid() {
        let creds = Credentials::with_token(AccessToken::new("abc", None));
        assert_eq!(creds.bearer().as_deref(), Some("abc"));
    }

    #[test]
    fn expired_token_is_invalid() {
        let past = Utc::now() - Duration::minutes(5);
        let creds = Credentials::with_token(AccessToken::new("abc", Some(past)));
        assert!(!creds.is_valid());
    }

    #[test]
    fn token_inside_skew_is_invalid() {
        let soon = Utc::now() + Duration::seconds(30);
        let creds = Credentials::with_token(AccessToken::new("abc", Some(soon)));
        assert!(!creds.is_valid());
    }

    #[test]
    fn observer_replaces_token() {
        let creds = Credentials::new();
        let later = Utc::now() + Duration::hours(1);

        creds.on_token_refreshed(AccessToken::new("fresh", Some(later)));
        assert_eq!(creds.bearer().as_deref(), Some("fresh"));

        creds.on_token_revoked();
        assert!(!creds.is_valid());
    }

    #[test]
    fn debug_redacts_token() {
        let token = AccessToken::new("secret-value", None);
        assert!(!format!("{token:?}").contains("secret-value"));
    }
}
