use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TokenGrant;

/// A stored set of Meta app credentials plus any token obtained for them.
///
/// `access_token` and `token_expiry` are a pair: both present after a
/// successful authentication, both absent otherwise. `install_token` and
/// `clear_token` are the only mutation points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub app_id: String,
    pub app_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Absolute expiry instant in milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expiry: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_account_id: Option<String>,
}

impl Profile {
    pub fn new(
        name: impl Into<String>,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            access_token: None,
            token_expiry: None,
            ad_account_id: None,
        }
    }

    pub fn with_ad_account_id(mut self, ad_account_id: impl Into<String>) -> Self {
        self.ad_account_id = Some(ad_account_id.into());
        self
    }

    /// Record the finished token, deriving the expiry from the issue instant.
    pub fn install_token(&mut self, grant: &TokenGrant, issued_at: DateTime<Utc>) {
        self.access_token = Some(grant.access_token.clone());
        self.token_expiry = Some(issued_at.timestamp_millis() + grant.expires_in * 1000);
    }

    /// Forget the token pair while keeping the app identity.
    pub fn clear_token(&mut self) {
        self.access_token = None;
        self.token_expiry = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn token_expired(&self, now: DateTime<Utc>) -> bool {
        match self.token_expiry {
            Some(expiry) => now.timestamp_millis() >= expiry,
            None => false,
        }
    }

    /// Whole days until the token expires; negative once past expiry.
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> Option<i64> {
        self.token_expiry
            .map(|expiry| (expiry - now.timestamp_millis()) / 86_400_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn grant(token: &str, expires_in: i64) -> TokenGrant {
        TokenGrant {
            access_token: token.into(),
            expires_in,
        }
    }

    #[test]
    fn install_token_sets_pair_from_issue_instant() {
        let mut profile = Profile::new("default", "123", "s3cret");
        let issued = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        profile.install_token(&grant("long", 5_184_000), issued);
        assert_eq!(profile.access_token.as_deref(), Some("long"));
        assert_eq!(
            profile.token_expiry,
            Some(1_700_000_000_000 + 5_184_000_000)
        );
    }

    #[test]
    fn clear_token_retains_identity() {
        let mut profile = Profile::new("default", "123", "s3cret");
        profile.install_token(&grant("tok", 3600), Utc::now());
        profile.clear_token();
        assert!(profile.access_token.is_none());
        assert!(profile.token_expiry.is_none());
        assert_eq!(profile.name, "default");
        assert_eq!(profile.app_id, "123");
        assert_eq!(profile.app_secret, "s3cret");
    }

    #[test]
    fn expiry_detection() {
        let mut profile = Profile::new("default", "123", "s3cret");
        assert!(!profile.token_expired(Utc::now()));
        let issued = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        profile.install_token(&grant("tok", 3600), issued);
        assert!(!profile.token_expired(issued));
        assert!(profile.token_expired(issued + chrono::Duration::seconds(3600)));
        assert_eq!(profile.days_until_expiry(issued), Some(0));
    }
}
