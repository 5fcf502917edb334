use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use url::Url;

use super::listener::{run_loopback_flow, AUTH_FLOW_TIMEOUT};
use super::{
    AuthError, CredentialStore, OAuthClient, OAuthConfig, OAuthEndpoints, Profile, RedirectTarget,
};

/// Coordinates one authentication run: profile lookup, the browser/loopback
/// flow, the two token exchanges, and persistence of the finished token.
pub struct AuthManager<S> {
    store: Arc<Mutex<S>>,
    endpoints: OAuthEndpoints,
    redirect: RedirectTarget,
    timeout: Duration,
}

impl<S> AuthManager<S>
where
    S: CredentialStore + Send + Sync + 'static,
{
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            endpoints: OAuthEndpoints::default(),
            redirect: RedirectTarget::default(),
            timeout: AUTH_FLOW_TIMEOUT,
        }
    }

    pub fn with_endpoints(mut self, endpoints: OAuthEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_redirect(mut self, redirect: RedirectTarget) -> Self {
        self.redirect = redirect;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the full authorization-code flow for the named (or active) profile
    /// and persist the resulting long-lived token. Nothing is written to the
    /// store unless both exchanges succeed.
    pub async fn authenticate<F>(
        &self,
        profile_name: Option<&str>,
        open_browser: bool,
        notify: F,
    ) -> Result<Profile, AuthError>
    where
        F: Fn(&Url) -> Result<(), AuthError>,
    {
        let mut profile = self.load_profile(profile_name).await?;
        let oauth = OAuthClient::with_endpoints(
            OAuthConfig::new(profile.app_id.clone(), profile.app_secret.clone()),
            self.endpoints.clone(),
        )?
        .with_redirect(self.redirect);

        let code = run_loopback_flow(&oauth, open_browser, notify, self.timeout).await?;

        let short_lived = oauth.exchange_code(&code).await?;
        let long_lived = oauth.extend_token(&short_lived.access_token).await?;

        profile.install_token(&long_lived, Utc::now());
        self.store.lock().await.save(&profile)?;
        Ok(profile)
    }

    /// Clear the stored token pair for the named (or active) profile,
    /// retaining the app identity.
    pub async fn logout(&self, profile_name: Option<&str>) -> Result<Profile, AuthError> {
        let mut profile = self.load_profile(profile_name).await?;
        profile.clear_token();
        self.store.lock().await.save(&profile)?;
        Ok(profile)
    }

    async fn load_profile(&self, profile_name: Option<&str>) -> Result<Profile, AuthError> {
        let store = self.store.lock().await;
        store.get(profile_name)?.ok_or_else(|| match profile_name {
            Some(name) => AuthError::ProfileNotFound(name.to_owned()),
            None => AuthError::NoProfileConfigured,
        })
    }
}
