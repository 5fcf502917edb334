use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::AuthError;

pub const DEFAULT_REDIRECT_PORT: u16 = 3000;
pub const REDIRECT_PATH: &str = "/oauth/callback";
/// Scope set registered with the provider; not configurable.
pub const OAUTH_SCOPES: &str = "ads_management,ads_read,business_management";
/// Applied when the token endpoint omits `expires_in` (~60 days).
pub const DEFAULT_EXPIRES_IN: i64 = 5_183_944;

const DEFAULT_USER_AGENT: &str = "meta-ads-rs/0.1.0";

/// The loopback URL the provider redirects back to. The host/path half is
/// fixed because it must match the URI registered for the app; the port is
/// only overridable so tests can bind free ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectTarget {
    pub port: u16,
}

impl Default for RedirectTarget {
    fn default() -> Self {
        Self {
            port: DEFAULT_REDIRECT_PORT,
        }
    }
}

impl RedirectTarget {
    pub fn uri(&self) -> Url {
        Url::parse(&format!("http://localhost:{}{}", self.port, REDIRECT_PATH))
            .expect("loopback redirect URI is always well-formed")
    }
}

/// OAuth client identity supplied by consumers.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub app_id: String,
    pub app_secret: String,
}

impl OAuthConfig {
    pub fn new<S: Into<String>>(app_id: S, app_secret: S) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret: app_secret.into(),
        }
    }
}

/// Provider endpoints used by the authorization and token exchange steps.
#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    pub authorize_url: Url,
    pub token_url: Url,
}

impl Default for OAuthEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: Url::parse("https://www.facebook.com/v21.0/dialog/oauth").unwrap(),
            token_url: Url::parse("https://graph.facebook.com/v21.0/oauth/access_token").unwrap(),
        }
    }
}

/// Result of one token-acquisition call.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime in seconds, already defaulted when the provider omitted it.
    pub expires_in: i64,
}

/// Builds the authorization URL and performs the two token exchanges.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: Client,
    config: OAuthConfig,
    endpoints: OAuthEndpoints,
    redirect: RedirectTarget,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig) -> Result<Self, AuthError> {
        Self::with_endpoints(config, OAuthEndpoints::default())
    }

    pub fn with_endpoints(
        config: OAuthConfig,
        endpoints: OAuthEndpoints,
    ) -> Result<Self, AuthError> {
        let http = Client::builder().user_agent(DEFAULT_USER_AGENT).build()?;
        Ok(Self {
            http,
            config,
            endpoints,
            redirect: RedirectTarget::default(),
        })
    }

    pub fn with_redirect(mut self, redirect: RedirectTarget) -> Self {
        self.redirect = redirect;
        self
    }

    pub fn redirect(&self) -> RedirectTarget {
        self.redirect
    }

    /// Authorization request URL. Carries exactly the four parameters the
    /// provider validates against the registered app: `client_id`,
    /// `redirect_uri`, `scope`, `response_type`.
    pub fn authorization_url(&self) -> Url {
        let mut url = self.endpoints.authorize_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("client_id", &self.config.app_id);
            pairs.append_pair("redirect_uri", self.redirect.uri().as_str());
            pairs.append_pair("scope", OAUTH_SCOPES);
            pairs.append_pair("response_type", "code");
        }
        url
    }

    /// Exchange an authorization code for a short-lived access token.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthError> {
        let response = self
            .http
            .get(self.endpoints.token_url.clone())
            .query(&[
                ("client_id", self.config.app_id.as_str()),
                ("client_secret", self.config.app_secret.as_str()),
                ("redirect_uri", self.redirect.uri().as_str()),
                ("code", code),
            ])
            .send()
            .await?;

        Self::handle_token_response(response).await
    }

    /// Upgrade a short-lived token to a long-lived one. Must only run after a
    /// successful `exchange_code`, feeding its output token in.
    pub async fn extend_token(&self, short_lived_token: &str) -> Result<TokenGrant, AuthError> {
        let response = self
            .http
            .get(self.endpoints.token_url.clone())
            .query(&[
                ("grant_type", "fb_exchange_token"),
                ("client_id", self.config.app_id.as_str()),
                ("client_secret", self.config.app_secret.as_str()),
                ("fb_exchange_token", short_lived_token),
            ])
            .send()
            .await?;

        Self::handle_token_response(response).await
    }

    async fn handle_token_response(response: reqwest::Response) -> Result<TokenGrant, AuthError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "".into());
            return Err(AuthError::TokenEndpoint { status, body });
        }

        let payload: TokenResponse = response.json().await?;
        Ok(TokenGrant {
            access_token: payload.access_token,
            expires_in: payload.expires_in.unwrap_or(DEFAULT_EXPIRES_IN),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}
