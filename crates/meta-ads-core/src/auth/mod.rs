mod error;
mod listener;
mod oauth;
mod orchestrator;
mod profile;
mod store;

pub use error::AuthError;
pub use listener::{run_loopback_flow, AUTH_FLOW_TIMEOUT};
pub use oauth::{
    OAuthClient, OAuthConfig, OAuthEndpoints, RedirectTarget, TokenGrant, DEFAULT_EXPIRES_IN,
    DEFAULT_REDIRECT_PORT, OAUTH_SCOPES, REDIRECT_PATH,
};
pub use orchestrator::AuthManager;
pub use profile::Profile;
pub use store::{CredentialStore, FileCredentialStore};
