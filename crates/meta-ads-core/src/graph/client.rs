use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::auth::Profile;

const DEFAULT_ENDPOINT: &str = "https://graph.facebook.com/v21.0";
const USER_AGENT: &str = "meta-ads-rs/0.1.0";

/// Errors returned by the Graph API client.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("not authenticated; run `meta-ads auth` first")]
    NotAuthenticated,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {status} body: {body}")]
    HttpStatus { status: StatusCode, body: String },
    #[error("Graph API error {code:?}: {message}")]
    Api {
        message: String,
        kind: Option<String>,
        code: Option<i64>,
    },
    #[error("invalid Graph endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error("failed to deserialize response: {0}")]
    Deserialize(#[from] serde_json::Error),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Read-only client for the Meta Ads Graph API. Every query names its field
/// selection explicitly, mirroring what the API returns by default otherwise.
#[derive(Debug, Clone)]
pub struct MetaGraphClient {
    http: Client,
    base: Url,
    access_token: String,
}

impl MetaGraphClient {
    /// Build a client for an authenticated profile, targeting the default
    /// Graph API endpoint.
    pub fn from_profile(profile: &Profile) -> GraphResult<Self> {
        Self::with_base_url(profile, DEFAULT_ENDPOINT)
    }

    /// Build a client with a custom base URL (useful for testing).
    pub fn with_base_url(profile: &Profile, base: &str) -> GraphResult<Self> {
        let access_token = profile
            .access_token
            .clone()
            .ok_or(GraphError::NotAuthenticated)?;
        let base = Url::parse(base)?;
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            base,
            access_token,
        })
    }

    /// Fetch the authenticated user.
    pub async fn me(&self) -> GraphResult<Me> {
        self.get("me", &[("fields", "id,name,email")]).await
    }

    /// List ad accounts accessible to the authenticated user.
    pub async fn ad_accounts(&self, limit: usize) -> GraphResult<Vec<AdAccount>> {
        let limit = limit.to_string();
        let envelope: DataEnvelope<AdAccount> = self
            .get(
                "me/adaccounts",
                &[
                    ("fields", "id,name,account_status,currency,timezone_name,balance"),
                    ("limit", &limit),
                ],
            )
            .await?;
        Ok(envelope.data)
    }

    /// Fetch a single ad account with spend details.
    pub async fn ad_account(&self, account_id: &str) -> GraphResult<AdAccount> {
        self.get(
            account_id,
            &[(
                "fields",
                "id,name,account_status,currency,timezone_name,balance,amount_spent,spend_cap",
            )],
        )
        .await
    }

    /// List campaigns under an ad account.
    pub async fn campaigns(&self, account_id: &str, limit: usize) -> GraphResult<Vec<Campaign>> {
        let limit = limit.to_string();
        let path = format!("{account_id}/campaigns");
        let envelope: DataEnvelope<Campaign> = self
            .get(
                &path,
                &[
                    (
                        "fields",
                        "id,name,status,objective,daily_budget,lifetime_budget,start_time,stop_time,created_time,updated_time",
                    ),
                    ("limit", &limit),
                ],
            )
            .await?;
        Ok(envelope.data)
    }

    /// Fetch a single campaign.
    pub async fn campaign(&self, campaign_id: &str) -> GraphResult<Campaign> {
        self.get(
            campaign_id,
            &[(
                "fields",
                "id,name,status,objective,daily_budget,lifetime_budget,start_time,stop_time,created_time,updated_time,bid_strategy,budget_remaining",
            )],
        )
        .await
    }

    /// Fetch aggregate insights for a campaign over a named date preset.
    /// Returns `None` when the campaign has no delivery in the window.
    pub async fn campaign_insights(
        &self,
        campaign_id: &str,
        date_preset: &str,
    ) -> GraphResult<Option<CampaignInsights>> {
        let path = format!("{campaign_id}/insights");
        let envelope: DataEnvelope<CampaignInsights> = self
            .get(
                &path,
                &[
                    ("fields", "impressions,clicks,spend,ctr,cpc,cpm,reach,frequency"),
                    ("date_preset", date_preset),
                ],
            )
            .await?;
        Ok(envelope.data.into_iter().next())
    }

    /// List ad sets under a campaign.
    pub async fn ad_sets(&self, campaign_id: &str, limit: usize) -> GraphResult<Vec<AdSet>> {
        let limit = limit.to_string();
        let path = format!("{campaign_id}/adsets");
        let envelope: DataEnvelope<AdSet> = self
            .get(
                &path,
                &[
                    (
                        "fields",
                        "id,name,status,daily_budget,lifetime_budget,billing_event,optimization_goal,start_time,end_time",
                    ),
                    ("limit", &limit),
                ],
            )
            .await?;
        Ok(envelope.data)
    }

    /// Introspect the stored token.
    pub async fn debug_token(&self) -> GraphResult<TokenDebug> {
        let token = self.access_token.clone();
        let envelope: ObjectEnvelope<TokenDebug> = self
            .get("debug_token", &[("input_token", token.as_str())])
            .await?;
        Ok(envelope.data)
    }

    async fn get<R>(&self, path: &str, params: &[(&str, &str)]) -> GraphResult<R>
    where
        R: DeserializeOwned,
    {
        let mut url = Url::parse(&format!(
            "{}/{}",
            self.base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        ))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("access_token", &self.access_token);
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
                return Err(GraphError::Api {
                    message: envelope.error.message,
                    kind: envelope.error.kind,
                    code: envelope.error.code,
                });
            }
            return Err(GraphError::HttpStatus { status, body });
        }

        Ok(response.json::<R>().await?)
    }
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ObjectEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: GraphApiError,
}

#[derive(Debug, Deserialize)]
struct GraphApiError {
    message: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<i64>,
}

/// The authenticated user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Me {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Ad account summary. Monetary fields arrive as cent-denominated strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdAccount {
    pub id: String,
    pub name: Option<String>,
    pub account_status: Option<i64>,
    pub currency: Option<String>,
    pub timezone_name: Option<String>,
    pub balance: Option<String>,
    pub amount_spent: Option<String>,
    pub spend_cap: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub objective: Option<String>,
    pub daily_budget: Option<String>,
    pub lifetime_budget: Option<String>,
    pub bid_strategy: Option<String>,
    pub budget_remaining: Option<String>,
    pub start_time: Option<String>,
    pub stop_time: Option<String>,
    pub created_time: Option<String>,
    pub updated_time: Option<String>,
}

/// Aggregate delivery metrics; the API reports every metric as a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignInsights {
    pub impressions: Option<String>,
    pub clicks: Option<String>,
    pub spend: Option<String>,
    pub ctr: Option<String>,
    pub cpc: Option<String>,
    pub cpm: Option<String>,
    pub reach: Option<String>,
    pub frequency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdSet {
    pub id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub daily_budget: Option<String>,
    pub lifetime_budget: Option<String>,
    pub billing_event: Option<String>,
    pub optimization_goal: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenDebug {
    pub app_id: Option<String>,
    pub is_valid: Option<bool>,
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub scopes: Vec<String>,
}
