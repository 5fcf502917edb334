mod client;

pub use client::{
    AdAccount, AdSet, Campaign, CampaignInsights, GraphError, GraphResult, Me, MetaGraphClient,
    TokenDebug,
};
