//! Core library for the Meta Ads terminal client: OAuth authentication,
//! credential storage, and the Graph API query client.

pub mod auth;
pub mod config;
pub mod graph;
