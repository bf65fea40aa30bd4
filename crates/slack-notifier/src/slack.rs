use anyhow::Result;
use reqwest::{Body, Client, RequestBuilder, header::ACCEPT};
use serde::Serialize;
use std::env;

#[derive(Debug, Serialize)]
pub struct SlackMessage {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Serialize)]
pub struct Block {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<Text>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<Text>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_settings: Option<Vec<ColumnSetting>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Vec<Text>>>,
}

#[derive(Debug, Serialize)]
pub struct ColumnSetting {
    pub is_wrapped: bool,
    pub align: String,
}

#[derive(Debug, Serialize)]
pub struct Text {
    #[serde(rename = "type")]
    pub text_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<bool>,
}

/// Builds the POST request against an explicit webhook URL, shared across
/// every notifier module so each one does not reinvent request assembly.
pub fn build_message_request(client: &Client, body: Body, webhook_url: String) -> Result<RequestBuilder> {
    Ok(client
        .post(webhook_url)
        .header(ACCEPT, "application/json")
        .body(body))
}

/// Resolves a webhook URL from the named environment variable, the
/// convention every notifier in this crate uses for its posting target.
pub fn webhook_from_env(var: &str) -> Result<String> {
    env::var(var).map_err(|_| anyhow::anyhow!("{var} env var not set"))
}
