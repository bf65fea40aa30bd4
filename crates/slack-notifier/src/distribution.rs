use anyhow::Result;
use reqwest::{Body, Client};

use crate::slack::{Block, ColumnSetting, SlackMessage, Text, build_message_request, webhook_from_env};

/// Posts an epoch reward distribution summary after a run completes.
pub async fn post_distribution_summary(
    epoch: u64,
    merkle_root: [u8; 32],
    recipient_count: usize,
    total_rewards: String,
    weekly_budget: String,
    validation_errors: usize,
    validation_warnings: usize,
    dry_run: bool,
) -> Result<()> {
    let client = Client::new();
    let header = if dry_run {
        "DRY RUN Epoch Reward Distribution DRY RUN"
    } else {
        "Epoch Reward Distribution"
    };

    let table_headers = vec![
        "Epoch".to_string(),
        "Merkle Root".to_string(),
        "Recipients".to_string(),
        "Total Rewards".to_string(),
        "Weekly Budget".to_string(),
        "Errors".to_string(),
        "Warnings".to_string(),
    ];
    let table_values = vec![
        epoch.to_string(),
        format!("0x{}", hex::encode(merkle_root)),
        recipient_count.to_string(),
        total_rewards,
        weekly_budget,
        validation_errors.to_string(),
        validation_warnings.to_string(),
    ];

    let msg = build_table(header.to_string(), table_headers, table_values);
    let payload = serde_json::to_string(&msg)?;
    let body = Body::from(payload);
    let request = build_message_request(&client, body, webhook_from_env("ERDE_SLACK_WEBHOOK")?)?;
    let _resp = request.send().await?;

    Ok(())
}

fn build_table(header: String, table_headers: Vec<String>, table_values: Vec<String>) -> SlackMessage {
    let mut body: Vec<Block> = Vec::new();

    body.push(Block {
        column_settings: None,
        block_type: "header".to_string(),
        fields: None,
        rows: None,
        text: Some(Text {
            text_type: "plain_text".to_string(),
            text: Some(header),
            emoji: Some(true),
        }),
    });

    let table_header: Vec<Text> = table_headers
        .into_iter()
        .map(|h| Text {
            text_type: "raw_text".to_string(),
            text: Some(h),
            emoji: None,
        })
        .collect();
    let table_row: Vec<Text> = table_values
        .into_iter()
        .map(|v| Text {
            text_type: "raw_text".to_string(),
            text: Some(v),
            emoji: None,
        })
        .collect();

    body.push(Block {
        column_settings: Some(vec![ColumnSetting {
            is_wrapped: true,
            align: "right".to_string(),
        }]),
        rows: Some(vec![table_header, table_row]),
        block_type: "table".to_string(),
        fields: None,
        text: None,
    });

    SlackMessage { blocks: body }
}
