//! Push message delivery (LINE Messaging API push endpoint)

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::info;

/// Outbound push channel to the owner
#[async_trait]
pub trait PushSender: Send + Sync {
    /// One delivery attempt, no retry
    async fn push(&self, token: &str, recipient: &str, message: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Serialize)]
struct PushBody<'a> {
    to: &'a str,
    messages: [TextMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

fn push_body(recipient: &str, message: &str) -> anyhow::Result<Vec<u8>> {
    let body = PushBody { to: recipient, messages: [TextMessage { kind: "text", text: message }] };
    serde_json::to_vec(&body).context("Failed to encode push body")
}

pub struct LinePushClient {
    endpoint: String,
    client: reqwest::Client,
}

impl LinePushClient {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        // One client for connection reuse across cycles
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build push HTTP client")?;
        Ok(Self { endpoint: endpoint.to_string(), client })
    }
}

#[async_trait]
impl PushSender for LinePushClient {
    async fn push(&self, token: &str, recipient: &str, message: &str) -> anyhow::Result<()> {
        let start = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {token}"))
            .body(push_body(recipient, message)?)
            .send()
            .await
            .context("Push request failed")?;

        let status = response.status();
        let latency_ms = start.elapsed().as_millis() as u64;
        if !status.is_success() {
            bail!("Push endpoint returned {}", status.as_u16());
        }

        info!(status = %status.as_u16(), latency_ms = %latency_ms, "push_delivered");
        Ok(())
    }
}
