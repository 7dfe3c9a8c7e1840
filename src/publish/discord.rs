use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::Publisher;
use crate::render::RenderedItem;

/// Discord message content limit.
const CONTENT_CAP: usize = 2000;
/// Forum thread title limit.
const THREAD_NAME_CAP: usize = 100;

/// Posts each item as a new thread in a Discord forum channel via webhook.
#[derive(Clone)]
pub struct DiscordForumPublisher {
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordForumPublisher {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    /// Reads `DISCORD_WEBHOOK_URL`.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("DISCORD_WEBHOOK_URL").context("DISCORD_WEBHOOK_URL not set")?;
        Ok(Self::new(url))
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    fn payload(item: &RenderedItem) -> ForumPayload {
        let thread_name: String = item.candidate.title.chars().take(THREAD_NAME_CAP).collect();
        let mut content = item.text.clone();
        let link = format!("\n\n{}", item.candidate.url);
        if !content.contains(&item.candidate.url) {
            content.push_str(&link);
        }
        if content.chars().count() > CONTENT_CAP {
            content = content.chars().take(CONTENT_CAP).collect();
        }
        ForumPayload {
            thread_name,
            content,
        }
    }
}

#[async_trait]
impl Publisher for DiscordForumPublisher {
    async fn publish(&self, item: &RenderedItem) -> Result<String> {
        let payload = Self::payload(item);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .query(&[("wait", "true")])
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    if let Err(e) = rsp.error_for_status_ref() {
                        if attempt < self.max_retries {
                            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                            continue;
                        }
                        return Err(anyhow!("Discord webhook HTTP error: {e}"));
                    }
                    let status = rsp.status();
                    return Ok(format!("discord {status}"));
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    return Err(anyhow!("Discord webhook request failed: {e}"));
                }
            }
        }
    }

    fn name(&self) -> &str {
        "discord"
    }
}

#[derive(Debug, Serialize, PartialEq)]
struct ForumPayload {
    thread_name: String,
    content: String,
}
