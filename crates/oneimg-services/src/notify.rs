//! Telegram upload notices.

use chrono::{DateTime, Local};
use futures::future::join_all;
use oneimg_core::models::Settings;
use oneimg_storage::TelegramClient;
use std::time::Duration;

pub const DEFAULT_NOTICE_TEMPLATE: &str =
    "{username} {date} uploaded image {filename} to storage [{StorageType}]";
const LINK_SUFFIX: &str = "\n\nLink: {url}";
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Values substituted into the notice template.
#[derive(Debug, Clone)]
pub struct NoticeContext {
    pub username: String,
    pub date: DateTime<Local>,
    pub file_name: String,
    /// Kind tag of the bucket the image went to.
    pub storage_type: String,
    pub url: String,
}

/// Fill the template (or the default) and append the link line.
pub fn render_notice(template: &str, ctx: &NoticeContext) -> String {
    let template = if template.trim().is_empty() {
        DEFAULT_NOTICE_TEMPLATE
    } else {
        template
    };
    let text = format!("{}{}", template, LINK_SUFFIX);
    let date = ctx.date.format(DATE_FORMAT).to_string();

    [
        ("{username}", ctx.username.as_str()),
        ("{date}", date.as_str()),
        ("{filename}", ctx.file_name.as_str()),
        ("{StorageType}", ctx.storage_type.as_str()),
        ("{url}", ctx.url.as_str()),
    ]
    .iter()
    .fold(text, |acc, (placeholder, value)| acc.replace(placeholder, value))
}

#[derive(Debug, Clone)]
pub struct Notifier {
    api_base: String,
    retry: Option<(u32, Duration)>,
}

impl Notifier {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            retry: None,
        }
    }

    pub fn with_retry(mut self, max_retries: u32, base_backoff: Duration) -> Self {
        self.retry = Some((max_retries, base_backoff));
        self
    }

    /// Send the notice to every receiver. Returns how many sends succeeded.
    pub async fn notify(&self, settings: &Settings, ctx: &NoticeContext) -> usize {
        if !settings.notifications_enabled() {
            return 0;
        }

        let client = match TelegramClient::new(&self.api_base, settings.tg_bot_token.trim()) {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(error = %e, "Telegram notice client unavailable");
                return 0;
            }
        };
        let client = match self.retry {
            Some((retries, backoff)) => client.with_retry(retries, backoff),
            None => client,
        };

        let text = render_notice(&settings.tg_notice_text, ctx);
        let receivers = settings.tg_receivers_list();
        let sends = receivers.iter().map(|chat_id| {
            let client = &client;
            let text = &text;
            async move { (chat_id, client.send_message(chat_id, text).await) }
        });

        let mut delivered = 0;
        for (chat_id, result) in join_all(sends).await {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(chat_id = %chat_id, error = %e, "Telegram upload notice failed")
                }
            }
        }
        delivered
    }
}
