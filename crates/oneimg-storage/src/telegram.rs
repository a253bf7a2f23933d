//! Telegram Bot API client used as an object store.
//!
//! Objects are documents posted into a chat; a stored object is addressed by the
//! `(message_id, file_id)` pair returned by `sendDocument`.

use crate::error::{StorageError, StorageResult};
use bytes::Bytes;
use oneimg_core::TelegramConfig;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
pub const MAX_RETRIES: u32 = 3;
pub const BASE_BACKOFF: Duration = Duration::from_millis(500);
pub const THUMBNAIL_PREFIX: &str = "thumbnail_";

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    document: Option<FileRef>,
    photo: Option<Vec<FileRef>>,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    file_path: Option<String>,
}

/// Ids of one posted document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentDocument {
    pub message_id: i64,
    pub file_id: String,
}

enum Failure {
    Retryable(StorageError),
    Fatal(StorageError),
}

#[derive(Debug, Clone)]
pub struct TelegramClient {
    client: Client,
    api_base: String,
    bot_token: String,
    max_retries: u32,
    base_backoff: Duration,
}

impl TelegramClient {
    pub fn new(api_base: &str, bot_token: &str) -> StorageResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StorageError::ConfigError(format!("Failed to create Telegram client: {}", e)))?;

        Ok(TelegramClient {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
            max_retries: MAX_RETRIES,
            base_backoff: BASE_BACKOFF,
        })
    }

    /// Override the retry policy (attempts after the first, and the initial backoff).
    pub fn with_retry(mut self, max_retries: u32, base_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_backoff = base_backoff;
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    async fn attempt<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, Failure> {
        let response = request.send().await.map_err(|e| {
            Failure::Retryable(StorageError::BackendError(format!("Telegram request failed: {}", e)))
        })?;

        let status = response.status();
        let body: ApiResponse<T> = response.json().await.map_err(|e| {
            let err = StorageError::BackendError(format!(
                "Telegram returned unreadable response ({}): {}",
                status, e
            ));
            if status.is_server_error() {
                Failure::Retryable(err)
            } else {
                Failure::Fatal(err)
            }
        })?;

        if body.ok {
            if let Some(result) = body.result {
                return Ok(result);
            }
        }

        let err = StorageError::BackendError(format!(
            "Telegram API error ({}): {}",
            status,
            body.description.unwrap_or_else(|| "no description".to_string())
        ));
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(Failure::Retryable(err))
        } else if status == StatusCode::UNAUTHORIZED {
            Err(Failure::Fatal(StorageError::AuthFailed(err.to_string())))
        } else {
            Err(Failure::Fatal(err))
        }
    }

    /// Call a Bot API method, retrying transient failures with exponential backoff.
    async fn call<T, F>(&self, method: &str, build: F) -> StorageResult<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            match self.attempt(build()).await {
                Ok(result) => return Ok(result),
                Err(Failure::Fatal(e)) => return Err(e),
                Err(Failure::Retryable(e)) => {
                    if attempt >= self.max_retries {
                        tracing::error!(method, attempts = attempt + 1, error = %e, "Telegram request failed");
                        return Err(e);
                    }
                    let backoff = self.base_backoff * 2u32.pow(attempt);
                    tracing::warn!(
                        method,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Telegram request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    pub async fn send_document(
        &self,
        chat_id: &str,
        file_name: &str,
        data: Bytes,
    ) -> StorageResult<SentDocument> {
        let url = self.method_url("sendDocument");
        let size = data.len();
        let start = std::time::Instant::now();

        let message: Message = self
            .call("sendDocument", || {
                let part = Part::bytes(data.to_vec()).file_name(file_name.to_string());
                let form = Form::new()
                    .text("chat_id", chat_id.to_string())
                    .part("document", part);
                self.client.post(&url).multipart(form)
            })
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;

        let file_id = message
            .document
            .map(|d| d.file_id)
            .or_else(|| message.photo.and_then(|p| p.into_iter().last()).map(|p| p.file_id))
            .ok_or_else(|| {
                StorageError::UploadFailed("Telegram response carried no file id".to_string())
            })?;

        tracing::info!(
            file_name = %file_name,
            message_id = message.message_id,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Telegram upload successful"
        );

        Ok(SentDocument {
            message_id: message.message_id,
            file_id,
        })
    }

    pub async fn delete_message(&self, chat_id: &str, message_id: i64) -> StorageResult<()> {
        let url = self.method_url("deleteMessage");
        let payload = serde_json::json!({ "chat_id": chat_id, "message_id": message_id });
        let _: bool = self
            .call("deleteMessage", || self.client.post(&url).json(&payload))
            .await?;
        Ok(())
    }

    pub async fn send_message(&self, chat_id: &str, text: &str) -> StorageResult<()> {
        let url = self.method_url("sendMessage");
        let payload = serde_json::json!({ "chat_id": chat_id, "text": text });
        let _: serde_json::Value = self
            .call("sendMessage", || self.client.post(&url).json(&payload))
            .await?;
        Ok(())
    }

    /// Resolve a file id and download its content.
    pub async fn download(&self, file_id: &str) -> StorageResult<Bytes> {
        let url = self.method_url("getFile");
        let info: FileInfo = self
            .call("getFile", || self.client.get(&url).query(&[("file_id", file_id)]))
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        let file_path = info
            .file_path
            .ok_or_else(|| StorageError::NotFound(file_id.to_string()))?;

        let response = self
            .client
            .get(format!("{}/file/bot{}/{}", self.api_base, self.bot_token, file_path))
            .send()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(file_id.to_string())),
            status if status.is_success() => response
                .bytes()
                .await
                .map_err(|e| StorageError::DownloadFailed(e.to_string())),
            status => Err(StorageError::DownloadFailed(format!(
                "Telegram file download returned {}",
                status
            ))),
        }
    }
}

/// A bucket's chat plus the client that posts into it.
#[derive(Debug, Clone)]
pub struct TelegramStorage {
    client: TelegramClient,
    chat_id: String,
}

impl TelegramStorage {
    pub fn new(api_base: &str, config: &TelegramConfig) -> StorageResult<Self> {
        Ok(TelegramStorage {
            client: TelegramClient::new(api_base, &config.bot_token)?,
            chat_id: config.chat_id.clone(),
        })
    }

    pub fn with_client(client: TelegramClient, chat_id: impl Into<String>) -> Self {
        TelegramStorage {
            client,
            chat_id: chat_id.into(),
        }
    }

    pub async fn put(&self, file_name: &str, data: Bytes) -> StorageResult<SentDocument> {
        self.client.send_document(&self.chat_id, file_name, data).await
    }

    pub async fn get(&self, file_id: &str) -> StorageResult<Bytes> {
        self.client.download(file_id).await
    }

    /// Issue deleteMessage for each known id. Results are logged, never returned.
    pub async fn delete_messages(&self, message_ids: &[i64]) {
        let deletions = message_ids
            .iter()
            .filter(|id| **id != 0)
            .map(|id| async move { (*id, self.client.delete_message(&self.chat_id, *id).await) });

        for (message_id, result) in futures::future::join_all(deletions).await {
            if let Err(e) = result {
                tracing::warn!(message_id, error = %e, "Telegram message delete failed");
            }
        }
    }
}
