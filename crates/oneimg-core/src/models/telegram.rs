use serde::{Deserialize, Serialize};

/// Telegram message/file ids recorded for an image stored in a chat.
///
/// Keyed by file name. A zeroed ref stands in when the lookup at delete time fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TelegramObjectRef {
    pub file_name: String,
    pub file_id: String,
    pub thumbnail_file_id: String,
    pub message_id: i64,
    pub thumbnail_message_id: i64,
}

impl TelegramObjectRef {
    pub fn zeroed(file_name: &str) -> Self {
        TelegramObjectRef {
            file_name: file_name.to_string(),
            ..Default::default()
        }
    }
}
