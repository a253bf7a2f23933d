use serde::{Deserialize, Serialize};

use crate::storage_types::DEFAULT_BUCKET_ID;

/// Admin-editable settings. Stored as the single row with id 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Settings {
    /// Keep uploads byte-for-byte (no compression).
    pub original_image: bool,
    pub save_webp: bool,
    pub thumbnail: bool,
    pub tg_notice: bool,
    pub tg_bot_token: String,
    /// Comma separated chat ids.
    pub tg_receivers: String,
    pub tg_notice_text: String,
    pub save_original_name: bool,
    pub default_storage: i32,
    pub watermark_enable: bool,
    pub watermark_text: String,
    pub watermark_pos: String,
    /// Percentage of the shorter image side.
    pub watermark_size: i32,
    pub watermark_color: String,
    pub watermark_opac: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            original_image: false,
            save_webp: true,
            thumbnail: true,
            tg_notice: false,
            tg_bot_token: String::new(),
            tg_receivers: String::new(),
            tg_notice_text: String::new(),
            save_original_name: false,
            default_storage: DEFAULT_BUCKET_ID,
            watermark_enable: false,
            watermark_text: "OneIMG".to_string(),
            watermark_pos: "bottom-right".to_string(),
            watermark_size: 10,
            watermark_color: "#000000".to_string(),
            watermark_opac: 0.5,
        }
    }
}

impl Settings {
    /// Parsed `tg_receivers`, blanks dropped.
    pub fn tg_receivers_list(&self) -> Vec<String> {
        self.tg_receivers
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn notifications_enabled(&self) -> bool {
        self.tg_notice && !self.tg_bot_token.trim().is_empty() && !self.tg_receivers_list().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receivers_list_drops_blanks() {
        let settings = Settings {
            tg_receivers: " 123, ,456 ,".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.tg_receivers_list(), vec!["123", "456"]);
        assert!(Settings::default().tg_receivers_list().is_empty());
    }

    #[test]
    fn test_notifications_need_token_and_receivers() {
        let mut settings = Settings {
            tg_notice: true,
            tg_receivers: "1".to_string(),
            ..Default::default()
        };
        assert!(!settings.notifications_enabled());
        settings.tg_bot_token = "123:abc".to_string();
        assert!(settings.notifications_enabled());
        settings.tg_notice = false;
        assert!(!settings.notifications_enabled());
    }
}
