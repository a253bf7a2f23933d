use rand::Rng;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// File extension for a final mime type, empty when unknown.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime.to_lowercase().as_str() {
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "image/svg+xml" => ".svg",
        "image/bmp" => ".bmp",
        "image/tiff" => ".tiff",
        "image/heic" => ".heic",
        "image/heif" => ".heif",
        _ => "",
    }
}

/// `hex(unix nanos)` + three random digits + extension.
pub fn unique_file_name(ext: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let suffix: u32 = rand::rng().random_range(100..=999);
    format!("{:x}{}{}", nanos, suffix, ext)
}

/// Stored name for an upload: the original base name when requested, otherwise unique.
pub fn output_file_name(original: &str, final_mime: &str, keep_original_name: bool) -> String {
    let ext = extension_for_mime(final_mime);
    if keep_original_name {
        let stem = Path::new(original)
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::trim)
            .unwrap_or_default();
        if !stem.is_empty() && stem != ".." {
            return format!("{}{}", stem, ext);
        }
    }
    unique_file_name(ext)
}
