//! OneIMG storage backends
//!
//! One closed [`Backend`] enum fronts five stores: local disk, S3-compatible object
//! storage (S3 and R2), FTP, WebDAV and a Telegram chat.
//!
//! # Key layout
//!
//! Every key-addressed backend uses the same layout:
//!
//! - **Primary**: `uploads/{YYYY}/{MM}/{name}`
//! - **Thumbnail**: `uploads/{YYYY}/{MM}/thumbnails/{name}`
//!
//! Public URLs are the key with a leading `/`. Telegram objects are addressed by
//! message and file ids instead, recorded in a `TelegramObjectRef`.

pub mod backend;
pub mod error;
pub mod ftp;
pub mod keys;
pub mod local;
pub mod s3;
pub mod telegram;
pub mod webdav;

pub use backend::{Backend, StoredObject};
pub use error::{StorageError, StorageResult};
pub use ftp::FtpStorage;
pub use local::LocalStorage;
pub use s3::S3Storage;
pub use telegram::{SentDocument, TelegramClient, TelegramStorage};
pub use webdav::WebDavStorage;
