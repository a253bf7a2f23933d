//! OneIMG image processing
//!
//! Upload validation and the decode → watermark → transcode → thumbnail pipeline.

pub mod compression;
pub mod error;
pub mod image;
pub mod validator;

pub use error::ProcessingError;
pub use image::{ImageEngine, ProcessedArtifact, Thumbnail};
pub use validator::UploadValidator;
