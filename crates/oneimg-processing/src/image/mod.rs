//! Image codec and transform engine

pub mod decode;
mod engine;
pub mod naming;
pub mod thumbnail;
pub mod watermark;

pub use decode::{Decoded, SourceFormat};
pub use engine::{ImageEngine, ProcessedArtifact};
pub use thumbnail::Thumbnail;
pub use watermark::{FontLoader, WatermarkConfig, WatermarkPosition};
