//! Data models shared by the pipeline crates.

mod bucket;
mod image;
mod settings;
mod telegram;
mod upload;

pub use bucket::*;
pub use image::*;
pub use settings::*;
pub use telegram::*;
pub use upload::*;
