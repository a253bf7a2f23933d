use anyhow::{Context, Result};
use clap::Parser;
use oneimg_cli::{connect, service_error, content_type_for, init_tracing, print_json};
use oneimg_core::models::{UploadFile, Uploader};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "upload_image")]
#[command(about = "Upload local image files into a bucket")]
struct Args {
    /// Files to upload
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Target bucket id (default: the configured default storage)
    #[arg(long)]
    bucket: Option<i32>,

    /// Tag ids to link to every uploaded image
    #[arg(long = "tag")]
    tags: Vec<i32>,

    #[arg(long, default_value_t = 1)]
    user_id: i32,

    #[arg(long, default_value = "admin")]
    username: String,

    /// Override the content type guessed from the extension
    #[arg(long)]
    content_type: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        files.push(UploadFile {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            content_type: args
                .content_type
                .clone()
                .unwrap_or_else(|| content_type_for(path).to_string()),
            data,
        });
    }

    let uploader = Uploader {
        user_id: args.user_id,
        username: args.username,
        uuid: String::new(),
    };

    let services = connect().await?;
    let results = services
        .uploads
        .upload_batch(files, args.bucket, &uploader, &args.tags)
        .await
        .map_err(service_error)?;
    print_json(&results)
}
