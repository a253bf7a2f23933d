use anyhow::Result;
use clap::Parser;
use oneimg_cli::{connect, service_error, init_tracing, print_json};
use oneimg_core::models::Actor;

#[derive(Parser, Debug)]
#[command(name = "delete_image")]
#[command(about = "Delete images and their stored objects as an administrator")]
struct Args {
    /// Image ids
    #[arg(required = true)]
    ids: Vec<i32>,

    #[arg(long, default_value = "admin")]
    username: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let actor = Actor::admin(&args.username);

    let services = connect().await?;
    let mut outcomes = Vec::with_capacity(args.ids.len());
    for id in args.ids {
        let outcome = services.deletes.delete(id, &actor).await.map_err(service_error)?;
        if !outcome.physical_delete_succeeded {
            tracing::warn!(image_id = id, "Record removed but the stored object may remain");
        }
        outcomes.push(serde_json::json!({ "id": id, "outcome": outcome }));
    }
    print_json(&outcomes)
}
