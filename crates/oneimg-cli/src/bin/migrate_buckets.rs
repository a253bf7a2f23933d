use anyhow::Result;
use clap::Parser;
use oneimg_cli::{connect, service_error, init_tracing, print_json, report_table, OutputFormat};

#[derive(Parser, Debug)]
#[command(name = "migrate_buckets")]
#[command(about = "Assign legacy images to per-kind storage buckets")]
struct Args {
    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let services = connect().await?;
    let report = services.migrator().run().await.map_err(service_error)?;

    match args.format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => print!("{}", report_table(&report)),
    }

    if report.failed() > 0 {
        anyhow::bail!("{} bucket kinds failed to migrate", report.failed());
    }
    Ok(())
}
