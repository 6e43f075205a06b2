use anyhow::{bail, Context, Result};
use chrono::Duration;
use rescue_intake::backfill::{group_messages, replay, HistoricalMessage, DEFAULT_GROUP_WINDOW_MINUTES};
use rescue_intake::db::PgRecordStore;
use rescue_intake::pipeline::{MessageEvent, Pipeline};
use rescue_intake::pipeline_config::PipelineConfig;
use rescue_intake::summary::format_summary;
use std::env;
use std::io::Read;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: rescue_intake [preview|process] [--json] [FILE]\n       rescue_intake backfill HISTORY.json";

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("Failed to read {path}")),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read message from stdin")?;
            Ok(text)
        }
    }
}

async fn build_pipeline(with_store: bool) -> Result<Pipeline> {
    let config = PipelineConfig::from_env()?;
    let mut pipeline = Pipeline::from_config(config)?;

    if let Ok(token) = env::var("SLACK_BOT_TOKEN") {
        pipeline = pipeline.with_file_token(&token);
    }

    if with_store {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set to save records")?;
        info!("Connecting to database");
        let store = PgRecordStore::connect(&database_url).await?;
        pipeline = pipeline.with_store(Arc::new(store));
    }
    Ok(pipeline)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let json = args.iter().any(|a| a == "--json");
    let positional: Vec<&str> = args.iter().map(String::as_str).filter(|a| !a.starts_with("--")).collect();

    let (command, path) = match positional.as_slice() {
        [] => ("preview", None),
        ["preview" | "process" | "backfill", rest @ ..] => (positional[0], rest.first().copied()),
        [path] => ("preview", Some(*path)),
        _ => bail!("{USAGE}"),
    };

    match command {
        "preview" => {
            let pipeline = build_pipeline(false).await?;
            let text = read_input(path)?;
            let record = pipeline.preview_from_text(&text).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("{}", format_summary(&record));
            }
        }
        "process" => {
            let pipeline = build_pipeline(true).await?;
            let text = read_input(path)?;
            let outcome = pipeline.process_message(&MessageEvent::from_text(&text)).await?;
            if let Some(error) = &outcome.persistence_error {
                eprintln!("Record was not saved: {error}");
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome.record)?);
            } else {
                println!("{}", outcome.summary);
            }
        }
        "backfill" => {
            let Some(path) = path else { bail!("{USAGE}") };
            let pipeline = build_pipeline(true).await?;
            let rows: Vec<HistoricalMessage> =
                serde_json::from_str(&read_input(Some(path))?).context("History file is not a JSON array of messages")?;
            let groups = group_messages(rows, Duration::minutes(DEFAULT_GROUP_WINDOW_MINUTES));
            let report = replay(&pipeline, &groups).await;
            println!(
                "processed {} · skipped {} · failed {}",
                report.processed, report.skipped, report.failed
            );
            for error in &report.errors {
                eprintln!("{error}");
            }
        }
        _ => bail!("{USAGE}"),
    }

    Ok(())
}
