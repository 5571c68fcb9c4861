use clap::{Arg, ArgMatches, Command};
use common::config::{LogFormat, LogSettings, Settings};
use pipeline::api::models::{DownloadResponse, UploadResponse};
use pipeline::models::ObjectCreatedEvent;
use pipeline::processor::ProcessingOutcome;
use pipeline::services::PipelineService;
use std::process;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config/pipeline.toml";

fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("FILE")
        .help("Sets a custom config file")
}

fn file_name_arg() -> Arg {
    Arg::new("file-name")
        .long("file-name")
        .value_name("KEY")
        .required(true)
        .help("Object key in the incoming bucket")
}

fn cli() -> Command {
    Command::new("File Pipeline")
        .version("1.0")
        .about("Event-driven file ingestion with quarantine and presigned handles")
        .subcommand_required(true)
        .subcommand(
            Command::new("serve")
                .about("Run the HTTP API and the failure monitor")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("process")
                .about("Process one object as if its creation event had arrived")
                .arg(config_arg())
                .arg(
                    Arg::new("bucket")
                        .long("bucket")
                        .value_name("BUCKET")
                        .help("Defaults to the configured incoming bucket"),
                )
                .arg(
                    Arg::new("key")
                        .long("key")
                        .value_name("KEY")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("upload-url")
                .about("Issue a presigned upload handle")
                .arg(config_arg())
                .arg(file_name_arg()),
        )
        .subcommand(
            Command::new("download-url")
                .about("Issue a presigned download handle")
                .arg(config_arg())
                .arg(file_name_arg()),
        )
}

fn init_tracing(settings: &LogSettings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.filter));

    match settings.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

fn load_settings(matches: &ArgMatches) -> common::Result<Settings> {
    let config_path = matches
        .get_one::<String>("config")
        .map(|s| s.as_str())
        .unwrap_or(DEFAULT_CONFIG);
    let settings = Settings::new(config_path)?;
    init_tracing(&settings.log);
    tracing::info!(config = %config_path, "Loaded configuration");
    Ok(settings)
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> common::Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(|s| s.as_str())
        .ok_or_else(|| common::Error::InvalidInput(format!("--{} is required", name)))
}

async fn run(matches: ArgMatches) -> common::Result<()> {
    match matches.subcommand() {
        Some(("serve", sub)) => {
            let settings = load_settings(sub)?;
            pipeline::run_pipeline_service(&settings).await
        }
        Some(("process", sub)) => {
            let settings = load_settings(sub)?;
            let bucket = sub
                .get_one::<String>("bucket")
                .cloned()
                .unwrap_or_else(|| settings.storage.incoming_bucket.clone());
            let event = ObjectCreatedEvent::new(&bucket, required(sub, "key")?);

            let service = PipelineService::new(&settings).await?;
            let outcome = service.process(&event).await;
            service.monitor().flush().await;
            match outcome? {
                ProcessingOutcome::Recorded(record) => {
                    println!("{}", serde_json::to_string_pretty(&record)?)
                }
                ProcessingOutcome::Quarantined {
                    key,
                    quarantine_key,
                    reason,
                } => println!("Quarantined {} as {}: {}", key, quarantine_key, reason),
                ProcessingOutcome::AlreadyQuarantined { key } => {
                    println!("{} was already quarantined", key)
                }
            }
            Ok(())
        }
        Some(("upload-url", sub)) => {
            let settings = load_settings(sub)?;
            let service = PipelineService::new(&settings).await?;
            let handle = service.issue_upload_handle(required(sub, "file-name")?).await?;
            println!("{}", serde_json::to_string_pretty(&UploadResponse::from(handle))?);
            Ok(())
        }
        Some(("download-url", sub)) => {
            let settings = load_settings(sub)?;
            let service = PipelineService::new(&settings).await?;
            let handle = service.issue_download_handle(required(sub, "file-name")?).await?;
            println!("{}", serde_json::to_string_pretty(&DownloadResponse::from(handle))?);
            Ok(())
        }
        _ => Err(common::Error::InvalidInput(
            "No subcommand specified. Use --help for usage information.".into(),
        )),
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(cli().get_matches()).await {
        eprintln!("pipeline error: {}", e);
        process::exit(1);
    }
}
