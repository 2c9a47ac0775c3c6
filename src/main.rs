//! docscan - identity document OCR from the command line
//!
//! Extracts fields from whole documents or selected regions and inspects
//! the selection history and extraction log kept under the data directory.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use docscan_ocr::{paths, AppConfig, DocumentType, ExtractionService, Rect};

/// docscan - identity document OCR
#[derive(Parser, Debug)]
#[command(name = "docscan")]
#[command(about = "Extracts structured fields from RG, CNH and CRECI document images")]
struct Args {
    /// Path to config.json (defaults to the one next to the executable)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract every field from a whole document image
    Extract {
        image: PathBuf,
        /// rg, cnh or creci (defaults to the configured type)
        #[arg(long)]
        doc_type: Option<DocumentType>,
    },
    /// Extract one field from a rectangle of an image
    Region {
        image: PathBuf,
        #[arg(long)]
        x: u32,
        #[arg(long)]
        y: u32,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        /// Field key, e.g. cpf or nomeCompleto
        #[arg(long)]
        field: String,
        #[arg(long)]
        doc_type: Option<DocumentType>,
        /// Selection history key (defaults to the image file name)
        #[arg(long)]
        image_id: Option<String>,
    },
    /// Print the selection history of an image
    History { image_id: String },
    /// Print the success rate and field ranking
    Stats,
    /// Write the HTML report
    Report {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Write the recent log entries as JSON
    Export {
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn init_logging(data_dir: &Path) -> Result<()> {
    let log_path = paths::logs_dir(data_dir).join("docscan.log");
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open {}", log_path.display()))?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(log_file)))
        .try_init()?;

    Ok(())
}

fn load_config(explicit: Option<&Path>) -> AppConfig {
    // Logging needs the data dir, so config loading reports to stderr only.
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::with_default(bootstrap, || AppConfig::load(explicit))
}

fn write_output(output: Option<&Path>, contents: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, contents)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => println!("{contents}"),
    }
    Ok(())
}

async fn run(service: &ExtractionService, command: Command) -> Result<()> {
    match command {
        Command::Extract { image, doc_type } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("Failed to read {}", image.display()))?;
            let result = match doc_type {
                Some(doc_type) => service.extract_document_as(&bytes, doc_type).await?,
                None => service.extract_document(&bytes).await?,
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Region {
            image,
            x,
            y,
            width,
            height,
            field,
            doc_type,
            image_id,
        } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("Failed to read {}", image.display()))?;
            let image_id = image_id.unwrap_or_else(|| {
                image
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| image.display().to_string())
            });
            let doc_type = doc_type.unwrap_or_else(|| service.engine().document_type());
            let value = service
                .extract_region(&bytes, &image_id, Rect::new(x, y, width, height), &field, doc_type)
                .await?;
            println!("{value}");
        }
        Command::History { image_id } => {
            let records = service.selection_history(&image_id);
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Stats => {
            let log = service.log();
            println!("Entries: {}", log.len());
            println!("Success rate: {:.1}%", log.success_rate());
            for field in log.most_successful_fields() {
                println!(
                    "  {:<16} {:>5.1}% ({} of {} mappings)",
                    field.field_name,
                    field.rate * 100.0,
                    field.confident,
                    field.mappings
                );
            }
        }
        Command::Report { output } => {
            write_output(output.as_deref(), &service.log().generate_report())?;
        }
        Command::Export { output } => match output {
            Some(path) => {
                service.log().export_to_file(&path)?;
                info!("Exported log to {}", path.display());
            }
            None => println!("{}", service.log().export_json()?),
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref());
    let data_dir = config.data_dir();
    paths::ensure_directories(&data_dir)?;
    init_logging(&data_dir)?;

    info!("docscan starting (data dir: {})", data_dir.display());

    let service = ExtractionService::from_config(&config);
    let result = run(&service, args.command).await;
    service.shutdown().await;

    if let Err(e) = &result {
        warn!("Command failed: {:#}", e);
    }
    result
}
