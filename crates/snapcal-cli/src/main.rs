use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use snapcal_core::*;
use snapcal_provider::ProviderType;
use snapcal_schema::{CalendarEvent, ImageInput, Modality, RawExtractionInput};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const HISTORY_FILE: &str = "history.jsonl";

#[derive(Parser)]
#[command(name = "snapcal", version, about = "Turn photos and text into calendar events")]
struct Cli {
    #[arg(
        long,
        default_value = "~/.snapcal",
        help = "Config root directory (contains config/, logs/ and history)"
    )]
    config_root: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Extract events from text (argument, --file, or stdin)")]
    Text {
        #[arg(help = "Text to scan for events")]
        text: Option<String>,
        #[arg(long, conflicts_with = "text", help = "Read the text from a file")]
        file: Option<PathBuf>,
        #[arg(long, help = "Also write the events to an .ics file")]
        ics: Option<PathBuf>,
    },
    #[command(about = "Extract events from an image (flyer, screenshot, whiteboard)")]
    Image {
        #[arg(help = "Path to the image")]
        path: PathBuf,
        #[arg(long, help = "Mime type, guessed from the extension when omitted")]
        mime: Option<String>,
        #[arg(long, help = "Also write the events to an .ics file")]
        ics: Option<PathBuf>,
    },
    #[command(about = "Print the extraction prompt for the current date context")]
    Prompt {
        #[arg(long, value_enum, default_value = "image", help = "Prompt variant")]
        modality: ModalityArg,
    },
    #[command(about = "Show recent extraction attempts")]
    History {
        #[arg(long, default_value = "10", help = "Number of entries to show")]
        limit: usize,
    },
    #[command(about = "Validate config files")]
    Validate,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModalityArg {
    Image,
    Text,
}

impl From<ModalityArg> for Modality {
    fn from(arg: ModalityArg) -> Self {
        match arg {
            ModalityArg::Image => Modality::Image,
            ModalityArg::Text => Modality::Text,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();
    cli.config_root = expand_home(cli.config_root);

    let log_dir = cli.config_root.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "snapcal.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Text { text, file, ics } => {
            let content = read_text_input(text, file.as_deref())?;
            let (source, file_name) = text_source(file.as_deref());
            run_extraction(
                &cli.config_root,
                RawExtractionInput::text(content),
                source,
                file_name,
                ics,
            )
            .await?;
        }
        Commands::Image { path, mime, ics } => {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("failed to read image: {}", path.display()))?;
            let mime_type = mime.unwrap_or_else(|| guess_mime(&path));
            run_extraction(
                &cli.config_root,
                RawExtractionInput::Image(ImageInput::new(bytes, mime_type)),
                RecordSource::Image,
                display_name(&path),
                ics,
            )
            .await?;
        }
        Commands::Prompt { modality } => {
            let ctx = capture_context();
            print!("{}", PromptBuilder::new().build(modality.into(), &ctx));
        }
        Commands::History { limit } => {
            let store = JsonlHistoryStore::new(cli.config_root.join(HISTORY_FILE));
            let records = store.recent(limit)?;
            if records.is_empty() {
                println!("No extraction history yet.");
            }
            for record in records {
                println!("{}", format_record(&record));
            }
        }
        Commands::Validate => {
            let config = load_config(&cli.config_root.join("config"))?;
            let provider = match config.provider.provider_type {
                ProviderType::Gemini => "gemini",
            };
            println!(
                "Config valid. provider {provider}, model {}, calendar {}, reminder {} min.",
                config.provider.model, config.defaults.calendar, config.defaults.reminder_minutes
            );
        }
    }

    Ok(())
}

async fn run_extraction(
    root: &Path,
    input: RawExtractionInput,
    source: RecordSource,
    file_name: Option<String>,
    ics: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(&root.join("config"))?;
    let pipeline = ExtractionPipeline::from_config(&config)?;
    let ctx = capture_context();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let started = Instant::now();
    let outcome = pipeline.extract(input, &ctx, &cancel).await;

    let record = ProcessingRecord::from_outcome(source, file_name, &outcome, started.elapsed());
    let history = JsonlHistoryStore::new(root.join(HISTORY_FILE));
    if let Err(e) = history.append(&record) {
        tracing::warn!("failed to record history: {e:#}");
    }

    match outcome {
        Ok(events) => {
            println!("{}", serde_json::to_string_pretty(&events)?);
            if let Some(path) = ics {
                export_ics(&path, &events).await?;
            }
            Ok(())
        }
        Err(err) => {
            let message = user_message(&err);
            Err(anyhow::Error::new(err).context(message))
        }
    }
}

async fn export_ics(path: &Path, events: &[CalendarEvent]) -> Result<()> {
    let outcomes = IcsFileSink::new(path).insert(events).await;
    let failed: Vec<_> = outcomes.iter().filter(|o| !o.is_ok()).collect();
    for outcome in &failed {
        if let Err(reason) = &outcome.result {
            tracing::warn!(event_id = %outcome.event_id, "event not exported: {reason}");
        }
    }
    if failed.len() == outcomes.len() && !outcomes.is_empty() {
        return Err(anyhow!("no events were written to {}", path.display()));
    }
    eprintln!(
        "Wrote {} of {} events to {}",
        outcomes.len() - failed.len(),
        outcomes.len(),
        path.display()
    );
    Ok(())
}

/// What the user should see for each extraction outcome.
fn user_message(err: &ExtractionError) -> String {
    match err {
        ExtractionError::EmptyInput => {
            "Nothing to scan. Provide some text or a non-empty image.".to_string()
        }
        ExtractionError::UnsupportedMediaType(mime) => {
            format!("Only images can be processed (got {mime}).")
        }
        ExtractionError::ImageTooLarge { size, limit } => {
            format!("Image is too large ({size} bytes, limit is {limit} bytes).")
        }
        ExtractionError::ModelCallFailed(_) => {
            "Could not get an answer from the model. Please try again.".to_string()
        }
        ExtractionError::Cancelled => "Extraction cancelled.".to_string(),
        ExtractionError::NoEventsFound { .. } => {
            "No events detected. Try a different photo or text.".to_string()
        }
    }
}

fn read_text_input(text: Option<String>, file: Option<&Path>) -> Result<String> {
    if let Some(path) = file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("failed to read text file: {}", path.display()));
    }
    if let Some(text) = text {
        return Ok(text);
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("failed to read text from stdin")?;
    Ok(buf)
}

/// Text read from disk is recorded as a file source, with its name.
fn text_source(file: Option<&Path>) -> (RecordSource, Option<String>) {
    match file {
        Some(path) => (RecordSource::File, display_name(path)),
        None => (RecordSource::Text, None),
    }
}

fn guess_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

fn display_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

fn expand_home(path: PathBuf) -> PathBuf {
    if !path.starts_with("~") {
        return path;
    }
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(path.strip_prefix("~").unwrap_or(&path)),
        None => path,
    }
}

fn format_record(record: &ProcessingRecord) -> String {
    let status = if record.success { "ok" } else { "failed" };
    let mut line = format!(
        "{}  {:<5}  {:<6}  {} events  {} ms",
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        record.source,
        status,
        record.events_found,
        record.processing_time_ms
    );
    if let Some(name) = &record.file_name {
        line.push_str(&format!("  {name}"));
    }
    if let Some(error) = &record.error {
        line.push_str(&format!("  ({error})"));
    }
    line
}
