use anyhow::{bail, Context, Result};
use attribute_backfill::replies::write_pending;
use attribute_backfill::{
    interpret, load_dataset, select_pending, ApplyOptions, PendingExport, PromptTemplate, RunConfig, FIELD_COUNT,
};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use time::macros::format_description;

#[derive(Parser, Clone)]
#[command(name = "Attribute Backfill")]
#[command(about = "Fills missing product attributes in a CSV dataset from conversational assistant replies.")]
#[command(version = "1.0.0")]
struct Cli {
    #[arg(long, global = true, help = "Path to the run configuration YAML file")]
    config: Option<PathBuf>,
    #[arg(short, long, global = true, default_value = "INFO", help = "Logging level (DEBUG, INFO, WARN, ERROR)")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Clone)]
enum Command {
    /// Export rows whose target columns are all empty, one JSON object per line
    Select {
        #[arg(short, long, help = "Output JSONL file (stdout when omitted)")]
        output: Option<PathBuf>,
    },
    /// Interpret replies, merge them into the dataset and save it
    Apply {
        #[arg(short, long, help = "Reply JSONL file, or a directory searched for *.jsonl", required = true)]
        replies: PathBuf,
        #[arg(short, long, help = "Where to write the updated dataset (defaults to overwriting the input)")]
        output: Option<PathBuf>,
        #[arg(long, help = "Write a CSV audit log of every reply processed")]
        audit: Option<PathBuf>,
        #[arg(long, help = "Process replies without saving the dataset")]
        dry_run: bool,
    },
    /// Parse a single reply and print its four fields
    Interpret {
        #[arg(short, long, help = "File holding the reply text (stdin when omitted)")]
        input: Option<PathBuf>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Select { .. } => "select",
            Command::Apply { .. } => "apply",
            Command::Interpret { .. } => "interpret",
        }
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let millis = elapsed.subsec_millis();
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}.{:03}s", seconds, millis)
    }
}

fn init_logging(level: &str) -> Result<()> {
    let log_level = match level.to_uppercase().as_str() {
        "DEBUG" => LevelFilter::Debug,
        "INFO" => LevelFilter::Info,
        "WARN" | "WARNING" => LevelFilter::Warn,
        "ERROR" => LevelFilter::Error,
        _ => {
            eprintln!("Invalid log level '{}', defaulting to INFO.", level);
            LevelFilter::Info
        }
    };
    SimpleLogger::new()
        .with_level(log_level)
        .with_timestamp_format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .init()?;
    Ok(())
}

fn require_config(path: Option<&Path>) -> Result<RunConfig> {
    let Some(path) = path else {
        bail!("--config is required for this command");
    };
    info!("Loading run configuration from: {}", path.display());
    let config = RunConfig::load(path)
        .with_context(|| format!("Failed to load run configuration from {}", path.display()))?;
    if let Some(description) = &config.description {
        info!("Run: {}", description);
    }
    Ok(config)
}

fn run_select(config: &RunConfig, output: Option<&Path>) -> Result<()> {
    let (dataset, layout) = load_dataset(config)?;
    let pending = select_pending(&dataset, &layout, config.target_columns.as_slice())?;
    info!("Rows with {} empty: {} of {}", config.target_columns.join(", "), pending.len(), dataset.len());

    let template = config
        .prompt_template
        .as_deref()
        .map(|t| PromptTemplate::new(t, &dataset));
    let exports = pending.map(|record| {
        let prompt = template.as_ref().map(|t| t.render(&dataset, record.row_index));
        PendingExport::new(&config.identity_columns, &record, prompt)
    });

    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create pending export: {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    let written = write_pending(writer, exports)?;
    match output {
        Some(path) => info!("Exported {} pending rows to {}", written, path.display()),
        None => debug!("Exported {} pending rows to stdout", written),
    }
    Ok(())
}

fn run_apply(config: &RunConfig, options: &ApplyOptions<'_>) -> Result<()> {
    let progress_bar = ProgressBar::new(0);
    progress_bar.set_style(ProgressStyle::default_bar()
        .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .context("Failed to create progress bar template")?
        .progress_chars("=> "));

    let report = attribute_backfill::run_apply(config, options, |total, identity| {
        progress_bar.set_length(total as u64);
        progress_bar.set_message(identity.first().cloned().unwrap_or_default());
        progress_bar.inc(1);
    })?;
    let stats = &report.stats;
    progress_bar.finish_with_message(format!("{} merged, {} unmatched", stats.replies_merged, stats.replies_unmatched));

    info!("-------------------- FINAL SUMMARY --------------------");
    info!("Replies read: {} from {} file(s)", report.replies_read, report.files_read);
    info!("Malformed reply lines: {}", report.malformed_lines);
    info!("Replies merged: {}", stats.replies_merged);
    if stats.replies_unmatched > 0 {
        warn!("Replies with no matching row: {}", stats.replies_unmatched);
    }
    if stats.request_id_mismatches > 0 {
        warn!("Replies whose request_id did not match their identity: {}", stats.request_id_mismatches);
    }
    info!("Rows updated: {}", stats.rows_updated);
    info!(
        "Values determined / assumed / missing: {} / {} / {}",
        stats.tally.determined, stats.tally.assumed, stats.tally.missing
    );
    info!("Rows still pending: {} (was {})", report.pending_after, report.pending_before);
    match &report.saved_to {
        Some(path) => info!("Dataset saved to {}", path.display()),
        None => info!("Dataset not saved."),
    }
    Ok(())
}

fn run_interpret(config: Option<&RunConfig>, input: Option<&Path>) -> Result<()> {
    let reply = match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read reply from {}", path.display()))?,
        None => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text).context("Failed to read reply from stdin")?;
            text
        }
    };

    let parsed = interpret(&reply);
    info!("Parsed with {:?} strategy", parsed.strategy());
    let labels: Vec<String> = match config {
        Some(config) => config.target_columns.clone(),
        None => (1..=FIELD_COUNT).map(|i| format!("field_{}", i)).collect(),
    };
    let mut stdout = io::stdout().lock();
    for ((label, value), kind) in labels.iter().zip(parsed.fields()).zip(parsed.kinds()) {
        writeln!(stdout, "{}: {} [{}]", label, value, kind)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    info!("Starting Attribute Backfill ({})", cli.command.name());

    match &cli.command {
        Command::Select { output } => {
            let config = require_config(cli.config.as_deref())?;
            run_select(&config, output.as_deref())?;
        }
        Command::Apply { replies, output, audit, dry_run } => {
            let config = require_config(cli.config.as_deref())?;
            let options = ApplyOptions {
                replies,
                output: output.as_deref(),
                audit: audit.as_deref(),
                dry_run: *dry_run,
            };
            run_apply(&config, &options)?;
        }
        Command::Interpret { input } => {
            let config = match cli.config.as_deref() {
                Some(path) => Some(require_config(Some(path))?),
                None => None,
            };
            run_interpret(config.as_ref(), input.as_deref())?;
        }
    }

    info!("Total execution time: {}", format_elapsed(start_time.elapsed()));
    Ok(())
}
