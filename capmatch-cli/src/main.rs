//! CapMatch CLI - bulk capacitor part-number matching from the command line.

use anyhow::Context;
use capmatch::{
    decode_token, extract_patterns, CheckpointManager, MatchEngine, MatchOptions, Matcher,
    RunSummary, StopHandle,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

/// Exit code of a run that stopped on Ctrl-C before finishing.
const EXIT_STOPPED: i32 = 2;

#[derive(Parser)]
#[command(name = "capmatch")]
#[command(about = "Capacitor part-number decoder and value matcher", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match every row of a CSV file and write matched/unmatched tables
    Run {
        /// Input CSV with part-number and value columns
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[command(flatten)]
        overrides: RunOverrides,

        /// JSON options file; flags override its values
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Discard any existing checkpoint before starting
        #[arg(long)]
        fresh: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,

        /// Do not render a progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Show the tokens and candidate values of one part number
    Decode {
        #[arg(value_name = "PART_NUMBER")]
        part_number: String,

        /// Stated value to match against (e.g. "0.1uF")
        #[arg(long)]
        value: Option<String>,

        /// Relative match tolerance
        #[arg(long, default_value_t = capmatch::matcher::DEFAULT_TOLERANCE)]
        tolerance: f64,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// Show the checkpoint of an output directory
    Status {
        #[arg(long, value_name = "DIR", default_value = "output")]
        output_dir: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
}

#[derive(Args)]
struct RunOverrides {
    /// Directory for output tables and checkpoints
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Rows per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Worker threads
    #[arg(short, long)]
    threads: Option<usize>,

    /// Rows between checkpoints
    #[arg(long)]
    checkpoint_interval: Option<usize>,

    /// Relative match tolerance
    #[arg(long)]
    tolerance: Option<f64>,

    /// Name of the part-number column
    #[arg(long)]
    part_column: Option<String>,

    /// Name of the value column
    #[arg(long)]
    value_column: Option<String>,
}

impl RunOverrides {
    fn apply(self, options: &mut MatchOptions) {
        if let Some(dir) = self.output_dir {
            options.output_dir = dir;
        }
        if let Some(n) = self.batch_size {
            options.batch_size = n;
        }
        if let Some(n) = self.threads {
            options.num_threads = n;
        }
        if let Some(n) = self.checkpoint_interval {
            options.checkpoint_interval = n;
        }
        if let Some(t) = self.tolerance {
            options.tolerance = t;
        }
        if let Some(column) = self.part_column {
            options.part_number_column = column;
        }
        if let Some(column) = self.value_column {
            options.value_column = column;
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output for scripts
    Json,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            input,
            overrides,
            config,
            fresh,
            format,
            no_progress,
        } => handle_run(&input, overrides, config.as_deref(), fresh, format, no_progress),
        Commands::Decode {
            part_number,
            value,
            tolerance,
            format,
        } => handle_decode(&part_number, value.as_deref(), tolerance, format),
        Commands::Status { output_dir, format } => handle_status(&output_dir, format),
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    process::exit(exit_code);
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template(
        "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} rows ({msg})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

fn signal_runtime() -> anyhow::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("capmatch-signal")
        .enable_all()
        .build()
        .context("failed to start signal handler")
}

/// Turn the first Ctrl-C into a stop request; the run then checkpoints at
/// the next batch boundary. A second Ctrl-C exits at once.
#[cfg(unix)]
fn watch_interrupts(runtime: &Runtime, stop: StopHandle) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    // Registering inside the runtime installs the handler before we return.
    let _guard = runtime.enter();
    let mut interrupts =
        signal(SignalKind::interrupt()).context("failed to install interrupt handler")?;
    runtime.spawn(async move {
        if interrupts.recv().await.is_none() {
            return;
        }
        tracing::warn!("Interrupt received, stopping at the next batch boundary");
        stop.request_stop();
        if interrupts.recv().await.is_some() {
            process::exit(130);
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn watch_interrupts(runtime: &Runtime, stop: StopHandle) -> anyhow::Result<()> {
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping at the next batch boundary");
            stop.request_stop();
        }
    });
    Ok(())
}

fn exit_code(summary: &RunSummary) -> i32 {
    if summary.is_complete() {
        0
    } else {
        EXIT_STOPPED
    }
}

fn handle_run(
    input: &Path,
    overrides: RunOverrides,
    config: Option<&Path>,
    fresh: bool,
    format: OutputFormat,
    no_progress: bool,
) -> anyhow::Result<i32> {
    let mut options = match config {
        Some(path) => MatchOptions::from_json_file(path)?,
        None => MatchOptions::default(),
    };
    overrides.apply(&mut options);

    if fresh {
        CheckpointManager::new(&options.output_dir)
            .clear_checkpoint()
            .context("failed to clear checkpoint")?;
    }

    let mut engine = MatchEngine::new(options)?;
    let bar = if no_progress || matches!(format, OutputFormat::Json) {
        None
    } else {
        Some(progress_bar())
    };
    if let Some(bar) = bar.clone() {
        engine = engine.with_progress_callback(move |processed, total, batch| {
            bar.set_length(total as u64);
            bar.set_position(processed as u64);
            bar.set_message(format!("batch {batch}"));
            Ok(())
        });
    }

    let runtime = signal_runtime()?;
    watch_interrupts(&runtime, engine.stop_handle())?;

    let result = engine.process_file(input);
    runtime.shutdown_background();
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    let summary = result?;

    match format {
        OutputFormat::Human => output_summary_human(&summary),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }
    Ok(exit_code(&summary))
}

fn output_summary_human(summary: &RunSummary) {
    println!("\nRun {}", if summary.is_complete() { "completed" } else { "stopped" });
    println!("{}", "─".repeat(60));
    println!("  Rows processed: {}/{}", summary.processed_rows, summary.total_rows);
    if summary.resumed_from > 0 {
        println!("  Resumed from:   {}", summary.resumed_from);
    }
    println!("  Batches:        {}", summary.batches);
    println!("  Matched:        {}", summary.matched_count);
    println!("  Unmatched:      {}", summary.unmatched_count);
    if let Some(ref path) = summary.matched_path {
        println!("\n  Matched table:   {}", path.display());
    }
    if let Some(ref path) = summary.unmatched_path {
        println!("  Unmatched table: {}", path.display());
    }
    if !summary.is_complete() {
        println!("\n  Checkpoint saved. Run the same command again to resume.");
    }
}

fn handle_decode(
    part_number: &str,
    value: Option<&str>,
    tolerance: f64,
    format: OutputFormat,
) -> anyhow::Result<i32> {
    let tokens = extract_patterns(Some(part_number));
    let evidence =
        value.and_then(|v| Matcher::new(tolerance).match_fields(Some(part_number), Some(v)));

    match format {
        OutputFormat::Human => {
            println!("\nPart number: {}", part_number);
            println!("{}", "─".repeat(60));
            if tokens.is_empty() {
                println!("  No candidate tokens");
            }
            for token in &tokens {
                println!("  {}", token);
                let candidates = decode_token(&token.text);
                if candidates.is_empty() {
                    println!("    (no reading)");
                }
                for candidate in candidates {
                    println!("    {:>16} pF  {}", candidate.value_pf, candidate.reading.as_str());
                }
            }
            if let Some(v) = value {
                match &evidence {
                    Some(e) => println!(
                        "\n  MATCHED {}: token {} ({}) = {} pF",
                        v,
                        e.token,
                        e.reading.as_str(),
                        e.candidate_pf
                    ),
                    None => println!("\n  UNMATCHED {}", v),
                }
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "part_number": part_number,
                "tokens": tokens.iter().map(|t| {
                    serde_json::json!({
                        "token": t.text,
                        "notation": t.notation,
                        "candidates": decode_token(&t.text),
                    })
                }).collect::<Vec<_>>(),
                "value": value,
                "match": evidence,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(0)
}

fn handle_status(output_dir: &Path, format: OutputFormat) -> anyhow::Result<i32> {
    let manager = CheckpointManager::new(output_dir);
    let metadata = manager
        .read_metadata()
        .with_context(|| format!("cannot read {}", manager.checkpoint_file().display()))?;

    match (format, metadata) {
        (OutputFormat::Json, metadata) => {
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
        (OutputFormat::Human, None) => {
            println!("No checkpoint in {}", output_dir.display());
        }
        (OutputFormat::Human, Some(m)) => {
            println!("\nCheckpoint: {}", manager.checkpoint_file().display());
            println!("{}", "─".repeat(60));
            println!("  State:     {}", if m.completed { "completed" } else { "in progress" });
            println!("  Rows:      {}/{}", m.processed_rows, m.total_rows);
            println!("  Input:     sha256 {}", m.input_digest);
            println!("  Tolerance: {}", m.tolerance);
            println!("  Columns:   {}, {}", m.part_number_column, m.value_column);
            println!("  Matched:   {}", m.matched_count);
            println!("  Unmatched: {}", m.unmatched_count);
            println!("  Saved at:  {}", m.timestamp.to_rfc3339());
        }
    }
    Ok(0)
}
