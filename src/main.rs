//! Recap CLI - web article summarisation
//!
//! The application logic is contained in lib.rs, and this file is responsible
//! for parsing arguments, rendering progress and handling top-level errors.

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use recap::config::ConfigError;
use recap::{
    ChatClient, Config, DocumentLoader, Pipeline, ProgressEvent, Report, RunContext, TextSplitter,
    WebLoader,
};
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "recap")]
#[command(author, version, about = "Web article summarisation with streaming map-reduce", long_about = None)]
struct Cli {
    /// Path to a config file (defaults to ./recap.toml, then ~/.config/recap/recap.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarise a web article by URL
    Summarise {
        /// URL to summarise
        url: String,
        /// Chunk size in characters
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Summaries combined per LLM call when reducing
        #[arg(long)]
        batch_size: Option<usize>,
        /// Summarizer calls in flight at once
        #[arg(long)]
        concurrency: Option<usize>,
        /// Show the extracted chunks instead of summarising
        #[arg(long)]
        raw: bool,
    },
    /// Print the effective configuration
    Config,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    recap::setup_logging(cli.verbose);

    match cli.command {
        Commands::Summarise {
            url,
            chunk_size,
            batch_size,
            concurrency,
            raw,
        } => {
            let mut config = load_config(cli.config.as_ref())?;
            if let Some(size) = chunk_size {
                config.chunking.chunk_size = size;
            }
            if let Some(size) = batch_size {
                config.reduce.batch_size = size;
            }
            if let Some(n) = concurrency {
                config.reduce.concurrency = n;
            }
            config.validate()?;
            summarise(config, &url, raw).await?;
        }
        Commands::Config => {
            let mut config = load_config(cli.config.as_ref())?;
            for key in [&mut config.api.groq_key, &mut config.api.openai_key] {
                if key.is_some() {
                    *key = Some("********".to_string());
                }
            }
            print!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "recap", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

/// Ask for the API key on a terminal when the environment has none
fn ensure_api_key(config: &mut Config) -> anyhow::Result<()> {
    let provider = match config.api_key() {
        Ok(_) => return Ok(()),
        Err(ConfigError::MissingApiKey(provider)) => provider,
        Err(e) => return Err(e.into()),
    };
    if !atty::is(atty::Stream::Stdin) {
        return Err(ConfigError::MissingApiKey(provider).into());
    }

    let key = dialoguer::Password::new()
        .with_prompt(format!("Enter your {} API key", provider))
        .interact()
        .context("failed to read API key")?;
    config.set_api_key(key);
    Ok(())
}

async fn summarise(mut config: Config, url: &str, raw: bool) -> anyhow::Result<()> {
    let loader = WebLoader::new()?;
    let splitter = TextSplitter::new(config.chunking.chunk_size, config.chunking.overlap)?;
    eprintln!("Fetching: {}", url);

    if raw {
        let document = loader.load(url).await?;
        let chunks = splitter.split_segments(&document)?;
        for (i, chunk) in chunks.iter().enumerate() {
            println!("\n=== Chunk {}/{} ({} chars) ===\n", i + 1, chunks.len(), chunk.char_len());
            println!("{}", chunk.text());
        }
        return Ok(());
    }

    ensure_api_key(&mut config)?;
    let client = ChatClient::new(&config)?;
    let pipeline = Pipeline::new(&loader, &client, splitter, config.reduce.batch_size);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let renderer = tokio::spawn(render_progress(rx));
    let ctx = RunContext::new(&tx)
        .with_cancel(cancel)
        .with_concurrency(config.reduce.concurrency);

    let result = pipeline.run(url, &ctx).await;
    drop(ctx);
    drop(tx);
    renderer.await?;

    let report = result?;
    print_report(&report);
    Ok(())
}

/// Render progress on stderr and the streamed summary on stdout
async fn render_progress(mut rx: mpsc::UnboundedReceiver<ProgressEvent>) {
    let mut shown = 0usize;
    let mut stdout = std::io::stdout();

    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::DocumentLoaded {
                title,
                chars,
                preview,
            } => {
                let title = title.unwrap_or_else(|| "No title".to_string());
                eprintln!("Loaded {} ({} characters)", title.bold(), chars);
                eprintln!("{}", format!("{} ...", preview).dimmed());
            }
            ProgressEvent::DocumentSplit { chunks, largest } => {
                eprintln!(
                    "{}",
                    format!("Split into {} chunks. Largest chunk length: {}", chunks, largest)
                        .green()
                );
            }
            ProgressEvent::ChunkStarted { index, total } => {
                eprint!("\rSummarising chunk {}/{} ...", index + 1, total);
            }
            event @ ProgressEvent::ChunkSummarized { .. } => {
                if let Some(fraction) = event.fraction() {
                    eprint!(" {:.0}%", fraction * 100.0);
                }
            }
            ProgressEvent::ChunkFailed {
                index, total, error, ..
            } => {
                eprintln!(
                    "\r{}",
                    format!("Error in chunk {}/{}: {}", index + 1, total, error).yellow()
                );
            }
            ProgressEvent::LevelStarted {
                level,
                inputs,
                batches,
            } => {
                eprintln!(
                    "\rReducing level {}: {} summaries in {} batches",
                    level, inputs, batches
                );
            }
            ProgressEvent::BatchFailed {
                level,
                batch,
                error,
            } => {
                eprintln!(
                    "{}",
                    format!("Error in batch {} of level {}: {}", batch + 1, level, error).yellow()
                );
            }
            ProgressEvent::FinalStarted { inputs, .. } => {
                eprintln!("\rCombining {} summaries...\n", inputs);
            }
            ProgressEvent::FinalPartial { text } => {
                if let Some(delta) = text.get(shown..) {
                    print!("{}", delta);
                    let _ = stdout.flush();
                }
                shown = text.len();
            }
            ProgressEvent::FinalReset { error } => {
                println!();
                eprintln!(
                    "{}",
                    format!("Streaming failed ({}); retrying without streaming", error).yellow()
                );
                shown = 0;
            }
            ProgressEvent::FinalCompleted { text } => {
                if let Some(rest) = text.get(shown..) {
                    print!("{}", rest);
                }
                println!();
                let _ = stdout.flush();
            }
        }
    }
}

fn print_report(report: &Report) {
    let failed_chunks = report.leaf_failures.len();
    let mut line = format!(
        "Done: {}/{} chunks summarised",
        report.leaf_summaries, report.chunks
    );
    if !report.failed_batches.is_empty() {
        line.push_str(&format!(", {} batches dropped", report.failed_batches.len()));
    }
    if report.used_fallback {
        line.push_str(", final summary without streaming");
    }
    if failed_chunks > 0 || !report.failed_batches.is_empty() {
        eprintln!("\n{}", line.yellow());
    } else {
        eprintln!("\n{}", line.green());
    }
}
