//! `trace-impact` command line: parse trace matrices, segment change blocks,
//! keep a persisted requirement index and print change-impact reports.

use anyhow::{anyhow, Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use config::TraceConfig;
use flags::{EmbedMode, OutputFormat};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use trace_catalog::{extract_section, ChangeSegmenter, RequirementParser};
use trace_matcher::{
    render_json, render_text, AnalysisNotice, AnalysisReport, ImpactAnalyzer, IngestReport,
};
use trace_vector_store::{embedder_from_config, snapshot_path, BuildOutcome, RequirementIndex};

pub mod config;
mod flags;

#[derive(Parser)]
#[command(name = "trace-impact")]
#[command(about = "Rank the trace-matrix requirements a change is likely to impact", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ./trace-impact.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for reports)
    #[arg(long, global = true)]
    quiet: bool,

    /// Override embedding backend in this process
    #[arg(long, global = true, value_enum)]
    embed_mode: Option<EmbedMode>,

    /// Override embedding model id
    #[arg(long, global = true)]
    embed_model: Option<String>,

    /// Override index collection name
    #[arg(long, global = true)]
    collection: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the requirement records found in a trace matrix
    Parse(ParseArgs),

    /// Print the change units found in an operational-testing block
    Segment(SegmentArgs),

    /// Build (or reuse) the persisted requirement index for a trace matrix
    Ingest(IngestArgs),

    /// Rank impacted requirements for every change in a document
    Analyze(AnalyzeArgs),
}

#[derive(Args)]
struct ParseArgs {
    /// Trace matrix, one paragraph per line
    catalog: PathBuf,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SegmentArgs {
    /// Operational-testing text (or a full test plan with --extract-section)
    changes: PathBuf,

    /// Cut the change block out of a full test plan first
    #[arg(long)]
    extract_section: bool,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct IngestArgs {
    /// Trace matrix, one paragraph per line
    catalog: PathBuf,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Trace matrix, one paragraph per line
    catalog: PathBuf,

    /// Operational-testing text (or a full test plan with --extract-section)
    document: PathBuf,

    /// Cut the change block out of a full test plan first
    #[arg(long)]
    extract_section: bool,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Write the report to a file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

pub async fn main_entry() -> Result<()> {
    let mut cli = Cli::parse();

    // Keep stdout clean for JSON parsing
    let json_output = match &cli.command {
        Commands::Parse(args) => args.json,
        Commands::Segment(args) => args.json,
        Commands::Ingest(args) => args.json,
        Commands::Analyze(args) => args.format == OutputFormat::Json && args.output.is_none(),
    };
    if json_output {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    // reqwest/hyper internals are noisy at debug
    if !cli.verbose {
        builder.filter_module("hyper", log::LevelFilter::Warn);
    }
    builder.target(env_logger::Target::Stderr).init();

    let mut config = TraceConfig::load(cli.config.as_deref())?;
    if let Some(mode) = cli.embed_mode {
        config.embedding.mode = mode.as_domain();
    }
    if let Some(model) = cli.embed_model.take() {
        config.embedding.model = model;
    }
    if let Some(collection) = cli.collection.take() {
        config.index.collection = collection;
    }
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Parse(args) => run_parse(&args, &config)?,
        Commands::Segment(args) => run_segment(&args, &config)?,
        Commands::Ingest(args) => run_ingest(&args, &config).await?,
        Commands::Analyze(args) => run_analyze(&args, &config).await?,
    }
    Ok(())
}

fn run_parse(args: &ParseArgs, config: &TraceConfig) -> Result<()> {
    let parser = RequirementParser::new(config.parser.clone())?;
    let paragraphs = read_paragraphs(&args.catalog)?;
    let records = parser.parse_paragraphs(&paragraphs);
    log::info!(
        "Parsed {} requirements from {}",
        records.len(),
        args.catalog.display()
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        for record in &records {
            println!("{}: {}", record.id, record.text);
        }
    }
    Ok(())
}

fn run_segment(args: &SegmentArgs, config: &TraceConfig) -> Result<()> {
    let raw = read_text(&args.changes)?;
    let text = if args.extract_section {
        extract_section(&raw, &config.section).ok_or_else(|| {
            anyhow!(
                "Operational-testing section not found in {}",
                args.changes.display()
            )
        })?
    } else {
        raw.as_str()
    };

    let changes = ChangeSegmenter::new(&config.parser)?.segment(text);
    if changes.is_empty() {
        log::warn!("No changes found in {}", args.changes.display());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&changes)?);
    } else {
        for change in &changes {
            let declared = change
                .declared_requirement_id
                .as_ref()
                .map_or_else(|| "None".to_string(), ToString::to_string);
            println!("{} -> {declared}", change.description);
        }
    }
    Ok(())
}

async fn run_ingest(args: &IngestArgs, config: &TraceConfig) -> Result<()> {
    let (analyzer, snapshot) = open_analyzer(config).await?;
    let paragraphs = read_paragraphs(&args.catalog)?;
    let report: IngestReport = analyzer.ingest(&paragraphs).await?;

    if matches!(report.index, BuildOutcome::Rebuilt { .. }) {
        persist(&analyzer, &snapshot).await?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let (status, skipped) = match report.index {
            BuildOutcome::Reused { .. } => ("reused", 0),
            BuildOutcome::Rebuilt { skipped, .. } => ("rebuilt", skipped),
        };
        println!(
            "{status}: {} requirements in '{}' (corpus {}, {skipped} skipped)",
            report.index.indexed(),
            config.index.collection,
            report.corpus.short()
        );
    }
    Ok(())
}

async fn run_analyze(args: &AnalyzeArgs, config: &TraceConfig) -> Result<()> {
    let (analyzer, snapshot) = open_analyzer(config).await?;
    let paragraphs = read_paragraphs(&args.catalog)?;
    let document = read_text(&args.document)?;

    let report: AnalysisReport = if args.extract_section {
        analyzer.analyze_document(&paragraphs, &document).await?
    } else {
        analyzer.analyze(&paragraphs, &document).await?
    };

    let rebuilt_midway = report
        .notices
        .iter()
        .any(|n| matches!(n, AnalysisNotice::IndexRebuilt { .. }));
    if matches!(report.index, BuildOutcome::Rebuilt { .. }) || rebuilt_midway {
        persist(&analyzer, &snapshot).await?;
    }
    for notice in &report.notices {
        match notice {
            AnalysisNotice::NoChangesFound => {
                log::warn!("No changes found in {}", args.document.display());
            }
            AnalysisNotice::RequirementsSkipped { count } => {
                log::warn!("{count} requirements could not be embedded and were not matched");
            }
            AnalysisNotice::IndexRebuilt { retried } => {
                log::info!("Index rebuilt during analysis; {retried} changes re-matched");
            }
        }
    }

    let rendered = match args.format {
        OutputFormat::Text => render_text(&report.results),
        OutputFormat::Json => format!("{}\n", render_json(&report)?),
    };
    match &args.output {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            log::info!("Report written to {}", path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

/// Analyzer over the collection's index, restored from disk when a snapshot exists.
async fn open_analyzer(config: &TraceConfig) -> Result<(ImpactAnalyzer, PathBuf)> {
    let snapshot = snapshot_path(&config.index_dir()?, &config.index.collection);
    let index = Arc::new(
        RequirementIndex::new(config.index.collection.clone(), config.index.hnsw)?
            .with_embed_timeout(config.embedding.timeout()),
    );
    if snapshot.is_file() {
        match index.restore(&snapshot).await {
            Ok(restored) => log::debug!(
                "Restored {} requirements (corpus {}) from {}",
                restored.len(),
                restored.fingerprint().short(),
                snapshot.display()
            ),
            Err(err) => log::warn!(
                "Ignoring unreadable index snapshot {}: {err}",
                snapshot.display()
            ),
        }
    }

    let embedder =
        embedder_from_config(&config.embedding).context("Failed to set up the embedding provider")?;
    let analyzer = ImpactAnalyzer::new(index, embedder, config.analyzer_settings())?;
    Ok((analyzer, snapshot))
}

async fn persist(analyzer: &ImpactAnalyzer, snapshot: &Path) -> Result<()> {
    analyzer
        .index()
        .save(snapshot)
        .await
        .with_context(|| format!("Failed to save index snapshot to {}", snapshot.display()))
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// One paragraph per line, as exported from the source document.
fn read_paragraphs(path: &Path) -> Result<Vec<String>> {
    Ok(read_text(path)?.lines().map(str::to_string).collect())
}
