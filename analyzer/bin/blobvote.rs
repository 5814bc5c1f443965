//! Command-line front end for the blobvote analyzer
//!
//! Parses one simulation log, aggregates the accepted records and writes the
//! records, the parse report and every aggregate view as JSON files that
//! plotting and summary tools can pick up.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blobvote_analyzer::{
    aggregate, AnalyzerConfig, LayoutKind, LogParser, ParsedLog, SourceFormat,
};
use chrono::{DateTime, Utc};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use tracing::{info, warn};

/// Written last, describing the run that produced the other files
#[derive(Debug, Serialize)]
struct Manifest<'a> {
    input: &'a Path,
    generated_at: DateTime<Utc>,
    config: &'a AnalyzerConfig,
    accepted: usize,
    rejected: usize,
    files: Vec<&'static str>,
}

fn cli() -> Command {
    Command::new("blobvote")
        .version(clap::crate_version!())
        .about("Parse blob-voting simulation logs and export aggregate views as JSON")
        .arg(
            Arg::new("input")
                .value_name("INPUT")
                .help("Simulation log (box-drawn table or CSV)")
                .required_unless_present("print-config")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .help("Input format (auto, box, csv)"),
        )
        .arg(
            Arg::new("layout")
                .short('l')
                .long("layout")
                .value_name("LAYOUT")
                .help("Layout assumed before any header row (counted, bitstring)"),
        )
        .arg(
            Arg::new("threshold")
                .short('t')
                .long("threshold")
                .value_name("N")
                .help("Untagged proposer ids at or above N are malicious")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("window")
                .short('w')
                .long("window")
                .value_name("N")
                .help("Rolling window for both per-block and per-blob series")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("center")
                .long("center")
                .help("Center rolling windows instead of trailing them")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("max-samples")
                .long("max-samples")
                .value_name("N")
                .help("Rejected lines kept verbatim in the parse report")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("output-dir")
                .short('o')
                .long("output-dir")
                .value_name("DIR")
                .help("Directory for the exported JSON files")
                .default_value("./blobvote_out")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("print-config")
                .long("print-config")
                .help("Print the effective configuration as TOML and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("fail-on-reject")
                .long("fail-on-reject")
                .help("Exit with a non-zero status if any line was rejected")
                .action(ArgAction::SetTrue),
        )
}

/// Layer command-line flags over the file and environment configuration
fn effective_config(matches: &ArgMatches) -> Result<AnalyzerConfig> {
    let file = matches.get_one::<PathBuf>("config");
    let mut config = AnalyzerConfig::load(file.map(PathBuf::as_path))
        .context("failed to load configuration")?;

    if let Some(format) = matches.get_one::<String>("format") {
        let format: SourceFormat = format.parse().map_err(anyhow::Error::msg)?;
        config = config.with_format(format);
    }
    if let Some(layout) = matches.get_one::<String>("layout") {
        let layout: LayoutKind = layout.parse().map_err(anyhow::Error::msg)?;
        config = config.with_layout_hint(layout);
    }
    if let Some(&threshold) = matches.get_one::<u64>("threshold") {
        config = config.with_honesty_threshold(threshold);
    }
    if let Some(&samples) = matches.get_one::<usize>("max-samples") {
        config = config.with_max_rejection_samples(samples);
    }
    if let Some(&window) = matches.get_one::<usize>("window") {
        let centered = config.center_rolling;
        config = config.with_rolling_window(window, centered);
    }
    if matches.get_flag("center") {
        config = config.with_centered_rolling(true);
    }

    config.validate()?;
    Ok(config)
}

fn write_json<T: Serialize + ?Sized>(dir: &Path, name: &str, value: &T) -> Result<()> {
    let path = dir.join(name);
    let file = File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn export(parsed: &ParsedLog, config: &AnalyzerConfig, input: &Path, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let aggregates = aggregate(&parsed.records);
    let mut files = vec![
        "records.json",
        "parse_report.json",
        "per_block.json",
        "per_blob.json",
        "rolling_per_block.json",
        "rolling_per_blob.json",
    ];

    write_json(dir, "records.json", &parsed.records)?;
    write_json(dir, "parse_report.json", &parsed.report)?;
    write_json(dir, "per_block.json", &aggregates.per_block)?;
    write_json(dir, "per_blob.json", &aggregates.per_blob)?;
    write_json(
        dir,
        "rolling_per_block.json",
        &aggregates.per_block.rolling(config.block_rolling_window()),
    )?;
    write_json(
        dir,
        "rolling_per_blob.json",
        &aggregates.per_blob.rolling(config.blob_rolling_window()),
    )?;

    match &aggregates.voter_correlation {
        Some(matrix) => {
            write_json(dir, "voter_correlation.json", matrix)?;
            files.push("voter_correlation.json");
            if let Some(mean) = matrix.mean_pairwise() {
                info!("{} voters, mean pairwise correlation {:.3}", matrix.voters, mean);
            }
        }
        None => info!("no ballot vectors in input, skipping voter correlation"),
    }

    info!(
        "{} blocks, {} blobs ({} confirmed)",
        aggregates.per_block.len(),
        aggregates.per_blob.len(),
        aggregates.per_blob.confirmed_groups()
    );

    let manifest = Manifest {
        input,
        generated_at: Utc::now(),
        config,
        accepted: parsed.report.accepted,
        rejected: parsed.report.rejected,
        files,
    };
    write_json(dir, "manifest.json", &manifest)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let config = effective_config(&matches)?;

    if matches.get_flag("print-config") {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let input = matches
        .get_one::<PathBuf>("input")
        .context("no input file given")?;
    let output_dir = matches
        .get_one::<PathBuf>("output-dir")
        .context("no output directory given")?;

    let parser = LogParser::new(config.clone());
    let parsed = parser
        .parse_path(input)
        .with_context(|| format!("failed to parse {}", input.display()))?;

    for sample in &parsed.report.samples {
        warn!(
            "line {} rejected ({:?}): {}",
            sample.line_number, sample.kind, sample.reason
        );
    }

    export(&parsed, &config, input, output_dir)?;
    info!("wrote results to {}", output_dir.display());

    if matches.get_flag("fail-on-reject") && !parsed.report.is_clean() {
        anyhow::bail!(
            "{} of {} data lines rejected",
            parsed.report.rejected,
            parsed.report.data_lines()
        );
    }

    Ok(())
}
