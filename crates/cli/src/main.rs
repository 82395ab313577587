use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dicomsort_core::{
    config_figment, metrics, validate_config, Config, ConfigError, DicomMetadataReader,
    RunSummary, SortMode, TraversalScheduler, UnitOutcome, UnitReport,
};

/// Buffer size for the per-unit progress channel
const PROGRESS_BUFFER_SIZE: usize = 256;

/// Command-line arguments for dicomsort
#[derive(Parser, Debug)]
#[command(name = "dicomsort")]
#[command(about = "Reorganizes DICOM trees by header metadata")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "DICOMSORT_CONFIG")]
    config: Option<PathBuf>,

    /// Tree to read items or study folders from
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Output root (may equal the source in grouping mode)
    #[arg(short, long)]
    destination: Option<PathBuf>,

    /// Operating mode: hierarchical or grouping
    #[arg(short, long)]
    mode: Option<SortMode>,

    /// Maximum units processed concurrently
    #[arg(short, long)]
    workers: Option<usize>,

    /// Keep reading after the deciding item and report heterogeneous folders
    #[arg(long)]
    audit: bool,

    /// Skip heterogeneous folders instead of merging them
    #[arg(long)]
    strict: bool,

    /// Verify every copy with SHA-256
    #[arg(long)]
    verify_checksums: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Print Prometheus metrics after the run
    #[arg(long)]
    print_metrics: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.log_json);

    if let Err(e) = run(args).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Layers command-line flags over the config file and environment.
fn figment_for(args: &Args) -> Result<Figment, ConfigError> {
    if let Some(path) = &args.config {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
    }

    let mut figment = config_figment(args.config.as_deref());
    if let Some(source) = &args.source {
        figment = figment.merge(("source_root", source));
    }
    if let Some(destination) = &args.destination {
        figment = figment.merge(("destination_root", destination));
    }
    if let Some(mode) = args.mode {
        figment = figment.merge(("mode", mode));
    }
    if let Some(workers) = args.workers {
        figment = figment.merge(("scheduler.max_workers", workers));
    }
    if args.audit {
        figment = figment.merge(("grouping.audit_homogeneity", true));
    }
    if args.strict {
        figment = figment.merge(("grouping.strict", true));
    }
    if args.verify_checksums {
        figment = figment.merge(("copy.verify_checksums", true));
    }
    Ok(figment)
}

fn build_config(args: &Args) -> Result<Config> {
    let config: Config = figment_for(args)?
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
        .context("Failed to load configuration")?;
    validate_config(&config).context("Configuration validation failed")?;
    Ok(config)
}

async fn run(args: Args) -> Result<()> {
    let config = build_config(&args)?;
    info!(
        "Configuration loaded: {} mode, {} workers",
        config.mode, config.scheduler.max_workers
    );

    let scheduler = TraversalScheduler::new(config, DicomMetadataReader::new());

    let (progress_tx, mut progress_rx) = mpsc::channel::<UnitReport>(PROGRESS_BUFFER_SIZE);
    let quiet = args.json;
    let printer = tokio::spawn(async move {
        while let Some(report) = progress_rx.recv().await {
            if !quiet {
                println!("{}", report_line(&report));
            }
        }
    });

    let summary = scheduler
        .run_with_progress(progress_tx)
        .await
        .context("Run aborted")?;
    printer.await.context("Progress printer failed")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to encode summary")?
        );
    } else {
        println!("Finished processing.");
        println!("{}", summary_line(&summary));
    }

    if args.print_metrics {
        print!("{}", metrics::render().context("Failed to encode metrics")?);
    }

    Ok(())
}

/// One advisory line per finished unit.
fn report_line(report: &UnitReport) -> String {
    let path = report.unit.path.display();
    match &report.outcome {
        UnitOutcome::Placed { destination, .. } => {
            format!("Copied {} to {}", path, destination.display())
        }
        UnitOutcome::Merged {
            destination, files, ..
        } => {
            let note = if report.heterogeneous {
                " (heterogeneous)"
            } else {
                ""
            };
            format!(
                "Merged folder {} into {} ({} files){}",
                path,
                destination.display(),
                files,
                note
            )
        }
        UnitOutcome::Skipped { reason } => format!("Skipped {}: {}", path, reason),
        UnitOutcome::Failed { phase, error } => {
            format!("Failed {} during {}: {}", path, phase, error)
        }
    }
}

fn summary_line(summary: &RunSummary) -> String {
    let mut line = format!(
        "{} units: {} placed, {} merged, {} skipped, {} failed; {} files ({} bytes) copied in {} ms",
        summary.discovered,
        summary.placed,
        summary.merged,
        summary.skipped,
        summary.failed,
        summary.files_copied,
        summary.bytes_copied,
        summary.duration_ms
    );
    if summary.renamed > 0 || summary.rename_refusals > 0 {
        line.push_str(&format!(
            "; {} renamed, {} renames refused",
            summary.renamed, summary.rename_refusals
        ));
    }
    if summary.heterogeneous_folders > 0 {
        line.push_str(&format!(
            "; {} heterogeneous folders",
            summary.heterogeneous_folders
        ));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicomsort_core::scheduler::{Phase, SourceUnit};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn report(outcome: UnitOutcome) -> UnitReport {
        serde_json::from_value(serde_json::json!({
            "unit": { "path": "/in/A", "index": 0 },
            "outcome": outcome,
            "heterogeneous": false,
            "duration_ms": 3
        }))
        .unwrap()
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
source_root = "/from/file"
destination_root = "/out"
mode = "hierarchical"

[scheduler]
max_workers = 8
"#
        )
        .unwrap();

        let args = Args::try_parse_from([
            "dicomsort",
            "--config",
            file.path().to_str().unwrap(),
            "--source",
            "/from/flag",
            "--mode",
            "grouping",
            "--workers",
            "2",
            "--strict",
        ])
        .unwrap();

        let config = build_config(&args).unwrap();
        assert_eq!(config.source_root, PathBuf::from("/from/flag"));
        assert_eq!(config.destination_root, PathBuf::from("/out"));
        assert_eq!(config.mode, SortMode::Grouping);
        assert_eq!(config.scheduler.max_workers, 2);
        assert!(config.grouping.strict);
        assert!(!config.copy.verify_checksums);
    }

    #[test]
    fn test_missing_config_file() {
        let args =
            Args::try_parse_from(["dicomsort", "--config", "/nonexistent/dicomsort.toml"]).unwrap();
        let err = build_config(&args).unwrap_err();
        assert!(format!("{:#}", err).contains("not found"));
    }

    #[test]
    fn test_flags_alone_are_enough() {
        let args = Args::try_parse_from([
            "dicomsort",
            "--source",
            "/studies",
            "--destination",
            "/studies",
            "--mode",
            "grouping",
        ])
        .unwrap();

        let config = build_config(&args).unwrap();
        assert_eq!(config.source_root, config.destination_root);
    }

    #[test]
    fn test_invalid_combination_rejected() {
        let args = Args::try_parse_from([
            "dicomsort",
            "--source",
            "/studies",
            "--destination",
            "/studies",
        ])
        .unwrap();
        assert!(build_config(&args).is_err());
    }

    #[test]
    fn test_report_lines() {
        let merged = report(UnitOutcome::Merged {
            destination: PathBuf::from("/out/123"),
            files: 2,
            bytes: 10,
        });
        assert_eq!(
            report_line(&merged),
            "Merged folder /in/A into /out/123 (2 files)"
        );

        let failed = report(UnitOutcome::Failed {
            phase: Phase::Merge,
            error: "disk full".into(),
        });
        assert_eq!(
            report_line(&failed),
            "Failed /in/A during merge: disk full"
        );
        assert_eq!(
            failed.unit,
            SourceUnit {
                path: PathBuf::from("/in/A"),
                index: 0
            }
        );
    }
}
