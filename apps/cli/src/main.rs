use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as AnyhowContext, Result};
use clap::{Parser, ValueEnum};
use fhirlift_bundle::{resolve_references, Bundle};
use fhirlift_client::{RestClient, Transport};
use fhirlift_submit::{submit_all, Reporter, SubmissionUnit, SubmitOptions};
use serde_json::Value as JsonValue;

/// Exit code for a run that completed processing, even if individual
/// resources failed to submit.
const SUCCESS: i32 = 0;
/// Exit code for read/parse failures, resolution failures, client
/// construction failures and usage errors.
const FAILURE: i32 = -1;

#[derive(Parser)]
#[command(
    name = "fhirlift",
    about = "Upload FHIR bundles to a server, resolving local references first",
    version,
    arg_required_else_help = true
)]
struct Cli {
    /// Path to a single bundle JSON file.
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Directory containing bundle JSON files (every *.json is processed).
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Base URL of the target FHIR server (absolute http(s) URI).
    #[arg(short, long)]
    url: String,

    /// Bearer token attached as an Authorization header on every request.
    #[arg(short, long)]
    token: Option<String>,

    /// How bundles are submitted.
    #[arg(short, long, value_enum, default_value = "split")]
    mode: Mode,

    /// Maximum number of in-flight requests.
    #[arg(long, default_value_t = 8)]
    concurrency: usize,

    /// Delay in milliseconds before the single retry after throttling.
    #[arg(long, default_value_t = 1000)]
    throttle_backoff_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Rewrite local references, then upsert each resource individually.
    Split,
    /// Submit each bundle as-is as one atomic transaction.
    Transaction,
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    std::process::exit(run(cli).await);
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> i32 {
    let files = match (&cli.file, &cli.dir) {
        (Some(_), Some(_)) => {
            tracing::error!("--file and --dir are mutually exclusive");
            return FAILURE;
        }
        (None, None) => {
            tracing::error!("one of --file or --dir is required");
            return FAILURE;
        }
        (Some(file), None) => vec![file.clone()],
        (None, Some(dir)) => match collect_bundle_files(dir) {
            Ok(files) => files,
            Err(err) => {
                tracing::error!("failed to list {}: {err:#}", dir.display());
                return FAILURE;
            }
        },
    };

    let transport: Arc<dyn Transport> = match RestClient::new(&cli.url, cli.token.clone()) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            tracing::error!("failed to construct client for {}: {err}", cli.url);
            return FAILURE;
        }
    };

    let options = SubmitOptions {
        concurrency: cli.concurrency,
        throttle_backoff: Duration::from_millis(cli.throttle_backoff_ms),
    };

    // A fatal condition in one file does not stop the remaining files; the
    // last processed file's result is the overall code. Skipped files don't
    // count as processed and leave the code alone.
    let mut code = SUCCESS;
    for file in &files {
        match process_file(file, Arc::clone(&transport), cli.mode, &options).await {
            FileStatus::Completed(file_code) => code = file_code,
            FileStatus::Skipped => {}
        }
    }
    code
}

/// Result of handling one input file.
enum FileStatus {
    /// The file was processed (successfully or not) and produced a code.
    Completed(i32),
    /// The file was not processable (unsupported bundle type) and must not
    /// affect the run's overall success determination.
    Skipped,
}

/// Every *.json file in the directory, in name order.
fn collect_bundle_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry
            .with_context(|| format!("reading {}", dir.display()))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

async fn process_file(
    path: &Path,
    transport: Arc<dyn Transport>,
    mode: Mode,
    options: &SubmitOptions,
) -> FileStatus {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::error!("failed to read {}: {err}", path.display());
            return FileStatus::Completed(FAILURE);
        }
    };

    let bundle_json: JsonValue = match serde_json::from_str(&contents) {
        Ok(json) => json,
        Err(err) => {
            tracing::error!("failed to parse {}: {err}", path.display());
            return FileStatus::Completed(FAILURE);
        }
    };

    let mut bundle: Bundle = match serde_json::from_value(bundle_json.clone()) {
        Ok(bundle) => bundle,
        Err(err) => {
            tracing::error!("{} is not a Bundle: {err}", path.display());
            return FileStatus::Completed(FAILURE);
        }
    };

    // Unprocessable types are skipped, not failed.
    let Some(bundle_type) = bundle.known_type() else {
        tracing::info!(
            "skipping {}: unsupported bundle type '{}'",
            path.display(),
            bundle.bundle_type
        );
        return FileStatus::Skipped;
    };

    let units = match mode {
        Mode::Transaction => vec![SubmissionUnit::Bundle {
            resource: bundle_json,
        }],
        Mode::Split => {
            let report = match resolve_references(&mut bundle) {
                Ok(report) => report,
                Err(err) => {
                    tracing::error!("failed to resolve references in {}: {err}", path.display());
                    return FileStatus::Completed(FAILURE);
                }
            };
            if !report.unresolved.is_empty() {
                tracing::warn!(
                    "{}: {} unresolved reference(s) left unchanged",
                    path.display(),
                    report.unresolved.len()
                );
            }
            split_units(&bundle)
        }
    };

    tracing::info!(
        bundle_type = %bundle_type,
        units = units.len(),
        "submitting {}",
        path.display()
    );

    let mut reporter = Reporter::new();
    submit_all(units, transport, options, &mut reporter).await;

    tracing::info!(
        succeeded = reporter.succeeded(),
        failed = reporter.failed(),
        "finished {}",
        path.display()
    );

    // Per-unit submission failures do not fail the run.
    FileStatus::Completed(SUCCESS)
}

/// One submission unit per entry resource.
fn split_units(bundle: &Bundle) -> Vec<SubmissionUnit> {
    let mut units = Vec::new();
    for (index, entry) in bundle.entry.iter().flatten().enumerate() {
        let Some(resource) = &entry.resource else {
            tracing::warn!("entry {index} has no resource, skipping");
            continue;
        };
        let Some(resource_type) = resource.get("resourceType").and_then(JsonValue::as_str) else {
            tracing::warn!("entry {index} resource has no resourceType, skipping");
            continue;
        };
        let Some(id) = resource.get("id").and_then(JsonValue::as_str) else {
            // Resolution reserves ids for mapped entries; an entry can still
            // land here without a fullUrl and without an id.
            tracing::warn!("entry {index} resource has no id, skipping");
            continue;
        };
        units.push(SubmissionUnit::Resource {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
            resource: resource.clone(),
        });
    }
    units
}
