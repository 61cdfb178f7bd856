//! CLI entry point for doihive.

use std::collections::HashSet;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use clap::error::ErrorKind;
use doihive_core::parser::is_valid_doi;
use doihive_core::report::parse_retry_list;
use doihive_core::{
    AbortReason, DownloadEngine, HttpClient, Job, PipelineConfig, RunLogger, check_archive,
    extract_archive_dois, render_check, render_summary, run_batches,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

mod cli;
mod progress;

use cli::Args;
use progress::ProgressObserver;

/// Exit code when the batch driver stops on sustained rate limiting.
const EXIT_ANOMALY: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs).
    // Usage errors exit 1 like other setup errors; 2 is reserved for anomaly aborts.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => return usage_exit(&err),
    };

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn usage_exit(err: &clap::Error) -> ExitCode {
    err.print().ok();
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}

fn resolve_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(workers) = args.workers {
        config.workers = usize::from(workers);
    }
    if let Some(dir) = &args.pdf_dir {
        config.pdf_dir.clone_from(dir);
    }
    if let Some(mirror) = &args.mirror {
        config.mirror.clone_from(mirror);
    }
    if let Some(size) = args.batch_size {
        config.batch_size = size;
    }
    if let Some(secs) = args.cool_down {
        config.cool_down_secs = secs;
    }
    if let Some(rate) = args.max_failure_rate {
        config.max_failure_rate = rate;
    }
    config.validate()?;
    Ok(config)
}

fn log_base_dir(args: &Args, pdf_dir: &Path) -> PathBuf {
    if let Some(dir) = &args.log_dir {
        return dir.clone();
    }
    match pdf_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Archive DOIs first, then `--doi` values, deduplicated and cut to the budget.
fn collect_identifiers(archive_dois: Vec<String>, direct: &[String], budget: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids: Vec<String> = archive_dois
        .into_iter()
        .chain(direct.iter().map(|doi| doi.trim().to_string()))
        .filter(|doi| !doi.is_empty() && seen.insert(doi.clone()))
        .collect();
    if budget > 0 {
        ids.truncate(budget);
    }
    ids
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = resolve_config(&args)?;

    let mut archive_dois = Vec::new();
    if let Some(archive) = &args.archive {
        let check = check_archive(archive)?;
        if !args.quiet {
            println!("{}", render_check(&check));
        }
        if args.check_only {
            return Ok(ExitCode::SUCCESS);
        }
        archive_dois = extract_archive_dois(archive)?;
    }
    let mut direct = args.dois.clone();
    if let Some(path) = &args.retry_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading retry list {}", path.display()))?;
        let retry = parse_retry_list(&text);
        info!(path = %path.display(), dois = retry.len(), "Loaded retry list");
        direct.extend(retry);
    }
    for doi in &direct {
        if !is_valid_doi(doi.trim()) {
            warn!(doi = %doi, "argument does not look like a DOI; trying anyway");
        }
    }

    let identifiers = collect_identifiers(archive_dois, &direct, args.budget);
    if identifiers.is_empty() {
        if args.archive.is_none() && args.retry_file.is_none() && args.dois.is_empty() {
            bail!("nothing to do: pass --archive <DIR>, --retry-file <FILE> or --doi <DOI>");
        }
        info!("No DOIs found to process");
        return Ok(ExitCode::SUCCESS);
    }

    let mirror = config.mirror.trim_end_matches('/');
    let jobs: Vec<Job> = identifiers
        .iter()
        .map(|doi| Job::for_identifier(mirror, doi))
        .collect();
    info!(
        jobs = jobs.len(),
        workers = config.workers,
        mirror,
        pdf_dir = %config.pdf_dir.display(),
        "Starting retrieval"
    );

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling in-flight jobs");
            signal.cancel();
        }
    });

    let client = HttpClient::new(&config.transport_settings()).context("building HTTP client")?;
    let (page_policy, payload_policy) = config.retry_policies();
    let engine = DownloadEngine::new(config.workers, client)?
        .with_pacing(config.pacing())
        .with_retry_policies(page_policy, payload_policy)
        .with_cancellation(cancel);

    let show_progress = !args.quiet && io::stderr().is_terminal();
    let observer = ProgressObserver::new(jobs.len(), show_progress);
    let summary = run_batches(&engine, jobs, &config.pdf_dir, &config.batch_plan(), &observer).await;
    observer.finish();
    let summary = summary?;

    if !args.quiet {
        println!("{}", render_summary(&summary.total));
    }

    let log_base = log_base_dir(&args, &config.pdf_dir);
    match RunLogger::new(&log_base).and_then(|logger| logger.write_all(&summary.total)) {
        Ok(files) => {
            for file in files {
                info!(path = %file.display(), "Saved run log");
            }
        }
        Err(err) => warn!(error = %err, "Could not write run logs"),
    }

    match summary.aborted {
        Some(AbortReason::Anomaly { rate, consecutive }) => {
            error!(
                rate,
                consecutive,
                remaining = summary.remaining,
                "Stopped: mirror keeps rate limiting or challenging. Rerun later to continue."
            );
            Ok(ExitCode::from(EXIT_ANOMALY))
        }
        Some(AbortReason::Cancelled) => {
            warn!(remaining = summary.remaining, "Interrupted. Run again to resume.");
            Ok(ExitCode::SUCCESS)
        }
        None => Ok(ExitCode::SUCCESS),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_identifiers_dedups_and_applies_budget() {
        let archive = vec!["10.1000/a".to_string(), "10.1000/b".to_string()];
        let direct = vec![" 10.1000/b ".to_string(), "10.1000/c".to_string()];

        assert_eq!(
            collect_identifiers(archive.clone(), &direct, 0),
            ["10.1000/a", "10.1000/b", "10.1000/c"]
        );
        assert_eq!(collect_identifiers(archive, &direct, 2), ["10.1000/a", "10.1000/b"]);
    }

    #[test]
    fn test_log_base_dir_defaults_to_pdf_parent() {
        let args = Args::try_parse_from(["doihive"]).unwrap();
        assert_eq!(log_base_dir(&args, Path::new("./pdf")), PathBuf::from("."));
        assert_eq!(log_base_dir(&args, Path::new("pdf")), PathBuf::from("."));
        assert_eq!(
            log_base_dir(&args, Path::new("/data/out/pdf")),
            PathBuf::from("/data/out")
        );

        let args = Args::try_parse_from(["doihive", "--log-dir", "/tmp/x"]).unwrap();
        assert_eq!(log_base_dir(&args, Path::new("pdf")), PathBuf::from("/tmp/x"));
    }

    #[test]
    fn test_resolve_config_flags_override_defaults() {
        let args = Args::try_parse_from([
            "doihive",
            "-w",
            "7",
            "--mirror",
            "http://localhost:1",
            "--batch-size",
            "4",
        ])
        .unwrap();
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.workers, 7);
        assert_eq!(config.mirror, "http://localhost:1");
        assert_eq!(config.batch_size, 4);
    }

    #[test]
    fn test_usage_errors_exit_with_setup_failure() {
        let err = Args::try_parse_from(["doihive", "-w", "0"]).unwrap_err();
        assert_eq!(usage_exit(&err), ExitCode::FAILURE);

        let err = Args::try_parse_from(["doihive", "--help"]).unwrap_err();
        assert_eq!(usage_exit(&err), ExitCode::SUCCESS);
    }

    #[test]
    fn test_resolve_config_rejects_bad_rate() {
        let args = Args::try_parse_from(["doihive", "--max-failure-rate", "1.5"]).unwrap();
        assert!(resolve_config(&args).is_err());
    }
}
