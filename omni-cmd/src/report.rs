//! Running saved query descriptors.

use crate::rows::write_csv;
use log::{info, warn};
use omni_api::{sync_all, Account, AccountConfig, PollOptions, Query, ReportJob, ReportResult};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub fn poll_options(interval: u64, deadline: Option<u64>) -> PollOptions {
    PollOptions {
        initial_interval: interval,
        deadline: deadline.map(Duration::from_secs),
    }
}

/// Read a descriptor file and rebuild its query.
pub fn load_query(account: &Account, descriptor: &Path) -> anyhow::Result<Query> {
    let text = std::fs::read_to_string(descriptor)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", descriptor.display(), e))?;
    Ok(account.query_from_json(&text)?)
}

/// `<output_dir>/<descriptor stem>.csv`
pub fn batch_output(output_dir: &Path, descriptor: &Path) -> PathBuf {
    let stem = descriptor
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "report".to_string());
    output_dir.join(format!("{}.csv", stem))
}

fn write_report(report: &ReportResult, path: &Path) -> anyhow::Result<()> {
    let rows = report.rows()?;
    let file = File::create(path)?;
    write_csv(BufWriter::new(file), rows)?;
    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

pub async fn run_descriptor(
    config: &AccountConfig,
    descriptor: &Path,
    output: Option<&Path>,
    options: &PollOptions,
) -> anyhow::Result<()> {
    let account = Account::from_config(config).await?;
    let query = load_query(&account, descriptor)?;
    info!("Running {} against {}", descriptor.display(), query.suite().id());
    let report = query.run_with(options).await?;
    info!(
        "{} report for {} (queued {}s, ran {}s)",
        report.report_type, report.period, report.timing.queue, report.timing.execution
    );
    match output {
        Some(path) => write_report(&report, path),
        None => {
            println!("{}", serde_json::to_string_pretty(report.rows()?)?);
            Ok(())
        }
    }
}

pub async fn run_batch(
    config: &AccountConfig,
    descriptors: &[PathBuf],
    output_dir: &Path,
    options: &PollOptions,
) -> anyhow::Result<()> {
    let account = Account::from_config(config).await?;
    std::fs::create_dir_all(output_dir)?;

    let mut failures = 0;
    let mut jobs: Vec<ReportJob> = Vec::new();
    let mut paths: Vec<&PathBuf> = Vec::new();
    for descriptor in descriptors {
        match load_query(&account, descriptor) {
            Ok(query) => {
                jobs.push(query.job());
                paths.push(descriptor);
            }
            Err(e) => {
                warn!("Skipping {}: {}", descriptor.display(), e);
                failures += 1;
            }
        }
    }

    info!("Running {} reports", jobs.len());
    let results = sync_all(&mut jobs, options).await;
    for (descriptor, result) in paths.into_iter().zip(results) {
        let written = match result {
            Ok(report) => write_report(&report, &batch_output(output_dir, descriptor)),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = written {
            warn!("Report {} failed: {}", descriptor.display(), e);
            failures += 1;
        }
    }

    if !descriptors.is_empty() && failures == descriptors.len() {
        anyhow::bail!("All {} reports failed", descriptors.len());
    }
    Ok(())
}
