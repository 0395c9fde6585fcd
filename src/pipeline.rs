use crate::detect::classify;
use crate::fetch::{FetchSettings, Fetcher};
use crate::logging::LogHandle;
use crate::model::{DatasetTask, RunReport, TaskOutcome, TaskReport};
use crate::normalize::{CONVERTED_NAME, normalize};
use crate::store::write_output;
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use url::Url;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub data_dir: PathBuf,
    pub fetch: FetchSettings,
    pub dataset: Option<String>,
    pub dry_run: bool,
}

/// Process every task in order. A failing task is logged and recorded; it
/// never stops the tasks after it.
pub fn run_all(tasks: &[DatasetTask], options: &RunOptions, log: &LogHandle) -> Result<RunReport> {
    log.in_scope(|| {
        let fetcher = Fetcher::new(&options.fetch).context("failed to set up downloader")?;
        info!(
            data_dir = %options.data_dir.display(),
            max_attempts = fetcher.policy().max_attempts,
            dry_run = options.dry_run,
            "data directory"
        );

        let selected: Vec<&DatasetTask> = tasks
            .iter()
            .filter(|task| options.dataset.as_ref().is_none_or(|key| task.key == *key))
            .collect();
        if let Some(key) = &options.dataset
            && selected.is_empty()
        {
            bail!("no configured dataset named {key}");
        }

        let mut report = RunReport::default();
        for task in selected {
            let outcome = match &task.source_url {
                None => {
                    info!(dataset = %task.key, "skipping dataset; no source url configured");
                    TaskOutcome::Skipped {
                        reason: "no source url configured".to_string(),
                    }
                }
                Some(url) => match process_task(&fetcher, task, url, options) {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        error!(dataset = %task.key, %url, error = ?err, "failed to process dataset");
                        TaskOutcome::Failed {
                            error: format!("{err:#}"),
                        }
                    }
                },
            };
            report.tasks.push(TaskReport {
                key: task.key.clone(),
                outcome,
            });
        }

        info!(
            saved = report.saved(),
            skipped = report.skipped(),
            failed = report.failed(),
            "run complete"
        );
        Ok(report)
    })
}

fn process_task(
    fetcher: &Fetcher,
    task: &DatasetTask,
    url: &str,
    options: &RunOptions,
) -> Result<TaskOutcome> {
    info!(dataset = %task.key, %url, "downloading dataset");
    let fetched = fetcher.fetch(url)?;

    let probed = fetcher.probe_content_type(url);
    let content_type = if probed.is_empty() {
        fetched.content_type_hint
    } else {
        probed
    };

    let kind = classify(&content_type, url, &fetched.bytes);
    info!(dataset = %task.key, %kind, content_type = %content_type, "payload classified");

    let outcome = normalize(fetched.bytes, kind)
        .with_context(|| format!("failed to normalize dataset {}", task.key))?;
    let path = resolve_output_path(
        &options.data_dir,
        &task.output_filename,
        url,
        outcome.suggested_name(),
    );
    let format = outcome.format();
    let bytes = outcome.into_bytes();

    if options.dry_run {
        info!(dataset = %task.key, bytes = bytes.len(), path = %path.display(), "dry run; not writing");
        return Ok(TaskOutcome::DryRun {
            path,
            bytes: bytes.len(),
            format,
        });
    }

    write_output(&path, &bytes)?;
    info!(dataset = %task.key, bytes = bytes.len(), path = %path.display(), "saved dataset");
    Ok(TaskOutcome::Saved {
        path,
        bytes: bytes.len(),
        format,
    })
}

/// Choose where a dataset lands.
///
/// Converted CSV always goes to the configured filename. Anything else keeps the
/// configured name only when it already ends in `.csv`; otherwise the name comes
/// from the last segment of the URL path.
pub fn resolve_output_path(
    data_dir: &Path,
    output_filename: &str,
    url: &str,
    suggested_name: &str,
) -> PathBuf {
    if suggested_name == CONVERTED_NAME || output_filename.to_ascii_lowercase().ends_with(".csv") {
        return data_dir.join(output_filename);
    }
    data_dir.join(filename_from_url(url).unwrap_or_else(|| output_filename.to_string()))
}

fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    if segment.is_empty() || segment == "." || segment == ".." {
        return None;
    }
    Some(segment.to_string())
}
