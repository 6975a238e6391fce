use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::nzbstore::{ExternalDoc, NzbDocument, NzbStore};

/// Cooperative cancellation flag shared with the host; checked at batch and
/// per-row granularity.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One row's transition to external storage. All four external fields plus the
/// inline clear are applied as a single update, so a committed row is never
/// half-written.
#[derive(Clone, Debug)]
pub struct ExportUpdate {
    pub id: Uuid,
    pub external: ExternalDoc,
}

/// Seam to the relational queue catalog. Batches are keyset-paginated by row
/// id: ordering is deterministic, progress is resumable, and rows whose export
/// failed (still inline) are left behind the cursor for the next job run.
pub trait QueueStore {
    /// Number of rows still holding inline document text.
    fn count_inline(&self) -> Result<usize>;

    /// Inline rows ordered by id, strictly after `after`, at most `limit`.
    fn next_inline_batch(&self, after: Option<Uuid>, limit: usize) -> Result<Vec<NzbDocument>>;

    /// Apply completed exports transactionally and drop any change tracking
    /// accumulated for the batch.
    fn commit(&mut self, updates: &[ExportUpdate]) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct ExportOptions {
    pub batch_size: usize,
    pub delay_between_batches: Option<Duration>,
    pub report_path: Option<PathBuf>,
    pub reports_dir: PathBuf,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            delay_between_batches: Some(Duration::from_millis(500)),
            report_path: None,
            reports_dir: PathBuf::from("reports"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct ExportedEntry {
    pub queue_item_id: Uuid,
    pub job_name: Option<String>,
    pub category: Option<String>,
    pub relative_path: String,
    pub length_bytes: u64,
    pub sha256: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct FailedEntry {
    pub queue_item_id: Uuid,
    pub job_name: Option<String>,
    pub category: Option<String>,
    pub error: String,
}

/// Durable record of an export run: exactly which rows succeeded and failed.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct ExportReport {
    pub started_at_utc: DateTime<Utc>,
    pub completed_at_utc: DateTime<Utc>,
    pub total_inline_items_at_start: usize,
    pub exported_count: usize,
    pub exported: Vec<ExportedEntry>,
    pub failures: Vec<FailedEntry>,
}

pub struct ExportOutcome {
    pub report_path: PathBuf,
    pub report: ExportReport,
}

/// Batch migration of inline NZB documents into the external store. Safe to
/// interrupt and re-run: each batch commits independently, and exported rows
/// never reappear in the inline query.
pub struct ExportJob<'a, Q: QueueStore> {
    store: &'a NzbStore,
    queue: &'a mut Q,
    options: ExportOptions,
}

impl<'a, Q: QueueStore> ExportJob<'a, Q> {
    pub fn new(store: &'a NzbStore, queue: &'a mut Q, mut options: ExportOptions) -> Self {
        options.batch_size = options.batch_size.max(1);
        Self { store, queue, options }
    }

    pub fn run(&mut self, cancel: &CancelFlag) -> Result<ExportOutcome> {
        let mut report = ExportReport {
            started_at_utc: Utc::now(),
            completed_at_utc: Utc::now(),
            total_inline_items_at_start: self.queue.count_inline()?,
            exported_count: 0,
            exported: Vec::new(),
            failures: Vec::new(),
        };

        if report.total_inline_items_at_start == 0 {
            info!("no inline NZB documents found, nothing to export");
            return self.finish(report);
        }

        info!(
            total = report.total_inline_items_at_start,
            batch_size = self.options.batch_size,
            "beginning export of inline NZB documents"
        );

        let mut cursor: Option<Uuid> = None;
        while !cancel.is_cancelled() {
            let batch = self.queue.next_inline_batch(cursor, self.options.batch_size)?;
            if batch.is_empty() {
                break;
            }
            cursor = batch.last().map(|row| row.id);

            let mut updates = Vec::with_capacity(batch.len());
            let mut cancelled_mid_batch = false;
            for row in &batch {
                if cancel.is_cancelled() {
                    cancelled_mid_batch = true;
                    break;
                }
                match self.store.write(row.id, &row.contents) {
                    Ok(external) => {
                        report.exported.push(ExportedEntry {
                            queue_item_id: row.id,
                            job_name: row.job_name.clone(),
                            category: row.category.clone(),
                            relative_path: external.relative_path.clone(),
                            length_bytes: external.length,
                            sha256: external.sha256.clone(),
                        });
                        updates.push(ExportUpdate { id: row.id, external });
                    }
                    Err(e) => {
                        let error = format!("{e:#}");
                        error!(id = %row.id, error = %error, "failed to export inline NZB document");
                        report.failures.push(FailedEntry {
                            queue_item_id: row.id,
                            job_name: row.job_name.clone(),
                            category: row.category.clone(),
                            error,
                        });
                    }
                }
            }

            report.exported_count += updates.len();
            self.queue.commit(&updates)?;

            if cancelled_mid_batch {
                info!("export cancelled, completed rows committed");
                break;
            }

            let remaining = self.queue.count_inline()?;
            info!(
                batch_exported = updates.len(),
                exported = report.exported_count,
                total = report.total_inline_items_at_start,
                remaining,
                "export batch committed"
            );
            if remaining == 0 {
                break;
            }
            if let Some(delay) = self.options.delay_between_batches {
                if !delay.is_zero() {
                    debug!(?delay, "waiting before next export batch");
                    std::thread::sleep(delay);
                }
            }
        }

        self.finish(report)
    }

    fn finish(&self, mut report: ExportReport) -> Result<ExportOutcome> {
        report.completed_at_utc = Utc::now();
        let report_path = self.persist_report(&report)?;
        info!(
            successes = report.exported_count,
            failures = report.failures.len(),
            report = %report_path.display(),
            "inline NZB export finished"
        );
        Ok(ExportOutcome { report_path, report })
    }

    fn persist_report(&self, report: &ExportReport) -> Result<PathBuf> {
        let path = match &self.options.report_path {
            Some(path) => path.clone(),
            None => {
                fs::create_dir_all(&self.options.reports_dir).with_context(|| {
                    format!("create reports directory {}", self.options.reports_dir.display())
                })?;
                self.options.reports_dir.join(format!(
                    "export-inline-nzbs-{}.json",
                    Utc::now().format("%Y%m%d-%H%M%S")
                ))
            }
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create report directory {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(report).context("serialize export report")?;
        fs::write(&path, json)
            .with_context(|| format!("write export report {}", path.display()))?;
        Ok(path)
    }
}

/// In-memory queue catalog, optionally persisted to a pretty JSON file.
/// Stands in for the relational layer in tests and the CLI.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    rows: Vec<NzbDocument>,
    path: Option<PathBuf>,
}

impl MemoryQueueStore {
    pub fn new(rows: Vec<NzbDocument>) -> Self {
        Self { rows, path: None }
    }

    /// Load a catalog file and persist every committed batch back to it.
    pub fn open(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("read queue catalog {}", path.display()))?;
        let rows = serde_json::from_str(&json)
            .with_context(|| format!("parse queue catalog {}", path.display()))?;
        Ok(Self { rows, path: Some(path.to_path_buf()) })
    }

    pub fn rows(&self) -> &[NzbDocument] {
        &self.rows
    }
}

impl QueueStore for MemoryQueueStore {
    fn count_inline(&self) -> Result<usize> {
        Ok(self.rows.iter().filter(|r| r.is_inline()).count())
    }

    fn next_inline_batch(&self, after: Option<Uuid>, limit: usize) -> Result<Vec<NzbDocument>> {
        let mut batch: Vec<NzbDocument> = self
            .rows
            .iter()
            .filter(|r| r.is_inline() && after.map_or(true, |cursor| r.id > cursor))
            .cloned()
            .collect();
        batch.sort_by_key(|r| r.id);
        batch.truncate(limit);
        Ok(batch)
    }

    fn commit(&mut self, updates: &[ExportUpdate]) -> Result<()> {
        for update in updates {
            if let Some(row) = self.rows.iter_mut().find(|r| r.id == update.id) {
                row.external = Some(update.external.clone());
                row.contents.clear();
            }
        }
        if let Some(path) = &self.path {
            let json =
                serde_json::to_string_pretty(&self.rows).context("serialize queue catalog")?;
            fs::write(path, json)
                .with_context(|| format!("write queue catalog {}", path.display()))?;
        }
        Ok(())
    }
}
