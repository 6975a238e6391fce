use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

use nzbfs_core::export::{CancelFlag, ExportJob, ExportOptions, MemoryQueueStore};
use nzbfs_core::nzbstore::NzbStore;

#[derive(Parser)]
#[command(name = "nzbfs", version, about = "nzbfs storage tools")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Export inline NZB documents from a queue catalog into external storage
    Export {
        /// Queue catalog file (JSON array of queue documents)
        #[arg(long)]
        queue: PathBuf,
        /// Root directory for exported .nzb.gz documents
        #[arg(long)]
        nzb_dir: PathBuf,
        #[arg(long)]
        batch_size: Option<usize>,
        /// Pause between batches, milliseconds (0 disables)
        #[arg(long)]
        delay_ms: Option<u64>,
        #[arg(long)]
        report_path: Option<PathBuf>,
        #[arg(long, default_value = "reports")]
        reports_dir: PathBuf,
    },
    /// Re-hash every blob in a metadata store and report mismatches
    Blobcheck { metadata_dir: PathBuf },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Export { queue, nzb_dir, batch_size, delay_ms, report_path, reports_dir } => {
            export(&queue, nzb_dir, batch_size, delay_ms, report_path, reports_dir)?;
        }
        Cmd::Blobcheck { metadata_dir } => blobcheck(&metadata_dir)?,
    }
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_env("NZBFS_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn export(
    queue: &Path,
    nzb_dir: PathBuf,
    batch_size: Option<usize>,
    delay_ms: Option<u64>,
    report_path: Option<PathBuf>,
    reports_dir: PathBuf,
) -> Result<()> {
    let batch_size = batch_size.or_else(|| env_usize("NZBFS_EXPORT_BATCH_SIZE")).unwrap_or(100);
    let delay_ms = delay_ms.or_else(|| env_u64("NZBFS_EXPORT_DELAY_MS")).unwrap_or(500);
    let report_path = report_path
        .or_else(|| std::env::var("NZBFS_EXPORT_REPORT_PATH").ok().map(PathBuf::from));

    let store = NzbStore::new(nzb_dir);
    let mut rows = MemoryQueueStore::open(queue)
        .with_context(|| format!("open queue catalog {}", queue.display()))?;
    let options = ExportOptions {
        batch_size,
        delay_between_batches: (delay_ms > 0).then(|| Duration::from_millis(delay_ms)),
        report_path,
        reports_dir,
    };
    let outcome = ExportJob::new(&store, &mut rows, options).run(&CancelFlag::new())?;

    eprintln!(
        "Exported {}/{} document(s), {} failure(s)",
        outcome.report.exported_count,
        outcome.report.total_inline_items_at_start,
        outcome.report.failures.len()
    );
    println!("{}", outcome.report_path.display());
    Ok(())
}

fn blobcheck(metadata_dir: &Path) -> Result<()> {
    if !metadata_dir.is_dir() {
        bail!("no metadata store at {}", metadata_dir.display());
    }
    let blobs: Vec<PathBuf> = WalkDir::new(metadata_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().map(|ext| ext != "tmp").unwrap_or(true))
        .collect();

    let verdicts: Vec<(PathBuf, BlobStatus)> =
        blobs.par_iter().map(|path| (path.clone(), check_blob(path))).collect();

    let mut ok = 0usize;
    let mut corrupt = 0usize;
    let mut foreign = 0usize;
    for (path, status) in &verdicts {
        match status {
            BlobStatus::Ok => ok += 1,
            BlobStatus::Foreign => foreign += 1,
            BlobStatus::Corrupt { expected, actual } => {
                corrupt += 1;
                eprintln!(
                    "{}: digest mismatch (expected {}, found {})",
                    path.display(),
                    expected,
                    actual
                );
            }
            BlobStatus::Unreadable(msg) => {
                corrupt += 1;
                eprintln!("{}: read ERROR ({})", path.display(), msg);
            }
        }
    }

    println!("Blobs ok={}, corrupt={}, foreign={}", ok, corrupt, foreign);
    if corrupt > 0 {
        bail!("{} corrupt blob(s) under {}", corrupt, metadata_dir.display());
    }
    Ok(())
}

enum BlobStatus {
    Ok,
    Corrupt { expected: String, actual: String },
    /// Not named by a 64-char hex digest; not one of ours.
    Foreign,
    Unreadable(String),
}

fn check_blob(path: &Path) -> BlobStatus {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if name.len() != 64 || !name.bytes().all(|b| b.is_ascii_hexdigit()) {
        return BlobStatus::Foreign;
    }
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => return BlobStatus::Unreadable(e.to_string()),
    };
    let actual = hex::encode(Sha256::digest(&bytes));
    if actual == name.to_ascii_lowercase() {
        BlobStatus::Ok
    } else {
        BlobStatus::Corrupt { expected: name.to_string(), actual }
    }
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
