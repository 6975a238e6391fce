use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::warn;

use crate::catalog::{FsNode, IngestStaging, NodeKind};
use crate::layout::{FilePart, Layout, MultipartMeta, RarVolume, SegmentId};
use crate::metastore::{MetadataStore, StoredPayload};
use crate::obfuscation;

/// Parser output consumed by the aggregators. The archive processors that
/// produce these live outside this crate.
#[derive(Clone, Debug)]
pub enum ProcessorResult {
    Flat(FlatResult),
    Rar(RarResult),
    SevenZip(SevenZipResult),
    MultipartMkv(MkvResult),
}

#[derive(Clone, Debug)]
pub struct FlatResult {
    pub file_name: String,
    pub file_size: u64,
    pub release_date: Option<DateTime<Utc>>,
    pub segment_ids: Vec<SegmentId>,
}

#[derive(Clone, Debug)]
pub struct RarResult {
    pub files: Vec<RarOutput>,
}

/// One logical file reassembled from an archive volume set.
#[derive(Clone, Debug)]
pub struct RarOutput {
    pub name: String,
    pub release_date: Option<DateTime<Utc>>,
    pub volumes: Vec<RarVolume>,
}

#[derive(Clone, Debug)]
pub struct SevenZipResult {
    pub files: Vec<ArchiveEntry>,
}

/// One output file of a generic multi-part container, addressed by its path
/// within the archive.
#[derive(Clone, Debug)]
pub struct ArchiveEntry {
    pub path_in_archive: String,
    pub release_date: Option<DateTime<Utc>>,
    pub meta: MultipartMeta,
}

#[derive(Clone, Debug)]
pub struct MkvResult {
    pub file_name: String,
    pub release_date: Option<DateTime<Utc>>,
    pub parts: Vec<FilePart>,
}

/// Shared aggregator context: the mount directory an ingestion run attaches
/// its nodes under, the metadata store, and whether this run fully
/// health-checked the content.
pub struct AggregatorCtx<'a> {
    pub metadata: &'a MetadataStore,
    pub mount: &'a FsNode,
    pub checked_full_health: bool,
}

impl AggregatorCtx<'_> {
    fn health_stamp(&self) -> Option<DateTime<Utc>> {
        self.checked_full_health.then(Utc::now)
    }

    // The offload policy, applied uniformly: hash-only row when the store is
    // enabled, inline row otherwise.
    fn stored(&self, layout: Layout) -> Result<StoredPayload<Layout>> {
        if self.metadata.is_enabled() {
            Ok(StoredPayload::Offloaded { hash: self.metadata.put(&layout)? })
        } else {
            Ok(StoredPayload::Inline(layout))
        }
    }
}

/// The aggregator contract: filter a heterogeneous batch of parser results to
/// the container kind understood, and stage tree nodes plus layout rows for
/// every match. Aggregators never commit.
pub trait Aggregate {
    fn stage(
        &self,
        ctx: &AggregatorCtx,
        results: &[ProcessorResult],
        staging: &mut IngestStaging,
    ) -> Result<()>;
}

pub struct FlatAggregator;
pub struct RarAggregator;
pub struct SevenZipAggregator;
pub struct MkvAggregator;

impl Aggregate for FlatAggregator {
    fn stage(
        &self,
        ctx: &AggregatorCtx,
        results: &[ProcessorResult],
        staging: &mut IngestStaging,
    ) -> Result<()> {
        for result in results {
            let ProcessorResult::Flat(flat) = result else { continue };
            if flat.file_name.is_empty() {
                warn!("skipping flat file with undetermined name");
                continue;
            }
            let node = FsNode::new_file(
                ctx.mount,
                &flat.file_name,
                flat.file_size,
                NodeKind::FlatFile,
                flat.release_date,
                ctx.health_stamp(),
            );
            let layout = ctx.stored(Layout::Flat { segment_ids: flat.segment_ids.clone() })?;
            staging.stage(node, layout);
        }
        Ok(())
    }
}

impl Aggregate for RarAggregator {
    fn stage(
        &self,
        ctx: &AggregatorCtx,
        results: &[ProcessorResult],
        staging: &mut IngestStaging,
    ) -> Result<()> {
        let outputs: Vec<&RarOutput> = results
            .iter()
            .filter_map(|r| match r {
                ProcessorResult::Rar(rar) => Some(&rar.files),
                _ => None,
            })
            .flatten()
            .collect();

        for output in &outputs {
            if output.name.is_empty() {
                warn!("skipping archive output with undetermined name");
                continue;
            }
            let name = archive_output_name(&output.name, outputs.len(), ctx.mount);
            let size: u64 = output.volumes.iter().map(|v| v.byte_count).sum();
            let node = FsNode::new_file(
                ctx.mount,
                &name,
                size,
                NodeKind::RarFile,
                output.release_date,
                ctx.health_stamp(),
            );
            let layout = ctx.stored(Layout::Rar { volumes: output.volumes.clone() })?;
            staging.stage(node, layout);
        }
        Ok(())
    }
}

impl Aggregate for SevenZipAggregator {
    fn stage(
        &self,
        ctx: &AggregatorCtx,
        results: &[ProcessorResult],
        staging: &mut IngestStaging,
    ) -> Result<()> {
        let entries: Vec<&ArchiveEntry> = results
            .iter()
            .filter_map(|r| match r {
                ProcessorResult::SevenZip(sz) => Some(&sz.files),
                _ => None,
            })
            .flatten()
            .collect();

        for entry in &entries {
            let (dir_path, file_name) = split_archive_path(&entry.path_in_archive);
            if file_name.is_empty() {
                warn!(path = %entry.path_in_archive, "skipping archive entry with undetermined name");
                continue;
            }
            let parent = staging.ensure_dirs(ctx.mount, dir_path);
            let name = archive_output_name(file_name, entries.len(), ctx.mount);
            let node = FsNode::new_file(
                &parent,
                &name,
                entry.meta.file_size(),
                NodeKind::MultipartFile,
                entry.release_date,
                ctx.health_stamp(),
            );
            let layout = ctx.stored(Layout::Multipart(entry.meta.clone()))?;
            staging.stage(node, layout);
        }
        Ok(())
    }
}

impl Aggregate for MkvAggregator {
    fn stage(
        &self,
        ctx: &AggregatorCtx,
        results: &[ProcessorResult],
        staging: &mut IngestStaging,
    ) -> Result<()> {
        for result in results {
            let ProcessorResult::MultipartMkv(mkv) = result else { continue };
            if mkv.file_name.is_empty() {
                warn!("skipping multi-part file with undetermined name");
                continue;
            }
            let meta = MultipartMeta { parts: mkv.parts.clone(), decode: None };
            let node = FsNode::new_file(
                ctx.mount,
                &mkv.file_name,
                meta.file_size(),
                NodeKind::MultipartFile,
                mkv.release_date,
                ctx.health_stamp(),
            );
            let layout = ctx.stored(Layout::Multipart(meta))?;
            staging.stage(node, layout);
        }
        Ok(())
    }
}

/// Run every aggregator over a mixed batch of parser results.
pub fn aggregate_all(
    ctx: &AggregatorCtx,
    results: &[ProcessorResult],
) -> Result<IngestStaging> {
    let aggregators: [&dyn Aggregate; 4] =
        [&FlatAggregator, &RarAggregator, &SevenZipAggregator, &MkvAggregator];
    let mut staging = IngestStaging::default();
    for aggregator in aggregators {
        aggregator.stage(ctx, results, &mut staging)?;
    }
    Ok(staging)
}

// An archive that yields exactly one file with an obfuscated name gets the
// containing job's name, keeping the true extension.
fn archive_output_name(name: &str, sibling_count: usize, mount: &FsNode) -> String {
    if sibling_count == 1 && obfuscation::is_probably_obfuscated(name) {
        match Path::new(name).extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}.{}", mount.name, ext),
            None => mount.name.clone(),
        }
    } else {
        name.to_string()
    }
}

fn split_archive_path(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((dir, file)) => (dir, file),
        None => ("", path),
    }
}
