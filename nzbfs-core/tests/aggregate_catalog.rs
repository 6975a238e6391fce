use nzbfs_core::catalog::{FsNode, NodeKind};
use nzbfs_core::ingest::{
    aggregate_all, AggregatorCtx, ArchiveEntry, FlatResult, MkvResult, ProcessorResult,
    RarOutput, RarResult, SevenZipResult,
};
use nzbfs_core::layout::{ByteRange, FilePart, Layout, MultipartMeta, RarVolume};
use nzbfs_core::metastore::{MetadataStore, StoredPayload};

fn flat(name: &str, size: u64, segments: &[&str]) -> ProcessorResult {
    ProcessorResult::Flat(FlatResult {
        file_name: name.to_string(),
        file_size: size,
        release_date: None,
        segment_ids: segments.iter().map(|s| s.to_string()).collect(),
    })
}

fn multipart_meta(sizes: &[u64]) -> MultipartMeta {
    let mut parts = Vec::new();
    let mut offset = 0u64;
    for (i, &size) in sizes.iter().enumerate() {
        parts.push(FilePart {
            segment_ids: vec![format!("part-{i}")],
            segment_range: ByteRange::new(0, size),
            file_range: ByteRange::new(offset, size),
        });
        offset += size;
    }
    MultipartMeta { parts, decode: None }
}

fn seven_zip(entries: &[(&str, &[u64])]) -> ProcessorResult {
    ProcessorResult::SevenZip(SevenZipResult {
        files: entries
            .iter()
            .map(|(path, sizes)| ArchiveEntry {
                path_in_archive: path.to_string(),
                release_date: None,
                meta: multipart_meta(sizes),
            })
            .collect(),
    })
}

#[test]
fn flat_file_is_inlined_when_offload_disabled() {
    let td = tempfile::tempdir().unwrap();
    let metadata = MetadataStore::new(td.path().join("meta"), false);
    let mount = FsNode::root("My.Job");
    let ctx = AggregatorCtx { metadata: &metadata, mount: &mount, checked_full_health: false };

    let staging =
        aggregate_all(&ctx, &[flat("article.bin", 1234, &["s1", "s2", "s3"])]).unwrap();

    assert_eq!(staging.nodes.len(), 1);
    assert_eq!(staging.layouts.len(), 1);
    let node = &staging.nodes[0];
    assert_eq!(node.name, "article.bin");
    assert_eq!(node.size, 1234);
    assert_eq!(node.kind, NodeKind::FlatFile);
    assert_eq!(node.parent_id, mount.id);
    assert!(node.last_health_check.is_none());

    let row = &staging.layouts[0];
    assert_eq!(row.node_id, node.id);
    match &row.layout {
        StoredPayload::Inline(Layout::Flat { segment_ids }) => {
            assert_eq!(segment_ids, &["s1", "s2", "s3"]);
        }
        other => panic!("expected inline flat layout, got {other:?}"),
    }
}

#[test]
fn flat_file_is_offloaded_when_enabled() {
    let td = tempfile::tempdir().unwrap();
    let metadata = MetadataStore::new(td.path().join("meta"), true);
    let mount = FsNode::root("My.Job");
    let ctx = AggregatorCtx { metadata: &metadata, mount: &mount, checked_full_health: true };

    let staging = aggregate_all(&ctx, &[flat("article.bin", 1234, &["s1", "s2"])]).unwrap();

    assert!(staging.nodes[0].last_health_check.is_some());
    let row = &staging.layouts[0];
    assert!(row.layout.is_offloaded());
    let hash = row.layout.hash().unwrap();
    assert_eq!(hash.len(), 64);

    // The blob resolves back to the exact layout.
    let resolved = metadata.resolve(&row.layout, || Layout::Flat { segment_ids: vec![] });
    assert_eq!(resolved, Layout::Flat { segment_ids: vec!["s1".into(), "s2".into()] });
}

#[test]
fn unnamed_results_are_skipped() {
    let td = tempfile::tempdir().unwrap();
    let metadata = MetadataStore::new(td.path().join("meta"), false);
    let mount = FsNode::root("My.Job");
    let ctx = AggregatorCtx { metadata: &metadata, mount: &mount, checked_full_health: false };

    let staging = aggregate_all(
        &ctx,
        &[flat("", 10, &["s1"]), flat("kept.bin", 20, &["s2"])],
    )
    .unwrap();

    assert_eq!(staging.nodes.len(), 1);
    assert_eq!(staging.nodes[0].name, "kept.bin");
}

#[test]
fn rar_output_sums_volume_byte_counts() {
    let td = tempfile::tempdir().unwrap();
    let metadata = MetadataStore::new(td.path().join("meta"), false);
    let mount = FsNode::root("My.Job");
    let ctx = AggregatorCtx { metadata: &metadata, mount: &mount, checked_full_health: false };

    let volumes = vec![
        RarVolume { segment_ids: vec!["v1".into()], volume_size: 500, offset: 0, byte_count: 400 },
        RarVolume { segment_ids: vec!["v2".into()], volume_size: 500, offset: 400, byte_count: 300 },
    ];
    let results = [
        ProcessorResult::Rar(RarResult {
            files: vec![
                RarOutput { name: "Great.Movie.mkv".into(), release_date: None, volumes: volumes.clone() },
                RarOutput { name: "Extras.mkv".into(), release_date: None, volumes: volumes.clone() },
            ],
        }),
    ];

    let staging = aggregate_all(&ctx, &results).unwrap();
    assert_eq!(staging.nodes.len(), 2);
    assert_eq!(staging.nodes[0].kind, NodeKind::RarFile);
    assert_eq!(staging.nodes[0].size, 700);
    match &staging.layouts[0].layout {
        StoredPayload::Inline(Layout::Rar { volumes: v }) => assert_eq!(v, &volumes),
        other => panic!("expected inline rar layout, got {other:?}"),
    }
}

#[test]
fn single_obfuscated_archive_output_takes_job_name() {
    let td = tempfile::tempdir().unwrap();
    let metadata = MetadataStore::new(td.path().join("meta"), false);
    let mount = FsNode::root("Great.Movie.2024");
    let ctx = AggregatorCtx { metadata: &metadata, mount: &mount, checked_full_health: false };

    let staging =
        aggregate_all(&ctx, &[seven_zip(&[("a1b2c3d4e5f6a7b8c9d0.mkv", &[100])])]).unwrap();
    assert_eq!(staging.nodes.len(), 1);
    assert_eq!(staging.nodes[0].name, "Great.Movie.2024.mkv");
}

#[test]
fn multi_output_archive_is_never_renamed() {
    let td = tempfile::tempdir().unwrap();
    let metadata = MetadataStore::new(td.path().join("meta"), false);
    let mount = FsNode::root("Great.Movie.2024");
    let ctx = AggregatorCtx { metadata: &metadata, mount: &mount, checked_full_health: false };

    let staging = aggregate_all(
        &ctx,
        &[seven_zip(&[
            ("a1b2c3d4e5f6a7b8c9d0.mkv", &[100]),
            ("b1b2c3d4e5f6a7b8c9d0.nfo", &[10]),
        ])],
    )
    .unwrap();

    let names: Vec<&str> =
        staging.nodes.iter().map(|n| n.name.as_str()).collect();
    assert!(names.contains(&"a1b2c3d4e5f6a7b8c9d0.mkv"));
    assert!(names.contains(&"b1b2c3d4e5f6a7b8c9d0.nfo"));
}

#[test]
fn archive_entry_paths_stage_directories() {
    let td = tempfile::tempdir().unwrap();
    let metadata = MetadataStore::new(td.path().join("meta"), false);
    let mount = FsNode::root("My.Job");
    let ctx = AggregatorCtx { metadata: &metadata, mount: &mount, checked_full_health: false };

    let staging = aggregate_all(
        &ctx,
        &[seven_zip(&[
            ("inner/disc1/movie.mkv", &[100]),
            ("inner/readme.txt", &[10]),
        ])],
    )
    .unwrap();

    let dirs: Vec<&FsNode> =
        staging.nodes.iter().filter(|n| n.kind == NodeKind::Directory).collect();
    assert_eq!(dirs.len(), 2); // "inner" staged once, plus "disc1"

    let inner = dirs.iter().find(|d| d.name == "inner").unwrap();
    assert_eq!(inner.parent_id, mount.id);
    let disc1 = dirs.iter().find(|d| d.name == "disc1").unwrap();
    assert_eq!(disc1.parent_id, inner.id);

    let movie = staging.nodes.iter().find(|n| n.name == "movie.mkv").unwrap();
    assert_eq!(movie.parent_id, disc1.id);
    let readme = staging.nodes.iter().find(|n| n.name == "readme.txt").unwrap();
    assert_eq!(readme.parent_id, inner.id);
}

#[test]
fn mkv_size_is_part_sum() {
    let td = tempfile::tempdir().unwrap();
    let metadata = MetadataStore::new(td.path().join("meta"), false);
    let mount = FsNode::root("My.Job");
    let ctx = AggregatorCtx { metadata: &metadata, mount: &mount, checked_full_health: false };

    let meta = multipart_meta(&[64, 64, 32]);
    let staging = aggregate_all(
        &ctx,
        &[ProcessorResult::MultipartMkv(MkvResult {
            file_name: "show.mkv".into(),
            release_date: None,
            parts: meta.parts.clone(),
        })],
    )
    .unwrap();

    assert_eq!(staging.nodes[0].size, 160);
    assert_eq!(staging.nodes[0].kind, NodeKind::MultipartFile);
}

#[test]
fn decoded_size_drives_archive_entry_size() {
    let td = tempfile::tempdir().unwrap();
    let metadata = MetadataStore::new(td.path().join("meta"), false);
    let mount = FsNode::root("My.Job");
    let ctx = AggregatorCtx { metadata: &metadata, mount: &mount, checked_full_health: false };

    let mut meta = multipart_meta(&[100]);
    meta.decode = Some(nzbfs_core::layout::DecodeParams { decoded_size: Some(9999) });
    let results = [ProcessorResult::SevenZip(SevenZipResult {
        files: vec![
            ArchiveEntry { path_in_archive: "payload.bin".into(), release_date: None, meta },
            ArchiveEntry {
                path_in_archive: "other.bin".into(),
                release_date: None,
                meta: multipart_meta(&[50]),
            },
        ],
    })];

    let staging = aggregate_all(&ctx, &results).unwrap();
    let payload = staging.nodes.iter().find(|n| n.name == "payload.bin").unwrap();
    assert_eq!(payload.size, 9999);
}
