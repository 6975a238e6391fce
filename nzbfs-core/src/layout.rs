use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Opaque identifier of one addressable unit of remote content.
pub type SegmentId = String;

/// Half-open byte range `[start, start+count)`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub count: u64,
}

impl ByteRange {
    pub fn new(start: u64, count: u64) -> Self {
        Self { start, count }
    }

    pub fn end(&self) -> u64 {
        self.start + self.count
    }
}

/// One physical part of a multi-volume archive. The contiguous slice
/// `[0, volume_size)` of the volume supplies bytes `[offset, offset+byte_count)`
/// of the logical output file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RarVolume {
    pub segment_ids: Vec<SegmentId>,
    pub volume_size: u64,
    pub offset: u64,
    pub byte_count: u64,
}

/// One contiguous slice of a logical output file: a range within the
/// concatenation of `segment_ids` paired with a range within the file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FilePart {
    pub segment_ids: Vec<SegmentId>,
    pub segment_range: ByteRange,
    pub file_range: ByteRange,
}

/// Post-processing parameters for payloads whose nominal size is only known
/// after decoding.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodeParams {
    pub decoded_size: Option<u64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct MultipartMeta {
    pub parts: Vec<FilePart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decode: Option<DecodeParams>,
}

impl MultipartMeta {
    /// Nominal file size: the decoded-size override when present, else the sum
    /// of the part ranges.
    pub fn file_size(&self) -> u64 {
        self.decode
            .and_then(|d| d.decoded_size)
            .unwrap_or_else(|| self.parts.iter().map(|p| p.file_range.count).sum())
    }

    /// Check that file-local ranges are ordered, contiguous and cover
    /// `[0, file size)` exactly.
    pub fn validate(&self) -> Result<()> {
        let mut expected = 0u64;
        for (i, part) in self.parts.iter().enumerate() {
            if part.file_range.count == 0 {
                bail!("file part {} is empty", i);
            }
            if part.file_range.start != expected {
                bail!(
                    "file part {} starts at {} but {} expected",
                    i,
                    part.file_range.start,
                    expected
                );
            }
            expected = part.file_range.end();
        }
        Ok(())
    }
}

/// How a node's bytes map onto remote segments. The tag mirrors the node kind;
/// the read path dispatches on it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum Layout {
    Flat { segment_ids: Vec<SegmentId> },
    Rar { volumes: Vec<RarVolume> },
    Multipart(MultipartMeta),
}

/// View an archive volume list as the generic multi-part shape: per volume,
/// segment-local `[0, volume_size)` maps onto file-local
/// `[offset, offset+byte_count)`.
pub fn rar_to_multipart(volumes: &[RarVolume]) -> MultipartMeta {
    MultipartMeta {
        parts: volumes
            .iter()
            .map(|v| FilePart {
                segment_ids: v.segment_ids.clone(),
                segment_range: ByteRange::new(0, v.volume_size),
                file_range: ByteRange::new(v.offset, v.byte_count),
            })
            .collect(),
        decode: None,
    }
}
