use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Write};
use std::path::PathBuf;
use tracing::warn;
use uuid::Uuid;

const DEFAULT_COMPRESSION: &str = "gzip";

/// External-storage reference recorded on a queue document row once its text
/// has been exported. `length` and `sha256` describe the uncompressed content.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ExternalDoc {
    pub relative_path: String,
    pub compression: String,
    pub length: u64,
    pub sha256: String,
}

/// A queue record's NZB document. The external reference, when present, is
/// the authoritative representation; until then the inline text is.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NzbDocument {
    pub id: Uuid,
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub contents: String,
    #[serde(default)]
    pub external: Option<ExternalDoc>,
}

impl NzbDocument {
    pub fn is_inline(&self) -> bool {
        self.external.is_none() && !self.contents.is_empty()
    }
}

/// Filesystem store for raw NZB documents: one gzip file per owning record,
/// named deterministically from the record id so re-export overwrites cleanly.
pub struct NzbStore {
    dir: PathBuf,
}

impl NzbStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Compress and persist `text`, returning the external reference to record
    /// on the owning row. On failure the temp file is removed and the error
    /// propagates.
    pub fn write(&self, owner: Uuid, text: &str) -> Result<ExternalDoc> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create NZB storage root {}", self.dir.display()))?;
        let file_name = format!("{}.nzb.gz", owner.simple());
        let full = self.dir.join(&file_name);
        let tmp = self.dir.join(format!("{}.tmp", file_name));

        let bytes = text.as_bytes();
        let sha256 = hex::encode(Sha256::digest(bytes));

        let written = (|| -> Result<()> {
            let f = File::create(&tmp)
                .with_context(|| format!("create temp document {}", tmp.display()))?;
            let mut gz = GzEncoder::new(f, Compression::best());
            gz.write_all(bytes)?;
            gz.finish()?.sync_all()?;
            if full.exists() {
                fs::remove_file(&full)
                    .with_context(|| format!("replace document {}", full.display()))?;
            }
            fs::rename(&tmp, &full)
                .with_context(|| format!("move document into place {}", full.display()))?;
            Ok(())
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        Ok(ExternalDoc {
            relative_path: file_name,
            compression: DEFAULT_COMPRESSION.to_string(),
            length: bytes.len() as u64,
            sha256,
        })
    }

    /// The document text: inline contents verbatim, or the decompressed
    /// external file. A row claiming external storage whose file is absent is
    /// a hard failure, not a degradable cache miss.
    pub fn read_to_string(&self, doc: &NzbDocument) -> Result<String> {
        let Some(external) = &doc.external else {
            return Ok(doc.contents.clone());
        };
        let full = self.dir.join(&external.relative_path);
        let file = match File::open(&full) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(id = %doc.id, path = %full.display(), "NZB document missing on disk");
                return Err(e).with_context(|| {
                    format!("NZB document for {} missing on disk: {}", doc.id, full.display())
                });
            }
            Err(e) => {
                return Err(e).with_context(|| format!("open document {}", full.display()))
            }
        };
        let mut text = String::new();
        GzDecoder::new(file)
            .read_to_string(&mut text)
            .with_context(|| format!("decompress document {}", full.display()))?;
        Ok(text)
    }

    /// Re-readable byte stream over the document text.
    pub fn open_stream(&self, doc: &NzbDocument) -> Result<Cursor<Vec<u8>>> {
        Ok(Cursor::new(self.read_to_string(doc)?.into_bytes()))
    }

    /// Best-effort removal of the external file, if any.
    pub fn delete(&self, doc: &NzbDocument) {
        let Some(external) = &doc.external else {
            return;
        };
        let full = self.dir.join(&external.relative_path);
        if let Err(e) = fs::remove_file(&full) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(id = %doc.id, error = %e, "failed to delete NZB document");
            }
        }
    }
}
