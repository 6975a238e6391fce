use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// A layout payload as the catalog row carries it: either inline, or replaced
/// by the hash of its blob in the metadata store. The two-variant shape is the
/// invariant: a row can never hold both representations, or neither.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum StoredPayload<T> {
    Inline(T),
    Offloaded { hash: String },
}

impl<T> StoredPayload<T> {
    pub fn hash(&self) -> Option<&str> {
        match self {
            StoredPayload::Offloaded { hash } => Some(hash),
            StoredPayload::Inline(_) => None,
        }
    }

    pub fn is_offloaded(&self) -> bool {
        matches!(self, StoredPayload::Offloaded { .. })
    }
}

/// Content-addressable store for compressed layout payloads.
///
/// Blobs are zstd-compressed bincode, named by the lowercase hex SHA-256 of
/// the compressed bytes and sharded two levels deep by hash prefix. Identical
/// payloads from any writer dedup to one file; concurrent writers racing on
/// the same hash are resolved by the filesystem's exclusive link, not by
/// in-process locking, so the store stays correct when shared across
/// processes.
pub struct MetadataStore {
    dir: PathBuf,
    enabled: bool,
    root: OnceLock<PathBuf>,
}

impl MetadataStore {
    pub fn new(dir: PathBuf, enabled: bool) -> Self {
        Self { dir, enabled, root: OnceLock::new() }
    }

    /// Whether aggregators should offload layouts here instead of writing
    /// them inline.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Serialize, compress and store `payload`, returning its storage hash.
    /// Storing content that already exists is a no-op returning the same hash.
    pub fn put<T: Serialize + ?Sized>(&self, payload: &T) -> Result<String> {
        let raw = bincode::serialize(payload).context("serialize metadata payload")?;
        let compressed =
            zstd::stream::encode_all(&raw[..], 0).context("zstd compress metadata payload")?;
        let hash = hex::encode(Sha256::digest(&compressed));
        let path = self.payload_path(&hash)?;
        if path.exists() {
            return Ok(hash);
        }

        let shard = path.parent().context("derive shard directory")?;
        fs::create_dir_all(shard)
            .with_context(|| format!("create shard directory {}", shard.display()))?;
        let tmp = shard.join(format!("{}.{}.tmp", hash, Uuid::new_v4().simple()));

        let published = (|| -> Result<()> {
            let mut f = File::create(&tmp)
                .with_context(|| format!("create temp blob {}", tmp.display()))?;
            f.write_all(&compressed)?;
            f.sync_all()?;
            match fs::hard_link(&tmp, &path) {
                Ok(()) => Ok(()),
                // A concurrent writer stored this hash first; content is
                // byte-identical by construction.
                Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
                Err(e) => Err(e).with_context(|| format!("publish blob {}", hash)),
            }
        })();

        if let Err(e) = fs::remove_file(&tmp) {
            if e.kind() != ErrorKind::NotFound {
                debug!(%hash, error = %e, "failed to remove temp blob");
            }
        }
        published?;
        Ok(hash)
    }

    /// Resolve a stored payload: offloaded hashes are loaded from disk, with
    /// any load failure degrading to `fallback` rather than propagating.
    pub fn resolve<T, F>(&self, stored: &StoredPayload<T>, fallback: F) -> T
    where
        T: DeserializeOwned + Clone,
        F: FnOnce() -> T,
    {
        match stored {
            StoredPayload::Inline(value) => value.clone(),
            StoredPayload::Offloaded { hash } => match self.load(hash) {
                Ok(Some(value)) => value,
                Ok(None) => {
                    debug!(%hash, "metadata blob absent, using fallback");
                    fallback()
                }
                Err(e) => {
                    let error = format!("{e:#}");
                    warn!(%hash, error = %error, "failed to load metadata blob");
                    fallback()
                }
            },
        }
    }

    /// Best-effort delete. Returns whether a blob file was actually removed;
    /// filesystem errors are swallowed.
    pub fn try_delete(&self, hash: &str) -> bool {
        if hash.is_empty() {
            return false;
        }
        let path = match self.payload_path(hash) {
            Ok(p) => p,
            Err(_) => return false,
        };
        if !path.exists() {
            return false;
        }
        match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) => {
                debug!(%hash, error = %e, "failed to delete metadata blob");
                false
            }
        }
    }

    fn load<T: DeserializeOwned>(&self, hash: &str) -> Result<Option<T>> {
        let path = self.payload_path(hash)?;
        if !path.exists() {
            return Ok(None);
        }
        let compressed =
            fs::read(&path).with_context(|| format!("read blob {}", path.display()))?;
        let raw = zstd::stream::decode_all(&compressed[..])
            .context("zstd decompress metadata payload")?;
        let value = bincode::deserialize(&raw).context("bincode metadata payload decode")?;
        Ok(Some(value))
    }

    fn payload_path(&self, hash: &str) -> Result<PathBuf> {
        if hash.len() < 6 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            bail!("bad storage hash {:?}", hash);
        }
        let hash = hash.to_ascii_lowercase();
        let root = self.root()?;
        Ok(root.join(&hash[0..2]).join(&hash[2..4]).join(&hash))
    }

    // Root is created on first use and cached for the life of the store;
    // create_dir_all is idempotent so a concurrent first access is harmless.
    fn root(&self) -> Result<&Path> {
        if let Some(root) = self.root.get() {
            return Ok(root.as_path());
        }
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create metadata root {}", self.dir.display()))?;
        Ok(self.root.get_or_init(|| self.dir.clone()).as_path())
    }
}
