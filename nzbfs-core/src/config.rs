use std::path::PathBuf;

use crate::metastore::MetadataStore;
use crate::nzbstore::NzbStore;

/// Storage locations and offload policy supplied by the host configuration.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Root of the content-addressable metadata blob store.
    pub metadata_dir: PathBuf,
    /// Root of the external NZB document store.
    pub nzb_dir: PathBuf,
    /// Whether aggregators offload layout payloads instead of inlining them.
    pub offload_metadata: bool,
}

impl StorageConfig {
    pub fn new(metadata_dir: PathBuf, nzb_dir: PathBuf, offload_metadata: bool) -> Self {
        Self { metadata_dir, nzb_dir, offload_metadata }
    }

    pub fn metadata_store(&self) -> MetadataStore {
        MetadataStore::new(self.metadata_dir.clone(), self.offload_metadata)
    }

    pub fn nzb_store(&self) -> NzbStore {
        NzbStore::new(self.nzb_dir.clone())
    }
}
