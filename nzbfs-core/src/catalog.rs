use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::layout::Layout;
use crate::metastore::StoredPayload;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    FlatFile,
    RarFile,
    MultipartFile,
}

/// One entry of the virtual filesystem tree. Size and kind are fixed at
/// creation; nodes are only ever created under an already-existing parent.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FsNode {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub name: String,
    pub size: u64,
    pub kind: NodeKind,
    pub created_at: DateTime<Utc>,
    pub release_date: Option<DateTime<Utc>>,
    pub last_health_check: Option<DateTime<Utc>>,
}

impl FsNode {
    /// A mount directory with no parent, the anchor of an ingestion run.
    pub fn root(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: Uuid::nil(),
            name: name.to_string(),
            size: 0,
            kind: NodeKind::Directory,
            created_at: Utc::now(),
            release_date: None,
            last_health_check: None,
        }
    }

    pub fn new_directory(parent: &FsNode, name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: parent.id,
            name: name.to_string(),
            size: 0,
            kind: NodeKind::Directory,
            created_at: Utc::now(),
            release_date: None,
            last_health_check: None,
        }
    }

    pub fn new_file(
        parent: &FsNode,
        name: &str,
        size: u64,
        kind: NodeKind,
        release_date: Option<DateTime<Utc>>,
        last_health_check: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: parent.id,
            name: name.to_string(),
            size,
            kind,
            created_at: Utc::now(),
            release_date,
            last_health_check,
        }
    }
}

/// The catalog record describing how a node's bytes map onto segments,
/// 1:1 with its (non-directory) tree node.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LayoutRow {
    pub node_id: Uuid,
    pub layout: StoredPayload<Layout>,
}

/// Rows staged by the aggregators. Committing the batch to the persistence
/// layer is the caller's responsibility, keeping a whole ingestion atomic.
#[derive(Debug, Default)]
pub struct IngestStaging {
    pub nodes: Vec<FsNode>,
    pub layouts: Vec<LayoutRow>,
}

impl IngestStaging {
    /// Stage a file node together with its layout row.
    pub fn stage(&mut self, node: FsNode, layout: StoredPayload<Layout>) {
        self.layouts.push(LayoutRow { node_id: node.id, layout });
        self.nodes.push(node);
    }

    pub fn stage_node(&mut self, node: FsNode) {
        self.nodes.push(node);
    }

    /// Walk `dir_path` ('/'-separated) below `mount`, staging any directory
    /// nodes not seen before, and return the innermost directory.
    pub fn ensure_dirs(&mut self, mount: &FsNode, dir_path: &str) -> FsNode {
        let mut parent = mount.clone();
        for component in dir_path.split('/').filter(|c| !c.is_empty() && *c != ".") {
            let existing = self.nodes.iter().position(|n| {
                n.parent_id == parent.id && n.kind == NodeKind::Directory && n.name == component
            });
            parent = match existing {
                Some(i) => self.nodes[i].clone(),
                None => {
                    let dir = FsNode::new_directory(&parent, component);
                    self.nodes.push(dir.clone());
                    dir
                }
            };
        }
        parent
    }
}
