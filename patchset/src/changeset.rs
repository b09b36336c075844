//! The `Changeset` sum type (§3, design note in §9): every unit of work the
//! sequencer orders and the output pass emits as one Subversion revision.
//!
//! Changesets carry item *ids*, never the items themselves — callers resolve
//! content by looking the id back up in the `graph` pass's `items` artifact
//! (see `revision-reader` for the byte-content side of that).

use item_graph::{FileId, ItemId};
use serde::{Deserialize, Serialize};
use symbol_strategy::Classification;

pub type ChangesetId = u64;

/// A reference to one CVSItem: the `(file, item)` pair needed to look it
/// back up, since `ItemId` is only unique within a single file's stream.
pub type ItemRef = (FileId, ItemId);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Changeset {
    /// Creates `trunk/`, `branches/`, and `tags/`. Always revnum 1.
    Initial(InitialChangeset),
    Revision(RevisionChangeset),
    PostCommit(PostCommitChangeset),
    SymbolFill(SymbolChangeset),
}

impl Changeset {
    pub fn id(&self) -> ChangesetId {
        match self {
            Changeset::Initial(c) => c.id,
            Changeset::Revision(c) => c.id,
            Changeset::PostCommit(c) => c.id,
            Changeset::SymbolFill(c) => c.id,
        }
    }

    /// The earliest timestamp of any item the changeset contains, used by the
    /// sequencer to break ties in the topological sort. The initial changeset
    /// sorts before everything else.
    pub fn min_timestamp(&self) -> i64 {
        match self {
            Changeset::Initial(_) => i64::MIN,
            Changeset::Revision(c) => c.timestamp,
            Changeset::PostCommit(c) => c.timestamp,
            Changeset::SymbolFill(c) => c.timestamp,
        }
    }

    pub fn item_refs(&self) -> Vec<ItemRef> {
        match self {
            Changeset::Initial(_) => Vec::new(),
            Changeset::Revision(c) => c.items.clone(),
            Changeset::PostCommit(c) => c.items.iter().map(|op| op.source).collect(),
            Changeset::SymbolFill(c) => c.source_items.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InitialChangeset {
    pub id: ChangesetId,
}

/// One cross-file commit: all the items share `author`/`message` and fall
/// within the grouper's sliding time window, on the same branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionChangeset {
    pub id: ChangesetId,
    pub author: String,
    pub message: String,
    /// `"trunk"` or an RCS branch number; all items share it.
    pub branch_revnum: String,
    pub timestamp: i64,
    pub items: Vec<ItemRef>,
}

/// One file's default-branch head synchronized onto trunk (§4.5, §9's
/// resolved open question).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostCommitOp {
    pub file_id: FileId,
    /// The vendor-branch revision being mirrored onto trunk.
    pub source: ItemRef,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostCommitChangeset {
    pub id: ChangesetId,
    /// The RevisionChangeset this PostCommit immediately follows.
    pub motivating: ChangesetId,
    pub timestamp: i64,
    pub items: Vec<PostCommitOp>,
}

/// Creates or updates `branches/<name>` or `tags/<name>` by copying in the
/// consolidated set of source revisions for every file the symbol touches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolChangeset {
    pub id: ChangesetId,
    pub symbol: String,
    pub svn_name: String,
    pub kind: Classification,
    pub timestamp: i64,
    pub source_items: Vec<ItemRef>,
}
