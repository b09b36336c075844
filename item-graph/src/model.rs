//! The CVSFile / CVSItem data model shared by ingest, the item graph pass,
//! and every downstream pass (symbol classification, commit grouping,
//! sequencing, output).

use serde::{Deserialize, Serialize};

pub const FILES_SCHEMA: u32 = 2;
pub const ITEMS_SCHEMA: u32 = 1;
pub const SYMBOL_USAGE_SCHEMA: u32 = 1;
pub const SYMBOL_STATS_SCHEMA: u32 = 1;

/// Stable identifier for a CVSFile, assigned in ingest order.
pub type FileId = u32;

/// Stable identifier for a CVSItem, assigned in traversal order during
/// ingest and never reused.
pub type ItemId = u64;

/// One `*,v` file discovered under the repository root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CvsFile {
    pub id: FileId,
    /// Project-relative path with the `,v` suffix and any `Attic/` segment
    /// already stripped, as raw bytes (CVS places no encoding requirement on
    /// paths). This is the path the file lands at in the output repository.
    pub path: Vec<u8>,
    /// Project-relative path to the `*,v` file exactly as found on disk
    /// (`,v` suffix and `Attic/` segment intact, if present), so the
    /// revision reader (§4.10) can locate it regardless of where `path`
    /// places the file's SVN-side history.
    pub rcs_path: Vec<u8>,
    pub executable: bool,
    /// `true` when the RCS `expand` admin field is `b` (binary, `-kb`).
    pub binary: bool,
    /// Dotted-decimal branch number of the file's vendor (default) branch,
    /// if it has one.
    pub default_branch: Option<String>,
}

/// A single node in a file's revision graph: either a commit, a named
/// branch's creation, or a tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CvsItem {
    Revision(Revision),
    Branch(Branch),
    Tag(Tag),
}

impl CvsItem {
    pub fn id(&self) -> ItemId {
        match self {
            CvsItem::Revision(r) => r.id,
            CvsItem::Branch(b) => b.id,
            CvsItem::Tag(t) => t.id,
        }
    }

    pub fn file_id(&self) -> FileId {
        match self {
            CvsItem::Revision(r) => r.file_id,
            CvsItem::Branch(b) => b.file_id,
            CvsItem::Tag(t) => t.file_id,
        }
    }
}

/// One commit of one file, at one RCS revision number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    pub id: ItemId,
    pub file_id: FileId,
    /// Dotted-decimal RCS revision number, e.g. `1.2` or `1.2.4.1`.
    pub revnum: String,
    pub author: String,
    /// Seconds since the Unix epoch, as recorded by RCS.
    pub timestamp: i64,
    pub log_message: String,
    /// Hash of `log_message`, exposed separately so the commit grouper can
    /// key on it without re-hashing a potentially large message.
    pub log_digest: u64,
    pub deleted: bool,
    /// The preceding revision on the same line of descent, if any. `None`
    /// for a file's very first revision and for the first revision of any
    /// branch.
    pub predecessor: Option<ItemId>,
    /// The `Branch` item this revision lives on. `None` for trunk.
    pub branch_of_origin: Option<ItemId>,
    /// Dotted-decimal branch number this revision lives on; `"trunk"` for
    /// the main line.
    pub branch_revnum: String,
}

/// The creation of a named branch from a specific revision of a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: ItemId,
    pub file_id: FileId,
    /// Cleaned (but not yet classified or renamed) CVS symbol name. `None`
    /// for a branch number that has commits but was never tagged.
    pub symbol: Option<String>,
    /// The revision this branch was forked from.
    pub revision: ItemId,
    pub branch_revnum: String,
}

/// A CVS tag: a symbolic name attached to one revision of one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: ItemId,
    pub file_id: FileId,
    pub symbol: String,
    pub revision: ItemId,
}

/// One file's use of one symbol, as observed during ingest. Consumed by the
/// symbol classification pass to build global [`SymbolStats`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolUsage {
    pub file_id: FileId,
    pub symbol: String,
    pub as_branch: bool,
    pub as_tag: bool,
    /// Whether at least one commit exists on the branch this symbol names
    /// (always `false` when `as_branch` is `false`).
    pub has_commits: bool,
}

/// Aggregated, repository-wide statistics for one CVS symbol, used by the
/// symbol classifier to pick a rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolStats {
    pub symbol: String,
    pub branch_file_count: u32,
    pub tag_file_count: u32,
    pub branch_commit_file_count: u32,
}

pub fn hash_log_message(message: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    message.hash(&mut hasher);
    hasher.finish()
}
