//! The item graph validation pass (§4.3): reads the raw `items` artifact
//! written by [`crate::ingest`], and per file:
//!
//! - forces timestamps to be monotonically non-decreasing along each line of
//!   descent (a revision observed earlier than its predecessor is bumped to
//!   `predecessor + 1s`, deterministically and logged at `trace`);
//! - rejects cycles in the branch-of-origin relation;
//! - emits one [`SymbolUsage`] record per symbol per file, consumed by
//!   `symbol-strategy` to build the repository-wide classification table.
//!
//! Items for a single file arrive contiguously in the input artifact (ingest
//! writes them that way), so this pass only ever holds one file's items in
//! memory at a time, preserving the O(items-in-one-file) working set the
//! design calls for.

use std::collections::{HashMap, HashSet};

use artifact_store::{ArtifactRef, Kind, PassDecl, RecordWriter, Store, WriteDecl};

use crate::{
    error::{Error, Result},
    ingest,
    model::{CvsItem, FileId, ItemId, SymbolUsage, ITEMS_SCHEMA, SYMBOL_USAGE_SCHEMA},
};

pub const PASS_NAME: &str = "graph";
pub const ITEMS_ARTIFACT: &str = "items";
pub const SYMBOL_USAGE_ARTIFACT: &str = "symbol-usage";

pub fn items_ref() -> ArtifactRef {
    ArtifactRef::new(PASS_NAME, ITEMS_ARTIFACT)
}

pub fn symbol_usage_ref() -> ArtifactRef {
    ArtifactRef::new(PASS_NAME, SYMBOL_USAGE_ARTIFACT)
}

pub fn decl() -> PassDecl {
    PassDecl::new(PASS_NAME)
        .reads(vec![ingest::items_ref()])
        .writes(vec![
            WriteDecl::new(ITEMS_ARTIFACT, Kind::Permanent, ITEMS_SCHEMA),
            WriteDecl::new(SYMBOL_USAGE_ARTIFACT, Kind::Permanent, SYMBOL_USAGE_SCHEMA),
        ])
}

pub fn run(store: &Store) -> Result<()> {
    let reader = store.reader::<CvsItem>(PASS_NAME, &ingest::items_ref())?;
    let mut items_writer = store.writer::<CvsItem>(PASS_NAME, ITEMS_ARTIFACT)?;
    let mut usage_writer = store.writer::<SymbolUsage>(PASS_NAME, SYMBOL_USAGE_ARTIFACT)?;

    let mut current_file: Option<FileId> = None;
    let mut buffer: Vec<CvsItem> = Vec::new();

    for item in reader {
        let item = item?;
        let file_id = item.file_id();

        if current_file != Some(file_id) {
            if let Some(fid) = current_file {
                flush_file(fid, std::mem::take(&mut buffer), &mut items_writer, &mut usage_writer)?;
            }
            current_file = Some(file_id);
        }
        buffer.push(item);
    }

    if let Some(fid) = current_file {
        flush_file(fid, buffer, &mut items_writer, &mut usage_writer)?;
    }

    items_writer.finish()?;
    usage_writer.finish()?;
    Ok(())
}

fn flush_file(
    file_id: FileId,
    mut items: Vec<CvsItem>,
    items_writer: &mut RecordWriter<CvsItem>,
    usage_writer: &mut RecordWriter<SymbolUsage>,
) -> Result<()> {
    check_branch_origin_acyclic(file_id, &items)?;
    normalize_timestamps(&mut items);

    for usage in collect_symbol_usage(&items) {
        usage_writer.append(&usage)?;
    }

    for item in &items {
        items_writer.append(item)?;
    }

    Ok(())
}

/// Bumps any revision whose raw timestamp is less than its predecessor's
/// (corrected) timestamp to `predecessor + 1` second, memoizing the
/// corrected value per item so a long chain is only walked once.
fn normalize_timestamps(items: &mut [CvsItem]) {
    let mut index_of: HashMap<ItemId, usize> = HashMap::new();
    for (i, item) in items.iter().enumerate() {
        index_of.insert(item.id(), i);
    }

    let mut corrected: HashMap<ItemId, i64> = HashMap::new();
    let ids: Vec<ItemId> = items
        .iter()
        .filter_map(|item| match item {
            CvsItem::Revision(r) => Some(r.id),
            _ => None,
        })
        .collect();

    for id in ids {
        resolve_timestamp(id, items, &index_of, &mut corrected);
    }

    for item in items.iter_mut() {
        if let CvsItem::Revision(r) = item {
            if let Some(&ts) = corrected.get(&r.id) {
                if ts != r.timestamp {
                    log::trace!(
                        "file {}: revision {} timestamp bumped from {} to {}",
                        r.file_id,
                        r.revnum,
                        r.timestamp,
                        ts
                    );
                    r.timestamp = ts;
                }
            }
        }
    }
}

fn resolve_timestamp(
    id: ItemId,
    items: &[CvsItem],
    index_of: &HashMap<ItemId, usize>,
    corrected: &mut HashMap<ItemId, i64>,
) -> i64 {
    if let Some(&ts) = corrected.get(&id) {
        return ts;
    }

    let idx = match index_of.get(&id) {
        Some(&idx) => idx,
        None => return 0,
    };
    let revision = match &items[idx] {
        CvsItem::Revision(r) => r,
        _ => return 0,
    };

    let floor = match revision.predecessor {
        Some(pred) => resolve_timestamp(pred, items, index_of, corrected) + 1,
        None => i64::MIN,
    };

    let ts = revision.timestamp.max(floor);
    corrected.insert(id, ts);
    ts
}

/// Walks each Branch item's fork point back toward trunk, failing if the
/// chain of branch-of-origin references ever revisits a Branch id.
fn check_branch_origin_acyclic(file_id: FileId, items: &[CvsItem]) -> Result<()> {
    let mut revision_by_id: HashMap<ItemId, &crate::model::Revision> = HashMap::new();
    let mut branch_by_id: HashMap<ItemId, &crate::model::Branch> = HashMap::new();
    for item in items {
        match item {
            CvsItem::Revision(r) => {
                revision_by_id.insert(r.id, r);
            }
            CvsItem::Branch(b) => {
                branch_by_id.insert(b.id, b);
            }
            CvsItem::Tag(_) => {}
        }
    }

    for (&branch_id, branch) in &branch_by_id {
        let mut visited = HashSet::new();
        visited.insert(branch_id);

        let mut cursor = revision_by_id.get(&branch.revision);
        loop {
            let revision = match cursor {
                Some(r) => r,
                None => break,
            };
            let origin = match revision.branch_of_origin {
                Some(origin) => origin,
                None => break,
            };
            if !visited.insert(origin) {
                return Err(Error::CyclicBranchOrigin {
                    file_id,
                    item: origin,
                });
            }
            cursor = branch_by_id
                .get(&origin)
                .and_then(|b| revision_by_id.get(&b.revision));
        }
    }

    Ok(())
}

fn collect_symbol_usage(items: &[CvsItem]) -> Vec<SymbolUsage> {
    let mut has_commits: HashSet<String> = HashSet::new();
    for item in items {
        if let CvsItem::Revision(r) = item {
            if r.branch_revnum != "trunk" {
                has_commits.insert(r.branch_revnum.clone());
            }
        }
    }

    let mut usage: HashMap<String, SymbolUsage> = HashMap::new();
    for item in items {
        match item {
            CvsItem::Branch(b) => {
                if let Some(name) = &b.symbol {
                    let entry = usage.entry(name.clone()).or_insert_with(|| SymbolUsage {
                        file_id: b.file_id,
                        symbol: name.clone(),
                        as_branch: false,
                        as_tag: false,
                        has_commits: false,
                    });
                    entry.as_branch = true;
                    entry.has_commits = has_commits.contains(&b.branch_revnum);
                }
            }
            CvsItem::Tag(t) => {
                let entry = usage.entry(t.symbol.clone()).or_insert_with(|| SymbolUsage {
                    file_id: t.file_id,
                    symbol: t.symbol.clone(),
                    as_branch: false,
                    as_tag: false,
                    has_commits: false,
                });
                entry.as_tag = true;
            }
            CvsItem::Revision(_) => {}
        }
    }

    let mut usage: Vec<SymbolUsage> = usage.into_values().collect();
    usage.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    usage
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Branch, Revision, Tag};

    fn revision(id: ItemId, predecessor: Option<ItemId>, timestamp: i64) -> CvsItem {
        CvsItem::Revision(Revision {
            id,
            file_id: 1,
            revnum: format!("1.{}", id + 1),
            author: "alice".into(),
            timestamp,
            log_message: "msg".into(),
            log_digest: 0,
            deleted: false,
            predecessor,
            branch_of_origin: None,
            branch_revnum: "trunk".into(),
        })
    }

    #[test]
    fn bumps_out_of_order_timestamps_forward() {
        let mut items = vec![revision(0, None, 100), revision(1, Some(0), 50)];
        normalize_timestamps(&mut items);

        let ts = |i: usize| match &items[i] {
            CvsItem::Revision(r) => r.timestamp,
            _ => unreachable!(),
        };
        assert_eq!(ts(0), 100);
        assert_eq!(ts(1), 101);
    }

    #[test]
    fn leaves_monotonic_timestamps_untouched() {
        let mut items = vec![revision(0, None, 100), revision(1, Some(0), 200)];
        normalize_timestamps(&mut items);

        let ts = |i: usize| match &items[i] {
            CvsItem::Revision(r) => r.timestamp,
            _ => unreachable!(),
        };
        assert_eq!(ts(0), 100);
        assert_eq!(ts(1), 200);
    }

    #[test]
    fn collects_branch_and_tag_usage() {
        let items = vec![
            revision(0, None, 100),
            CvsItem::Branch(Branch {
                id: 1,
                file_id: 1,
                symbol: Some("B".into()),
                revision: 0,
                branch_revnum: "1.1.2".into(),
            }),
            CvsItem::Tag(Tag {
                id: 2,
                file_id: 1,
                symbol: "REL_1".into(),
                revision: 0,
            }),
        ];

        let usage = collect_symbol_usage(&items);
        assert_eq!(usage.len(), 2);
        assert!(usage.iter().any(|u| u.symbol == "B" && u.as_branch && !u.as_tag));
        assert!(usage.iter().any(|u| u.symbol == "REL_1" && u.as_tag && !u.as_branch));
    }

    #[test]
    fn detects_branch_of_origin_cycles() {
        let mut base = revision(0, None, 100);
        if let CvsItem::Revision(r) = &mut base {
            r.branch_of_origin = Some(10);
        }
        let items = vec![
            base,
            CvsItem::Branch(Branch {
                id: 10,
                file_id: 1,
                symbol: Some("B".into()),
                revision: 0,
                branch_revnum: "1.1.2".into(),
            }),
        ];

        let err = check_branch_origin_acyclic(1, &items).unwrap_err();
        assert!(matches!(err, Error::CyclicBranchOrigin { .. }));
    }
}
