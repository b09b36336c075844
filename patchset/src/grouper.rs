//! Wires [`crate::detector::Detector`] into an artifact-store pass (§4.5):
//! groups validated `Revision` items into [`RevisionChangeset`]s, synthesizes
//! [`PostCommitChangeset`]s for default-branch files, and emits one
//! [`SymbolChangeset`] per classified symbol.

use std::{
    collections::{HashMap, HashSet},
    ffi::OsString,
    os::unix::ffi::OsStringExt,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use artifact_store::{ArtifactRef, Kind, PassDecl, Store, WriteDecl};
use item_graph::{graph, ingest, CvsFile, CvsItem, FileId, ItemId};
use symbol_strategy::{classify, Classification, SymbolClassification};

use crate::{
    changeset::{
        Changeset, ChangesetId, InitialChangeset, ItemRef, PostCommitChangeset, PostCommitOp,
        RevisionChangeset, SymbolChangeset,
    },
    detector::Detector,
};

pub const PASS_NAME: &str = "patchset";
pub const CHANGESETS_ARTIFACT: &str = "changesets";
pub const CHANGESETS_SCHEMA: u32 = 1;

pub fn changesets_ref() -> ArtifactRef {
    ArtifactRef::new(PASS_NAME, CHANGESETS_ARTIFACT)
}

pub fn decl() -> PassDecl {
    PassDecl::new(PASS_NAME)
        .reads(vec![
            ingest::files_ref(),
            graph::items_ref(),
            classify::classification_ref(),
        ])
        .writes(vec![WriteDecl::new(
            CHANGESETS_ARTIFACT,
            Kind::Permanent,
            CHANGESETS_SCHEMA,
        )])
}

/// The sliding-window gap: the design default is 5 minutes (§4.5).
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5 * 60);

struct IdAllocator(ChangesetId);

impl IdAllocator {
    fn next(&mut self) -> ChangesetId {
        let id = self.0;
        self.0 += 1;
        id
    }
}

pub fn run(store: &Store, window: Duration) -> artifact_store::Result<()> {
    let files: Vec<CvsFile> = store
        .reader::<CvsFile>(PASS_NAME, &ingest::files_ref())?
        .collect::<artifact_store::Result<_>>()?;
    let file_paths: HashMap<FileId, OsString> = files
        .iter()
        .map(|f| (f.id, OsString::from_vec(f.path.clone())))
        .collect();
    let default_branches: HashMap<FileId, String> = files
        .iter()
        .filter_map(|f| f.default_branch.as_ref().map(|b| (f.id, b.clone())))
        .collect();

    let items: Vec<CvsItem> = store
        .reader::<CvsItem>(PASS_NAME, &graph::items_ref())?
        .collect::<artifact_store::Result<_>>()?;

    let classifications: Vec<SymbolClassification> = store
        .reader::<SymbolClassification>(PASS_NAME, &classify::classification_ref())?
        .collect::<artifact_store::Result<_>>()?;

    let changesets = build(&file_paths, &default_branches, &items, &classifications, window);

    let mut writer = store.writer::<Changeset>(PASS_NAME, CHANGESETS_ARTIFACT)?;
    for changeset in &changesets {
        writer.append(changeset)?;
    }
    writer.finish()?;

    Ok(())
}

fn build(
    file_paths: &HashMap<FileId, OsString>,
    default_branches: &HashMap<FileId, String>,
    items: &[CvsItem],
    classifications: &[SymbolClassification],
    window: Duration,
) -> Vec<Changeset> {
    let mut alloc = IdAllocator(0);
    let mut out = Vec::new();
    out.push(Changeset::Initial(InitialChangeset {
        id: alloc.next(),
    }));

    out.extend(group_revisions(file_paths, items, window, &mut alloc));
    out.extend(synthesize_post_commits(default_branches, items, &out, &mut alloc));
    out.extend(fill_symbols(items, classifications, &mut alloc));

    out
}

fn group_revisions(
    file_paths: &HashMap<FileId, OsString>,
    items: &[CvsItem],
    window: Duration,
    alloc: &mut IdAllocator,
) -> Vec<Changeset> {
    let mut detector: Detector<ItemRef> = Detector::new(window);

    for item in items {
        if let CvsItem::Revision(r) = item {
            let path = match file_paths.get(&r.file_id) {
                Some(p) => p.clone(),
                None => continue,
            };
            detector.add_file_commit(
                path,
                Some((r.file_id, r.id)),
                r.branch_revnum.clone().into_bytes(),
                r.author.clone(),
                r.log_message.clone(),
                UNIX_EPOCH + Duration::from_secs(r.timestamp.max(0) as u64),
            );
        }
    }

    let mut out = Vec::new();
    for patchset in detector.into_patchset_iter() {
        let branch_revnum = String::from_utf8_lossy(&patchset.branch).into_owned();
        let refs: Vec<ItemRef> = patchset
            .file_content_iter()
            .filter_map(|(_, id)| id.copied())
            .collect();

        out.push(Changeset::Revision(RevisionChangeset {
            id: alloc.next(),
            author: patchset.author.clone(),
            message: patchset.message.clone(),
            branch_revnum,
            timestamp: patchset
                .time
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs() as i64,
            items: refs,
        }));
    }

    out
}

/// For each file with a vendor (default) branch that never also committed
/// directly to trunk, mirrors every commit made on the default branch onto
/// trunk immediately after the RevisionChangeset that contains it.
fn synthesize_post_commits(
    default_branches: &HashMap<FileId, String>,
    items: &[CvsItem],
    existing: &[Changeset],
    alloc: &mut IdAllocator,
) -> Vec<Changeset> {
    let mut trunk_committed: HashSet<FileId> = HashSet::new();
    let mut revision_by_ref: HashMap<ItemRef, &item_graph::Revision> = HashMap::new();
    for item in items {
        if let CvsItem::Revision(r) = item {
            revision_by_ref.insert((r.file_id, r.id), r);
            if r.branch_revnum == "trunk" {
                trunk_committed.insert(r.file_id);
            }
        }
    }

    let mut changeset_of: HashMap<ItemRef, ChangesetId> = HashMap::new();
    for changeset in existing {
        if let Changeset::Revision(rc) = changeset {
            for item_ref in &rc.items {
                changeset_of.insert(*item_ref, rc.id);
            }
        }
    }

    let mut out = Vec::new();
    for (file_id, default_branch) in default_branches {
        if trunk_committed.contains(file_id) {
            log::warn!(
                "file {}: default branch {} diverges from trunk commits already present; \
                 skipping default-branch post-commit synchronization",
                file_id,
                default_branch
            );
            continue;
        }

        let mut vendor_revisions: Vec<&item_graph::Revision> = revision_by_ref
            .values()
            .filter(|r| r.file_id == *file_id && &r.branch_revnum == default_branch)
            .copied()
            .collect();
        vendor_revisions.sort_by_key(|r| r.timestamp);

        for revision in vendor_revisions {
            let item_ref = (revision.file_id, revision.id);
            let motivating = match changeset_of.get(&item_ref) {
                Some(&id) => id,
                None => continue,
            };

            out.push(Changeset::PostCommit(PostCommitChangeset {
                id: alloc.next(),
                motivating,
                timestamp: revision.timestamp,
                items: vec![PostCommitOp {
                    file_id: *file_id,
                    source: item_ref,
                    deleted: revision.deleted,
                }],
            }));
        }
    }

    out
}

fn fill_symbols(
    items: &[CvsItem],
    classifications: &[SymbolClassification],
    alloc: &mut IdAllocator,
) -> Vec<Changeset> {
    let class_by_symbol: HashMap<&str, &SymbolClassification> = classifications
        .iter()
        .map(|c| (c.symbol.as_str(), c))
        .collect();

    let mut branch_sources: HashMap<String, Vec<ItemRef>> = HashMap::new();
    let mut tag_sources: HashMap<String, Vec<ItemRef>> = HashMap::new();
    let mut max_ts: HashMap<String, i64> = HashMap::new();
    let ts_by_item: HashMap<ItemRef, i64> = items
        .iter()
        .filter_map(|i| match i {
            CvsItem::Revision(r) => Some(((r.file_id, r.id), r.timestamp)),
            _ => None,
        })
        .collect();

    for item in items {
        match item {
            CvsItem::Branch(b) => {
                if let Some(symbol) = &b.symbol {
                    if class_by_symbol
                        .get(symbol.as_str())
                        .map(|c| c.classification == Classification::Excluded)
                        .unwrap_or(true)
                    {
                        continue;
                    }
                    let item_ref = (b.file_id, b.revision);
                    branch_sources.entry(symbol.clone()).or_default().push(item_ref);
                    let ts = ts_by_item.get(&item_ref).copied().unwrap_or(0);
                    let slot = max_ts.entry(symbol.clone()).or_insert(i64::MIN);
                    *slot = (*slot).max(ts);
                }
            }
            CvsItem::Tag(t) => {
                if class_by_symbol
                    .get(t.symbol.as_str())
                    .map(|c| c.classification == Classification::Excluded)
                    .unwrap_or(true)
                {
                    continue;
                }
                let item_ref = (t.file_id, t.revision);
                tag_sources.entry(t.symbol.clone()).or_default().push(item_ref);
                let ts = ts_by_item.get(&item_ref).copied().unwrap_or(0);
                let slot = max_ts.entry(t.symbol.clone()).or_insert(i64::MIN);
                *slot = (*slot).max(ts);
            }
            CvsItem::Revision(_) => {}
        }
    }

    let mut out = Vec::new();
    let mut names: Vec<&String> = branch_sources.keys().chain(tag_sources.keys()).collect();
    names.sort();
    names.dedup();

    for symbol in names {
        let classification = match class_by_symbol.get(symbol.as_str()) {
            Some(c) => c,
            None => continue,
        };

        let (kind, source_items) = match classification.classification {
            Classification::Branch => (
                Classification::Branch,
                branch_sources.remove(symbol).unwrap_or_default(),
            ),
            Classification::Tag => (
                Classification::Tag,
                tag_sources.remove(symbol).unwrap_or_default(),
            ),
            Classification::Excluded => continue,
        };

        out.push(Changeset::SymbolFill(SymbolChangeset {
            id: alloc.next(),
            symbol: symbol.clone(),
            svn_name: classification.svn_name.clone(),
            kind,
            timestamp: max_ts.get(symbol).copied().unwrap_or(0),
            source_items,
        }));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use item_graph::{Branch, Revision, Tag};

    fn file(id: FileId, path: &str, default_branch: Option<&str>) -> CvsFile {
        CvsFile {
            id,
            path: path.as_bytes().to_vec(),
            rcs_path: format!("{},v", path).into_bytes(),
            executable: false,
            binary: false,
            default_branch: default_branch.map(String::from),
        }
    }

    fn revision(
        file_id: FileId,
        id: ItemId,
        revnum: &str,
        author: &str,
        timestamp: i64,
        branch_revnum: &str,
    ) -> CvsItem {
        CvsItem::Revision(Revision {
            id,
            file_id,
            revnum: revnum.into(),
            author: author.into(),
            timestamp,
            log_message: "msg".into(),
            log_digest: 0,
            deleted: false,
            predecessor: None,
            branch_of_origin: None,
            branch_revnum: branch_revnum.into(),
        })
    }

    #[test]
    fn groups_same_author_message_into_one_revision_changeset() {
        let mut paths = HashMap::new();
        paths.insert(1, OsString::from("a"));
        paths.insert(2, OsString::from("b"));

        let items = vec![
            revision(1, 0, "1.1", "alice", 100, "trunk"),
            revision(2, 0, "1.1", "alice", 101, "trunk"),
        ];

        let out = group_revisions(&paths, &items, DEFAULT_WINDOW, &mut IdAllocator(0));
        assert_eq!(out.len(), 1);
        match &out[0] {
            Changeset::Revision(rc) => assert_eq!(rc.items.len(), 2),
            _ => panic!("expected RevisionChangeset"),
        }
    }

    #[test]
    fn synthesizes_post_commit_for_vendor_branch_without_trunk_divergence() {
        let mut default_branches = HashMap::new();
        default_branches.insert(1, "1.1.1".to_string());

        let items = vec![revision(1, 0, "1.1.1.1", "vendor", 100, "1.1.1")];
        let existing = vec![Changeset::Revision(RevisionChangeset {
            id: 1,
            author: "vendor".into(),
            message: "msg".into(),
            branch_revnum: "1.1.1".into(),
            timestamp: 100,
            items: vec![(1, 0)],
        })];

        let out = synthesize_post_commits(&default_branches, &items, &existing, &mut IdAllocator(2));
        assert_eq!(out.len(), 1);
        match &out[0] {
            Changeset::PostCommit(pc) => assert_eq!(pc.motivating, 1),
            _ => panic!("expected PostCommitChangeset"),
        }
    }

    #[test]
    fn skips_post_commit_when_trunk_already_diverged() {
        let mut default_branches = HashMap::new();
        default_branches.insert(1, "1.1.1".to_string());

        let items = vec![
            revision(1, 0, "1.1.1.1", "vendor", 100, "1.1.1"),
            revision(1, 1, "1.2", "alice", 150, "trunk"),
        ];

        let out = synthesize_post_commits(&default_branches, &items, &[], &mut IdAllocator(0));
        assert!(out.is_empty());
    }

    #[test]
    fn fills_one_symbol_changeset_per_branch() {
        let items = vec![
            CvsItem::Revision(revision_typed(1, 0, 100)),
            CvsItem::Branch(Branch {
                id: 1,
                file_id: 1,
                symbol: Some("B".into()),
                revision: 0,
                branch_revnum: "1.1.2".into(),
            }),
        ];
        let classifications = vec![SymbolClassification {
            symbol: "B".into(),
            svn_name: "B".into(),
            classification: Classification::Branch,
        }];

        let out = fill_symbols(&items, &classifications, &mut IdAllocator(0));
        assert_eq!(out.len(), 1);
        match &out[0] {
            Changeset::SymbolFill(sc) => {
                assert_eq!(sc.kind, Classification::Branch);
                assert_eq!(sc.source_items, vec![(1, 0)]);
            }
            _ => panic!("expected SymbolFill"),
        }
    }

    fn revision_typed(file_id: FileId, id: ItemId, timestamp: i64) -> Revision {
        Revision {
            id,
            file_id,
            revnum: "1.1".into(),
            author: "alice".into(),
            timestamp,
            log_message: "msg".into(),
            log_digest: 0,
            deleted: false,
            predecessor: None,
            branch_of_origin: None,
            branch_revnum: "trunk".into(),
        }
    }

    #[allow(dead_code)]
    fn unused_tag() -> Tag {
        Tag {
            id: 0,
            file_id: 0,
            symbol: String::new(),
            revision: 0,
        }
    }
}
