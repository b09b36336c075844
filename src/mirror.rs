//! The in-memory Subversion repository mirror (§4.8): a copy-on-write
//! directory tree that the output pass drives one commit at a time, forwarding
//! every mutation to a registered [`OutputDelegate`]. Generalizes the
//! teacher's `Output`/`Writer` channel-and-worker pattern from `git-fast-import`
//! and `internal/process`, simplified to a direct synchronous call per
//! mutation since the pass manager is single-threaded (§5).

use std::{collections::BTreeMap, collections::HashMap, rc::Rc};

use patchset::{ItemRef, SymbolChangeset};
use sequencer::FillOp;
use svn_dump::{Node, NodeAction, NodeKind, OutputDelegate, Properties, RevProps};

use crate::error::{Error, Result};

#[derive(Clone)]
enum TreeNode {
    Dir(BTreeMap<Vec<u8>, Rc<TreeNode>>),
    File,
}

impl TreeNode {
    fn empty_dir() -> Rc<TreeNode> {
        Rc::new(TreeNode::Dir(BTreeMap::new()))
    }

    fn kind(&self) -> NodeKind {
        match self {
            TreeNode::Dir(_) => NodeKind::Dir,
            TreeNode::File => NodeKind::File,
        }
    }
}

/// Maintains the evolving directory tree and every past revision's frozen
/// snapshot, so `copy_path` can reference any earlier revnum (§4.8). Each
/// commit only clones the `BTreeMap`s on the path from the root to whatever
/// it touches; untouched subtrees keep their old `Rc` and are never copied.
pub struct Mirror<D> {
    delegate: D,
    /// `history[r]` is the frozen tree as of the end of revision `r`;
    /// `history[0]` is the empty repository before revision 1.
    history: Vec<Rc<TreeNode>>,
    working: Rc<TreeNode>,
    open_revnum: Option<u64>,
    /// Where (and at what revnum) the content-bearing item behind a path
    /// currently lives, so `fill_symbol` can resolve a `SymbolChangeset`'s
    /// source items back into `(path, revnum)` pairs for the fill planner.
    item_location: HashMap<ItemRef, (Vec<u8>, u64)>,
}

impl<D: OutputDelegate> Mirror<D> {
    pub fn new(delegate: D) -> Self {
        Self {
            delegate,
            history: vec![TreeNode::empty_dir()],
            working: TreeNode::empty_dir(),
            open_revnum: None,
            item_location: HashMap::new(),
        }
    }

    pub fn into_delegate(self) -> D {
        self.delegate
    }

    /// Whether `path` currently names a file in the working tree, so callers
    /// can choose between `add_path` and `change_path` without tracking
    /// presence themselves.
    pub fn exists(&self, path: &[u8]) -> bool {
        matches!(lookup(&self.working, &split(path)), Some(node) if matches!(&*node, TreeNode::File))
    }

    pub fn start_commit(&mut self, revnum: u64, revprops: &RevProps) -> Result<()> {
        if let Some(open) = self.open_revnum {
            return Err(Error::Mirror(format!(
                "start_commit({}) called while revision {} is still open",
                revnum, open
            )));
        }
        self.delegate.start_commit(revnum, revprops)?;
        self.open_revnum = Some(revnum);
        Ok(())
    }

    pub fn end_commit(&mut self) -> Result<()> {
        let revnum = self
            .open_revnum
            .take()
            .ok_or_else(|| Error::Mirror("end_commit called with no open revision".into()))?;
        self.delegate.end_commit()?;
        if self.history.len() as u64 != revnum {
            return Err(Error::Mirror(format!(
                "end_commit: expected to close revision {} but history holds {} revisions",
                revnum,
                self.history.len()
            )));
        }
        self.history.push(self.working.clone());
        Ok(())
    }

    pub fn mkdir(&mut self, path: &[u8]) -> Result<()> {
        self.require_open()?;
        self.ensure_dir(&split(path))
    }

    pub fn add_path(
        &mut self,
        path: &[u8],
        content: Vec<u8>,
        props: Properties,
        item: ItemRef,
    ) -> Result<()> {
        let revnum = self.require_open()?;
        let segments = split(path);
        let parent = parent_segments(&segments)?;
        self.ensure_dir(parent)?;

        if lookup(&self.working, &segments).is_some() {
            return Err(Error::Mirror(format!(
                "add_path: {} already exists",
                String::from_utf8_lossy(path)
            )));
        }

        self.delegate.add_node(&Node {
            path: path.to_vec(),
            kind: NodeKind::File,
            action: NodeAction::Add,
            copyfrom: None,
            props: Some(props),
            content: Some(content),
        })?;
        self.working = set(&self.working, &segments, Some(Rc::new(TreeNode::File)))?;
        self.item_location.insert(item, (path.to_vec(), revnum));
        Ok(())
    }

    pub fn change_path(
        &mut self,
        path: &[u8],
        content: Vec<u8>,
        props: Properties,
        item: ItemRef,
    ) -> Result<()> {
        let revnum = self.require_open()?;
        let segments = split(path);
        match lookup(&self.working, &segments) {
            Some(node) if matches!(&*node, TreeNode::File) => {}
            Some(_) => {
                return Err(Error::Mirror(format!(
                    "change_path: {} is a directory",
                    String::from_utf8_lossy(path)
                )))
            }
            None => {
                return Err(Error::Mirror(format!(
                    "change_path: {} does not exist",
                    String::from_utf8_lossy(path)
                )))
            }
        }

        self.delegate.change_node(&Node {
            path: path.to_vec(),
            kind: NodeKind::File,
            action: NodeAction::Change,
            copyfrom: None,
            props: Some(props),
            content: Some(content),
        })?;
        self.item_location.insert(item, (path.to_vec(), revnum));
        Ok(())
    }

    /// Deletes `path`. When `prune` is set, any ancestor directory left empty
    /// by the deletion is removed too, repeating up the tree.
    pub fn delete_path(&mut self, path: &[u8], prune: bool) -> Result<()> {
        self.require_open()?;
        let segments = split(path);
        let kind = lookup(&self.working, &segments)
            .ok_or_else(|| {
                Error::Mirror(format!(
                    "delete_path: {} does not exist",
                    String::from_utf8_lossy(path)
                ))
            })?
            .kind();

        self.delegate.delete_path(path, kind)?;
        self.working = set(&self.working, &segments, None)?;

        if prune {
            self.prune_empty_ancestors(&segments)?;
        }
        Ok(())
    }

    fn prune_empty_ancestors(&mut self, deleted: &[Vec<u8>]) -> Result<()> {
        let mut prefix = deleted[..deleted.len().saturating_sub(1)].to_vec();
        while !prefix.is_empty() {
            let empty = match lookup(&self.working, &prefix) {
                Some(node) => matches!(&*node, TreeNode::Dir(children) if children.is_empty()),
                None => false,
            };
            if !empty {
                break;
            }
            let path = join(&prefix);
            self.delegate.delete_path(&path, NodeKind::Dir)?;
            self.working = set(&self.working, &prefix, None)?;
            prefix.pop();
        }
        Ok(())
    }

    /// Copies `src` as it existed at the end of `src_revnum` onto `dst` in the
    /// commit currently open. `enforce_empty_dst` rejects a pre-existing
    /// `dst` outright (used when a symbol is being created for the first
    /// time); otherwise an existing `dst` is replaced.
    pub fn copy_path(
        &mut self,
        src: &[u8],
        dst: &[u8],
        src_revnum: u64,
        enforce_empty_dst: bool,
    ) -> Result<()> {
        self.require_open()?;
        let src_segments = split(src);
        let history_root = self.history.get(src_revnum as usize).ok_or_else(|| {
            Error::Mirror(format!("copy_path: no such revision r{}", src_revnum))
        })?;
        let src_node = lookup(history_root, &src_segments).ok_or_else(|| {
            Error::Mirror(format!(
                "copy_path: {} does not exist at r{}",
                String::from_utf8_lossy(src),
                src_revnum
            ))
        })?;

        let dst_segments = split(dst);
        let existing = lookup(&self.working, &dst_segments);
        if enforce_empty_dst && existing.is_some() {
            return Err(Error::Mirror(format!(
                "copy_path: destination {} already exists",
                String::from_utf8_lossy(dst)
            )));
        }
        self.ensure_dir(parent_segments(&dst_segments)?)?;

        let action = if existing.is_some() {
            NodeAction::Replace
        } else {
            NodeAction::Add
        };
        self.delegate.add_node(&Node {
            path: dst.to_vec(),
            kind: src_node.kind(),
            action,
            copyfrom: Some((src_revnum, src.to_vec())),
            props: None,
            content: None,
        })?;
        self.working = set(&self.working, &dst_segments, Some(src_node))?;
        Ok(())
    }

    /// Creates or updates `<base>/<name>` (the caller resolves `base` to the
    /// configured branches or tags root from the changeset's `kind`) from the
    /// consolidated source items the commit grouper collected for this
    /// symbol, via the minimal copy plan `sequencer::fill` computes (§4.7).
    pub fn fill_symbol(&mut self, changeset: &SymbolChangeset, base: &str) -> Result<()> {
        let dest_root = format!("{}/{}", base, changeset.svn_name);

        let mut sources: Vec<(Vec<u8>, u64)> = Vec::new();
        let mut abs_by_rel_and_revnum: HashMap<(Vec<u8>, u64), Vec<u8>> = HashMap::new();
        for item in &changeset.source_items {
            let (abs_path, revnum) = self.item_location.get(item).ok_or_else(|| {
                Error::Mirror(format!(
                    "fill_symbol({}): no recorded location for source item {:?}",
                    changeset.svn_name, item
                ))
            })?;
            let rel = relative_to_base(abs_path);
            abs_by_rel_and_revnum.insert((rel.clone(), *revnum), abs_path.clone());
            sources.push((rel, *revnum));
        }

        self.mkdir(dest_root.as_bytes())?;

        for op in sequencer::fill::plan(&sources) {
            match op {
                FillOp::CopyTree { dst, src_revnum } => {
                    let abs_src = abs_prefix_for(&dst, src_revnum, &sources, &abs_by_rel_and_revnum)?;
                    let abs_dst = format!("{}/{}", dest_root, String::from_utf8_lossy(&dst));
                    self.copy_path(&abs_src, abs_dst.as_bytes(), src_revnum, false)?;
                }
                FillOp::CopyFile { dst, src_revnum } => {
                    let abs_src = abs_by_rel_and_revnum
                        .get(&(dst.clone(), src_revnum))
                        .cloned()
                        .ok_or_else(|| {
                            Error::Mirror(format!(
                                "fill_symbol({}): no source path for {:?} at r{}",
                                changeset.svn_name, dst, src_revnum
                            ))
                        })?;
                    let abs_dst = format!("{}/{}", dest_root, String::from_utf8_lossy(&dst));
                    self.copy_path(&abs_src, abs_dst.as_bytes(), src_revnum, false)?;
                }
            }
        }
        Ok(())
    }

    fn require_open(&self) -> Result<u64> {
        self.open_revnum
            .ok_or_else(|| Error::Mirror("mutation attempted outside an open commit".into()))
    }

    fn ensure_dir(&mut self, segments: &[Vec<u8>]) -> Result<()> {
        let mut prefix: Vec<Vec<u8>> = Vec::new();
        for segment in segments {
            prefix.push(segment.clone());
            match lookup(&self.working, &prefix) {
                Some(node) if matches!(&*node, TreeNode::Dir(_)) => {}
                Some(_) => {
                    return Err(Error::Mirror(format!(
                        "ensure_dir: {} is a file",
                        String::from_utf8_lossy(&join(&prefix))
                    )))
                }
                None => {
                    let path = join(&prefix);
                    self.delegate.mkdir(&path)?;
                    self.working = set(&self.working, &prefix, Some(TreeNode::empty_dir()))?;
                }
            }
        }
        Ok(())
    }
}

/// Finds the absolute base a `CopyTree`'s subtree should be read from: any
/// resolved source under `dst` at `src_revnum` shares the same base, since
/// `dst` is a common ancestor directory of every leaf the planner folded
/// into this copy.
fn abs_prefix_for(
    dst: &[u8],
    src_revnum: u64,
    sources: &[(Vec<u8>, u64)],
    abs_by_rel_and_revnum: &HashMap<(Vec<u8>, u64), Vec<u8>>,
) -> Result<Vec<u8>> {
    let under_dst = sources.iter().find(|(rel, revnum)| {
        *revnum == src_revnum && (rel.as_slice() == dst || starts_with_segment(rel, dst))
    });
    let (rel, revnum) = under_dst.ok_or_else(|| {
        Error::Mirror(format!(
            "fill_symbol: no resolved source under {:?} at r{}",
            String::from_utf8_lossy(dst),
            src_revnum
        ))
    })?;
    let abs = &abs_by_rel_and_revnum[&(rel.clone(), *revnum)];
    let keep = abs.len() - rel.len() + dst.len();
    Ok(abs[..keep].to_vec())
}

fn starts_with_segment(rel: &[u8], dst: &[u8]) -> bool {
    rel.len() > dst.len() && rel.starts_with(dst) && rel[dst.len()] == b'/'
}

fn relative_to_base(abs_path: &[u8]) -> Vec<u8> {
    match abs_path.iter().position(|&b| b == b'/') {
        Some(idx) => abs_path[idx + 1..].to_vec(),
        None => Vec::new(),
    }
}

fn split(path: &[u8]) -> Vec<Vec<u8>> {
    path.split(|&b| b == b'/')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_vec())
        .collect()
}

fn join(segments: &[Vec<u8>]) -> Vec<u8> {
    segments.join(&b"/"[..])
}

fn parent_segments(segments: &[Vec<u8>]) -> Result<&[Vec<u8>]> {
    if segments.is_empty() {
        return Err(Error::Mirror("empty path".into()));
    }
    Ok(&segments[..segments.len() - 1])
}

fn lookup(root: &Rc<TreeNode>, segments: &[Vec<u8>]) -> Option<Rc<TreeNode>> {
    let mut cur = root.clone();
    for segment in segments {
        match &*cur {
            TreeNode::Dir(children) => cur = children.get(segment)?.clone(),
            TreeNode::File => return None,
        }
    }
    Some(cur)
}

fn set(root: &Rc<TreeNode>, segments: &[Vec<u8>], new_node: Option<Rc<TreeNode>>) -> Result<Rc<TreeNode>> {
    if segments.is_empty() {
        return new_node.ok_or_else(|| Error::Mirror("cannot delete the repository root".into()));
    }
    let (head, rest) = segments.split_first().expect("checked non-empty above");
    match &**root {
        TreeNode::Dir(children) => {
            let mut children = children.clone();
            if rest.is_empty() {
                match new_node {
                    Some(n) => {
                        children.insert(head.clone(), n);
                    }
                    None => {
                        children.remove(head);
                    }
                }
            } else {
                let child = children.get(head).cloned().ok_or_else(|| {
                    Error::Mirror(format!(
                        "path segment {:?} does not exist",
                        String::from_utf8_lossy(head)
                    ))
                })?;
                children.insert(head.clone(), set(&child, rest, new_node)?);
            }
            Ok(Rc::new(TreeNode::Dir(children)))
        }
        TreeNode::File => Err(Error::Mirror("attempted to descend into a file".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    #[derive(Default)]
    struct Recording {
        events: Vec<String>,
    }

    impl OutputDelegate for Recording {
        fn start_commit(&mut self, revnum: u64, _revprops: &RevProps) -> svn_dump::Result<()> {
            self.events.push(format!("start {}", revnum));
            Ok(())
        }
        fn mkdir(&mut self, path: &[u8]) -> svn_dump::Result<()> {
            self.events.push(format!("mkdir {}", String::from_utf8_lossy(path)));
            Ok(())
        }
        fn add_node(&mut self, node: &Node) -> svn_dump::Result<()> {
            self.events.push(format!("add {}", String::from_utf8_lossy(&node.path)));
            Ok(())
        }
        fn change_node(&mut self, node: &Node) -> svn_dump::Result<()> {
            self.events.push(format!("change {}", String::from_utf8_lossy(&node.path)));
            Ok(())
        }
        fn delete_path(&mut self, path: &[u8], _kind: NodeKind) -> svn_dump::Result<()> {
            self.events.push(format!("delete {}", String::from_utf8_lossy(path)));
            Ok(())
        }
        fn end_commit(&mut self) -> svn_dump::Result<()> {
            self.events.push("end".into());
            Ok(())
        }
    }

    fn revprops() -> RevProps {
        Map::new()
    }

    #[test]
    fn add_path_creates_missing_parent_dirs() {
        let mut mirror = Mirror::new(Recording::default());
        mirror.start_commit(1, &revprops()).unwrap();
        mirror
            .add_path(b"trunk/a/b.txt", b"hi".to_vec(), Properties::new(), (0, 0))
            .unwrap();
        mirror.end_commit().unwrap();

        let events = mirror.into_delegate().events;
        assert_eq!(events, vec!["start 1", "mkdir trunk", "mkdir trunk/a", "add trunk/a/b.txt", "end"]);
    }

    #[test]
    fn copy_path_references_a_prior_revision() {
        let mut mirror = Mirror::new(Recording::default());
        mirror.start_commit(1, &revprops()).unwrap();
        mirror
            .add_path(b"trunk/a.txt", b"hi".to_vec(), Properties::new(), (0, 0))
            .unwrap();
        mirror.end_commit().unwrap();

        mirror.start_commit(2, &revprops()).unwrap();
        mirror.mkdir(b"tags").unwrap();
        mirror.copy_path(b"trunk", b"tags/v1", 1, true).unwrap();
        mirror.end_commit().unwrap();

        assert!(lookup(&mirror.working, &split(b"tags/v1/a.txt")).is_some());
    }

    #[test]
    fn copy_path_rejects_existing_destination_when_enforced() {
        let mut mirror = Mirror::new(Recording::default());
        mirror.start_commit(1, &revprops()).unwrap();
        mirror.mkdir(b"trunk").unwrap();
        mirror.mkdir(b"tags").unwrap();
        mirror.end_commit().unwrap();

        mirror.start_commit(2, &revprops()).unwrap();
        mirror.mkdir(b"tags/v1").unwrap();
        let err = mirror.copy_path(b"trunk", b"tags/v1", 1, true).unwrap_err();
        assert!(matches!(err, Error::Mirror(_)));
    }

    #[test]
    fn delete_path_prunes_empty_ancestors() {
        let mut mirror = Mirror::new(Recording::default());
        mirror.start_commit(1, &revprops()).unwrap();
        mirror
            .add_path(b"trunk/a/b.txt", b"hi".to_vec(), Properties::new(), (0, 0))
            .unwrap();
        mirror.end_commit().unwrap();

        mirror.start_commit(2, &revprops()).unwrap();
        mirror.delete_path(b"trunk/a/b.txt", true).unwrap();
        mirror.end_commit().unwrap();

        assert!(lookup(&mirror.working, &split(b"trunk/a")).is_none());
        assert!(lookup(&mirror.working, &split(b"trunk")).is_some());
    }

    #[test]
    fn mutation_outside_open_commit_is_rejected() {
        let mut mirror = Mirror::new(Recording::default());
        let err = mirror.mkdir(b"trunk").unwrap_err();
        assert!(matches!(err, Error::Mirror(_)));
    }
}
