//! Symbol fill planner (§4.7): picks the minimal set of directory copies
//! (plus per-file fixups) that reproduce a symbol's target tree, instead of
//! one copy operation per file.
//!
//! Builds a trie over the symbol's target paths, tallies how many leaves in
//! each subtree want content from each candidate source revnum, and greedily
//! picks, top-down, the revnum that covers the most leaves at each node.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillOp {
    /// Copies an entire subtree from `src_revnum` in one mirror operation.
    /// The mirror is responsible for deleting any path under `dst` that
    /// exists at `src_revnum` but has no corresponding leaf in the plan.
    CopyTree { dst: Vec<u8>, src_revnum: u64 },
    /// A leaf whose source revnum differs from the copy its parent
    /// directory received (or no ancestor copy covers it at all).
    CopyFile { dst: Vec<u8>, src_revnum: u64 },
}

#[derive(Default)]
struct Node {
    children: HashMap<Vec<u8>, Node>,
    leaf_revnum: Option<u64>,
    counts: HashMap<u64, u32>,
}

impl Node {
    fn insert(&mut self, path: &[&[u8]], revnum: u64) {
        let mut cursor = self;
        for (i, segment) in path.iter().enumerate() {
            cursor = cursor.children.entry(segment.to_vec()).or_default();
            if i == path.len() - 1 {
                cursor.leaf_revnum = Some(revnum);
            }
        }
    }

    fn tally(&mut self) {
        if let Some(revnum) = self.leaf_revnum {
            self.counts.insert(revnum, 1);
            return;
        }
        for child in self.children.values_mut() {
            child.tally();
            for (&revnum, &count) in &child.counts {
                *self.counts.entry(revnum).or_insert(0) += count;
            }
        }
    }

    fn best_revnum(&self) -> Option<u64> {
        self.counts
            .iter()
            .max_by_key(|(&revnum, &count)| (count, revnum))
            .map(|(&revnum, _)| revnum)
    }
}

/// `sources` is the symbol's complete target tree: every path it should
/// contain, with the svn revnum its content should be copied from. `root` is
/// the destination prefix (e.g. `branches/foo`) the returned ops are relative
/// to being rooted under.
pub fn plan(sources: &[(Vec<u8>, u64)]) -> Vec<FillOp> {
    let mut tree = Node::default();
    for (path, revnum) in sources {
        let segments: Vec<&[u8]> = path.split(|&b| b == b'/').collect();
        tree.insert(&segments, *revnum);
    }
    tree.tally();

    let mut ops = Vec::new();
    walk(&tree, &mut Vec::new(), None, &mut ops);
    ops
}

fn walk(node: &Node, path: &mut Vec<u8>, inherited: Option<u64>, ops: &mut Vec<FillOp>) {
    if let Some(revnum) = node.leaf_revnum {
        if Some(revnum) != inherited {
            ops.push(FillOp::CopyFile {
                dst: path.clone(),
                src_revnum: revnum,
            });
        }
        return;
    }

    let best = node.best_revnum();
    // The root of the tree is the symbol's destination directory itself,
    // already created by the SymbolFill changeset's mkdir -- there's no
    // "copy the root from revnum X" operation, only copies of things under
    // it, so the synthetic root (empty path) never gets its own op.
    let next_inherited = if path.is_empty() {
        // Nothing was physically copied at the synthetic root, so children
        // must not believe themselves already covered.
        inherited
    } else if best.is_some() && best != inherited {
        ops.push(FillOp::CopyTree {
            dst: path.clone(),
            src_revnum: best.unwrap(),
        });
        best
    } else {
        inherited
    };

    let mut children: Vec<(&Vec<u8>, &Node)> = node.children.iter().collect();
    children.sort_by(|a, b| a.0.cmp(b.0));
    for (segment, child) in children {
        let original_len = path.len();
        if !path.is_empty() {
            path.push(b'/');
        }
        path.extend_from_slice(segment);
        walk(child, path, next_inherited, ops);
        path.truncate(original_len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_whole_subtree_when_all_leaves_share_a_revnum() {
        let sources = vec![
            (b"a/one.txt".to_vec(), 5),
            (b"a/two.txt".to_vec(), 5),
            (b"a/b/three.txt".to_vec(), 5),
        ];

        let ops = plan(&sources);
        assert_eq!(ops, vec![FillOp::CopyTree { dst: b"a".to_vec(), src_revnum: 5 }]);
    }

    #[test]
    fn falls_back_to_per_file_copy_for_the_minority_revnum() {
        let sources = vec![
            (b"a/one.txt".to_vec(), 5),
            (b"a/two.txt".to_vec(), 5),
            (b"a/three.txt".to_vec(), 9),
        ];

        let ops = plan(&sources);
        assert_eq!(
            ops,
            vec![
                FillOp::CopyTree { dst: b"a".to_vec(), src_revnum: 5 },
                FillOp::CopyFile { dst: b"a/three.txt".to_vec(), src_revnum: 9 },
            ]
        );
    }

    #[test]
    fn single_file_symbol_emits_one_copy_file() {
        let sources = vec![(b"README".to_vec(), 3)];
        let ops = plan(&sources);
        assert_eq!(ops, vec![FillOp::CopyFile { dst: b"README".to_vec(), src_revnum: 3 }]);
    }
}
