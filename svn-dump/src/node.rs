//! The node and revision records that make up one unit of a dumpfile (or one
//! `svnadmin load` transaction).

use std::collections::BTreeMap;

pub use svn_props::Properties;

/// `svn:author`, `svn:date`, `svn:log`, keyed exactly as Subversion expects.
pub type RevProps = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Dir,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Dir => "dir",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeAction {
    Add,
    Change,
    Delete,
    Replace,
}

impl NodeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeAction::Add => "add",
            NodeAction::Change => "change",
            NodeAction::Delete => "delete",
            NodeAction::Replace => "replace",
        }
    }
}

/// One `Node-path:` record. `copyfrom` carries the `Node-copyfrom-rev`/
/// `Node-copyfrom-path` pair for paths materialized via a mirror copy
/// instead of fresh content.
#[derive(Debug, Clone)]
pub struct Node {
    pub path: Vec<u8>,
    pub kind: NodeKind,
    pub action: NodeAction,
    pub copyfrom: Option<(u64, Vec<u8>)>,
    pub props: Option<Properties>,
    pub content: Option<Vec<u8>>,
}

impl Node {
    pub fn delete(path: Vec<u8>, kind: NodeKind) -> Self {
        Self {
            path,
            kind,
            action: NodeAction::Delete,
            copyfrom: None,
            props: None,
            content: None,
        }
    }

    pub fn mkdir(path: Vec<u8>) -> Self {
        Self {
            path,
            kind: NodeKind::Dir,
            action: NodeAction::Add,
            copyfrom: None,
            props: None,
            content: None,
        }
    }

    pub fn copy(path: Vec<u8>, kind: NodeKind, src_revnum: u64, src_path: Vec<u8>) -> Self {
        Self {
            path,
            kind,
            action: NodeAction::Add,
            copyfrom: Some((src_revnum, src_path)),
            props: None,
            content: None,
        }
    }
}
