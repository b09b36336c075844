//! Reports mutation counts to stdout as they happen, the way the teacher's
//! CLI reports import progress: one line per commit, no per-node noise
//! unless `log` is at `trace`.

use crate::delegate::OutputDelegate;
use crate::error::Result;
use crate::node::{Node, NodeKind, RevProps};

#[derive(Default)]
pub struct ProgressDelegate {
    nodes_in_commit: u64,
}

impl OutputDelegate for ProgressDelegate {
    fn start_commit(&mut self, revnum: u64, revprops: &RevProps) -> Result<()> {
        self.nodes_in_commit = 0;
        let author = revprops.get("svn:author").map(String::as_str).unwrap_or("(none)");
        println!("r{}: {}", revnum, author);
        Ok(())
    }

    fn mkdir(&mut self, path: &[u8]) -> Result<()> {
        self.nodes_in_commit += 1;
        log::trace!("mkdir {}", String::from_utf8_lossy(path));
        Ok(())
    }

    fn add_node(&mut self, node: &Node) -> Result<()> {
        self.nodes_in_commit += 1;
        log::trace!("add {}", String::from_utf8_lossy(&node.path));
        Ok(())
    }

    fn change_node(&mut self, node: &Node) -> Result<()> {
        self.nodes_in_commit += 1;
        log::trace!("change {}", String::from_utf8_lossy(&node.path));
        Ok(())
    }

    fn delete_path(&mut self, path: &[u8], _kind: NodeKind) -> Result<()> {
        self.nodes_in_commit += 1;
        log::trace!("delete {}", String::from_utf8_lossy(path));
        Ok(())
    }

    fn end_commit(&mut self) -> Result<()> {
        log::debug!("{} node(s) in this revision", self.nodes_in_commit);
        Ok(())
    }
}
