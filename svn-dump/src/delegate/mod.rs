//! The output-delegate trait the SVN repository mirror drives every
//! mutation through (§4.8). Generalizes the teacher's `Output`/`Writer`
//! channel-and-worker pattern from `git-fast-import` and `internal/process`,
//! retargeted from git-fast-import commands to Subversion dump nodes and
//! simplified to a synchronous trait object per the single-threaded pass
//! model (§5): no channel, no worker task, just a direct call per mutation.

pub mod dumpfile;
pub mod progress;

use crate::error::Result;
use crate::node::{Node, NodeKind, RevProps};

pub trait OutputDelegate {
    fn start_commit(&mut self, revnum: u64, revprops: &RevProps) -> Result<()>;
    fn mkdir(&mut self, path: &[u8]) -> Result<()>;
    fn add_node(&mut self, node: &Node) -> Result<()>;
    fn change_node(&mut self, node: &Node) -> Result<()>;
    fn delete_path(&mut self, path: &[u8], kind: NodeKind) -> Result<()>;
    fn end_commit(&mut self) -> Result<()>;
}

/// Fans every mutation out to more than one delegate, in registration order,
/// so the mirror can drive (for example) a dumpfile writer and a live
/// `svnadmin load` process from the same run without knowing either exists.
#[derive(Default)]
pub struct MultiDelegate(Vec<Box<dyn OutputDelegate>>);

impl MultiDelegate {
    pub fn new(delegates: Vec<Box<dyn OutputDelegate>>) -> Self {
        Self(delegates)
    }
}

impl OutputDelegate for MultiDelegate {
    fn start_commit(&mut self, revnum: u64, revprops: &RevProps) -> Result<()> {
        for d in &mut self.0 {
            d.start_commit(revnum, revprops)?;
        }
        Ok(())
    }

    fn mkdir(&mut self, path: &[u8]) -> Result<()> {
        for d in &mut self.0 {
            d.mkdir(path)?;
        }
        Ok(())
    }

    fn add_node(&mut self, node: &Node) -> Result<()> {
        for d in &mut self.0 {
            d.add_node(node)?;
        }
        Ok(())
    }

    fn change_node(&mut self, node: &Node) -> Result<()> {
        for d in &mut self.0 {
            d.change_node(node)?;
        }
        Ok(())
    }

    fn delete_path(&mut self, path: &[u8], kind: NodeKind) -> Result<()> {
        for d in &mut self.0 {
            d.delete_path(path, kind)?;
        }
        Ok(())
    }

    fn end_commit(&mut self) -> Result<()> {
        for d in &mut self.0 {
            d.end_commit()?;
        }
        Ok(())
    }
}
