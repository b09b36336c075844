//! Writes every mutation straight through to a [`DumpWriter`].

use std::io::Write;

use crate::delegate::OutputDelegate;
use crate::error::Result;
use crate::node::{Node, NodeAction, NodeKind, RevProps};
use crate::writer::DumpWriter;

pub struct DumpfileDelegate<W: Write> {
    writer: DumpWriter<W>,
}

impl<W: Write> DumpfileDelegate<W> {
    pub fn new(inner: W) -> Result<Self> {
        Ok(Self {
            writer: DumpWriter::new(inner)?,
        })
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write> OutputDelegate for DumpfileDelegate<W> {
    fn start_commit(&mut self, revnum: u64, revprops: &RevProps) -> Result<()> {
        self.writer.write_revision(revnum, revprops)
    }

    fn mkdir(&mut self, path: &[u8]) -> Result<()> {
        self.writer.write_node(&Node {
            path: path.to_vec(),
            kind: NodeKind::Dir,
            action: NodeAction::Add,
            copyfrom: None,
            props: None,
            content: None,
        })
    }

    fn add_node(&mut self, node: &Node) -> Result<()> {
        self.writer.write_node(node)
    }

    fn change_node(&mut self, node: &Node) -> Result<()> {
        self.writer.write_node(node)
    }

    fn delete_path(&mut self, path: &[u8], kind: NodeKind) -> Result<()> {
        self.writer.write_node(&Node::delete(path.to_vec(), kind))
    }

    fn end_commit(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;

    #[test]
    fn round_trips_a_simple_commit() {
        let mut delegate = DumpfileDelegate::new(Vec::new()).unwrap();
        let mut revprops = RevProps::new();
        revprops.insert("svn:author".to_string(), "alice".to_string());

        delegate.start_commit(2, &revprops).unwrap();
        delegate
            .add_node(&Node {
                path: b"trunk/a.txt".to_vec(),
                kind: NodeKind::File,
                action: NodeAction::Add,
                copyfrom: None,
                props: None,
                content: Some(b"hi\n".to_vec()),
            })
            .unwrap();
        delegate.end_commit().unwrap();

        let output = String::from_utf8(delegate.into_inner()).unwrap();
        assert!(output.contains("Revision-number: 2"));
        assert!(output.contains("Node-path: trunk/a.txt"));
    }
}
