//! A straight-line writer for the Subversion dumpfile wire format (v3): no
//! buffering of whole revisions, since every record's length is known before
//! its bytes are written.

use std::io::Write;

use crate::error::Result;
use crate::node::{Node, RevProps};

pub struct DumpWriter<W: Write> {
    inner: W,
}

impl<W: Write> DumpWriter<W> {
    pub fn new(mut inner: W) -> Result<Self> {
        writeln!(inner, "SVN-fs-dump-format-version: 3")?;
        writeln!(inner)?;
        Ok(Self { inner })
    }

    pub fn write_uuid(&mut self, uuid: &str) -> Result<()> {
        writeln!(self.inner, "UUID: {}", uuid)?;
        writeln!(self.inner)?;
        Ok(())
    }

    pub fn write_revision(&mut self, revnum: u64, revprops: &RevProps) -> Result<()> {
        let props = encode_props(revprops.iter().map(|(k, v)| (k.as_str(), v.as_bytes())));

        writeln!(self.inner, "Revision-number: {}", revnum)?;
        writeln!(self.inner, "Prop-content-length: {}", props.len())?;
        writeln!(self.inner, "Content-length: {}", props.len())?;
        writeln!(self.inner)?;
        self.inner.write_all(&props)?;
        writeln!(self.inner)?;
        Ok(())
    }

    pub fn write_node(&mut self, node: &Node) -> Result<()> {
        let props = node
            .props
            .as_ref()
            .map(|p| encode_props(p.iter().map(|(k, v)| (k.as_str(), v.as_bytes()))));
        let prop_len = props.as_ref().map(|p| p.len()).unwrap_or(0);
        let text_len = node.content.as_ref().map(|c| c.len()).unwrap_or(0);

        writeln!(
            self.inner,
            "Node-path: {}",
            String::from_utf8_lossy(&node.path)
        )?;
        writeln!(self.inner, "Node-kind: {}", node.kind.as_str())?;
        writeln!(self.inner, "Node-action: {}", node.action.as_str())?;

        if let Some((src_revnum, src_path)) = &node.copyfrom {
            writeln!(self.inner, "Node-copyfrom-rev: {}", src_revnum)?;
            writeln!(
                self.inner,
                "Node-copyfrom-path: {}",
                String::from_utf8_lossy(src_path)
            )?;
        }

        if props.is_some() {
            writeln!(self.inner, "Prop-content-length: {}", prop_len)?;
        }
        if node.content.is_some() {
            writeln!(self.inner, "Text-content-length: {}", text_len)?;
        }
        writeln!(self.inner, "Content-length: {}", prop_len + text_len)?;
        writeln!(self.inner)?;

        if let Some(props) = &props {
            self.inner.write_all(props)?;
        }
        if let Some(content) = &node.content {
            self.inner.write_all(content)?;
        }
        writeln!(self.inner)?;
        writeln!(self.inner)?;

        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

fn encode_props<'a>(entries: impl Iterator<Item = (&'a str, &'a [u8])>) -> Vec<u8> {
    let mut out = Vec::new();
    for (key, value) in entries {
        out.extend_from_slice(format!("K {}\n", key.len()).as_bytes());
        out.extend_from_slice(key.as_bytes());
        out.push(b'\n');
        out.extend_from_slice(format!("V {}\n", value.len()).as_bytes());
        out.extend_from_slice(value);
        out.push(b'\n');
    }
    out.extend_from_slice(b"PROPS-END\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeKind, Properties};

    #[test]
    fn writes_version_header_on_construction() {
        let mut buf = Vec::new();
        {
            let writer = DumpWriter::new(&mut buf).unwrap();
            drop(writer);
        }
        assert!(String::from_utf8(buf).unwrap().starts_with("SVN-fs-dump-format-version: 3\n\n"));
    }

    #[test]
    fn node_content_length_sums_props_and_text() {
        let mut buf = Vec::new();
        let mut writer = DumpWriter::new(&mut buf).unwrap();
        let mut props = Properties::new();
        props.insert("svn:eol-style".to_string(), "native".to_string());

        writer
            .write_node(&Node {
                path: b"trunk/a.txt".to_vec(),
                kind: NodeKind::File,
                action: crate::node::NodeAction::Add,
                copyfrom: None,
                props: Some(props),
                content: Some(b"hello\n".to_vec()),
            })
            .unwrap();

        let output = String::from_utf8(buf).unwrap();
        assert!(output.contains("Node-path: trunk/a.txt"));
        assert!(output.contains("Text-content-length: 6"));
    }
}
