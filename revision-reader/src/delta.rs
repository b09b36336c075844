//! Materializes file contents by applying stored RCS deltas, exactly as the
//! teacher's `discovery::handle_tree` recursion does, but targeted at a
//! single `(file, revnum)` pair instead of visiting the whole tree.

use std::{fs, path::Path, str::FromStr};

use comma_v::Num;
use rcs_ed::Script;

use crate::error::{Error, Result};
use crate::RevisionReader;

/// A single-slot cache of the most recently parsed `,v` file, to avoid
/// re-parsing it on every call when a caller requests several revisions of
/// the same file in a row (the common case: one file at a time, walking
/// forward through its history).
struct CacheEntry {
    file_id: u32,
    parsed: comma_v::File,
}

#[derive(Default)]
pub struct DeltaReader {
    cache: Option<CacheEntry>,
    hits: u64,
    misses: u64,
}

impl DeltaReader {
    pub fn new() -> Self {
        Self::default()
    }

    fn parsed(&mut self, file_id: u32, path: &Path) -> Result<&comma_v::File> {
        let needs_parse = match &self.cache {
            Some(entry) => entry.file_id != file_id,
            None => true,
        };

        if needs_parse {
            self.misses += 1;
            let raw = fs::read(path)?;
            let parsed = comma_v::parse(&raw)?;
            self.cache = Some(CacheEntry { file_id, parsed });
        } else {
            self.hits += 1;
        }

        Ok(&self.cache.as_ref().unwrap().parsed)
    }
}

impl RevisionReader for DeltaReader {
    fn start(&mut self) -> Result<()> {
        self.hits = 0;
        self.misses = 0;
        Ok(())
    }

    fn read(&mut self, file_id: u32, path: &Path, revnum: &str) -> Result<Vec<u8>> {
        let target = Num::from_str(revnum)?;
        let cv = self.parsed(file_id, path)?;

        let head = cv.head().ok_or_else(|| Error::MissingHead(path.to_path_buf()))?;
        locate(cv, None, head, &target)?.ok_or_else(|| Error::UnreachableRevision {
            path: path.to_path_buf(),
            revnum: revnum.to_string(),
        })
    }

    fn finish(&mut self) -> Result<()> {
        log::debug!("delta reader cache: {} hits, {} misses", self.hits, self.misses);
        Ok(())
    }
}

fn locate(
    cv: &comma_v::File,
    contents: Option<rcs_ed::File>,
    revision: &Num,
    target: &Num,
) -> Result<Option<Vec<u8>>> {
    let mut revision = revision.clone();
    let mut contents = contents;

    loop {
        let (delta, delta_text) = match cv.revision(&revision) {
            Some(pair) => pair,
            None => return Ok(None),
        };

        contents = Some(match contents {
            Some(mut existing) => {
                let commands = Script::parse(delta_text.text.as_cursor())
                    .into_command_list()
                    .map_err(anyhow::Error::from)?;
                existing.apply_in_place(&commands)?;
                existing
            }
            None => rcs_ed::File::new(delta_text.text.as_cursor())?,
        });

        if &revision == target {
            return Ok(contents.map(|c| c.as_bytes()));
        }

        for branch_revision in &delta.branches {
            if let Some(found) = locate(cv, contents.clone(), branch_revision, target)? {
                return Ok(Some(found));
            }
        }

        match &delta.next {
            Some(next) => revision = next.clone(),
            None => return Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    const SIMPLE_RCS: &[u8] = b"head\t1.2;\naccess;\nsymbols;\nlocks; strict;\ncomment\t@# @;\n\n\n1.2\ndate\t2020.01.02.00.00.00;\tauthor alice;\tstate Exp;\nbranches;\nnext\t1.1;\n\n1.1\ndate\t2020.01.01.00.00.00;\tauthor alice;\tstate Exp;\nbranches;\nnext\t;\n\n\ndesc\n@@\n\n\n1.2\nlog\n@second@\ntext\n@a\nb\n@\n\n\n1.1\nlog\n@first@\ntext\n@d1 1\na\n.\n@\n";

    #[test]
    fn reads_head_revision() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "file.txt,v", SIMPLE_RCS);

        let mut reader = DeltaReader::new();
        reader.start().unwrap();
        let content = reader.read(1, &path, "1.2").unwrap();
        assert_eq!(content, b"a\nb\n");
        reader.finish().unwrap();
    }

    #[test]
    fn reads_predecessor_revision_via_delta_application() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "file.txt,v", SIMPLE_RCS);

        let mut reader = DeltaReader::new();
        let content = reader.read(1, &path, "1.1").unwrap();
        assert_eq!(content, b"a\n");
    }

    #[test]
    fn unknown_revision_is_reported_as_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "file.txt,v", SIMPLE_RCS);

        let mut reader = DeltaReader::new();
        let err = reader.read(1, &path, "1.9").unwrap_err();
        assert!(matches!(err, Error::UnreachableRevision { .. }));
    }
}
