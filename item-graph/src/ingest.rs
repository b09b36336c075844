//! Walks a CVS repository tree, parses every `*,v` file with `comma-v`, and
//! writes the raw (not yet validated or timestamp-normalized) item graph to
//! the artifact store. One file at a time, single-threaded: §5 mandates
//! that all I/O is driven from one thread and that peak memory stays
//! independent of repository size, so each file's parse is written and
//! dropped before the next one is read, rather than collecting every file's
//! items into memory first.

use std::{
    collections::{HashMap, HashSet},
    ffi::OsStr,
    fs,
    os::unix::prelude::OsStrExt,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use artifact_store::{ArtifactRef, Kind, PassDecl, Store, WriteDecl};
use comma_v::{Delta, File as CommaVFile, Num};
use walkdir::WalkDir;

use crate::{
    encoding::decode,
    error::{Error, Result},
    model::{hash_log_message, Branch, CvsFile, CvsItem, Revision, Tag, FILES_SCHEMA, ITEMS_SCHEMA},
};

pub const PASS_NAME: &str = "ingest";
pub const FILES_ARTIFACT: &str = "files";
pub const ITEMS_ARTIFACT: &str = "items";

pub fn files_ref() -> ArtifactRef {
    ArtifactRef::new(PASS_NAME, FILES_ARTIFACT)
}

pub fn items_ref() -> ArtifactRef {
    ArtifactRef::new(PASS_NAME, ITEMS_ARTIFACT)
}

pub fn decl() -> PassDecl {
    PassDecl::new(PASS_NAME).writes(vec![
        WriteDecl::new(FILES_ARTIFACT, Kind::Permanent, FILES_SCHEMA),
        WriteDecl::new(ITEMS_ARTIFACT, Kind::Temporary, ITEMS_SCHEMA),
    ])
}

/// Runs the ingest pass: walks `root`, parsing and writing each RCS file in
/// turn. A file that fails to parse is either skipped (logged at warn) or
/// fatal for the whole pass, depending on `ignore_errors`. `encodings` is the
/// ordered, non-empty list of encodings (§6 `--encoding`, `ascii` always
/// last) tried when a file's author or log message isn't valid UTF-8.
pub fn run(store: &Store, root: &Path, ignore_errors: bool, encodings: &[String]) -> Result<()> {
    let mut files_writer = store.writer::<CvsFile>(PASS_NAME, FILES_ARTIFACT)?;
    let mut items_writer = store.writer::<CvsItem>(PASS_NAME, ITEMS_ARTIFACT)?;

    let mut next_file_id = 0u32;
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                if ignore_errors {
                    log::warn!("skipping directory entry: {}", e);
                    continue;
                }
                return Err(Error::Io {
                    path: e.path().unwrap_or(root).to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
                });
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if !path.as_os_str().as_bytes().ends_with(b",v") {
            continue;
        }

        log::trace!("ingesting {}", path.display());
        match ingest_file(&path, root, 0, encodings) {
            Ok((mut file, items)) => {
                file.id = next_file_id;
                next_file_id += 1;

                files_writer.append(&file)?;
                for item in items {
                    items_writer.append(&renumber(item, file.id))?;
                }
            }
            Err(e) => {
                if ignore_errors {
                    log::warn!("skipping {}: {}", path.display(), e);
                } else {
                    return Err(e);
                }
            }
        }
    }

    files_writer.finish()?;
    items_writer.finish()?;
    Ok(())
}

/// `ingest_file` assigns file-local item ids starting at 0; the caller
/// renumbers them to be globally unique once the real `FileId` is known, so
/// that parsing can happen in parallel without a shared counter.
fn renumber(item: CvsItem, file_id: crate::model::FileId) -> CvsItem {
    match item {
        CvsItem::Revision(mut r) => {
            r.file_id = file_id;
            CvsItem::Revision(r)
        }
        CvsItem::Branch(mut b) => {
            b.file_id = file_id;
            CvsItem::Branch(b)
        }
        CvsItem::Tag(mut t) => {
            t.file_id = file_id;
            CvsItem::Tag(t)
        }
    }
}

fn ingest_file(
    path: &Path,
    prefix: &Path,
    file_id: crate::model::FileId,
    encodings: &[String],
) -> Result<(CvsFile, Vec<CvsItem>)> {
    let bytes = fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let cv = comma_v::parse(&bytes).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let real_path = munge_raw_path(path, prefix);

    let mut branch_symbols: HashMap<Num, Vec<String>> = HashMap::new();
    let mut tag_symbols: HashMap<Num, Vec<String>> = HashMap::new();
    for (sym, num) in cv.admin.symbols.iter() {
        let name = String::from_utf8_lossy(sym).into_owned();
        match num {
            Num::Branch(_) => branch_symbols.entry(num.clone()).or_default().push(name),
            Num::Commit(_) => tag_symbols.entry(num.clone()).or_default().push(name),
        }
    }
    for names in branch_symbols.values_mut() {
        names.sort();
    }
    for names in tag_symbols.values_mut() {
        names.sort();
    }

    let head = cv.head().ok_or_else(|| Error::MissingHead {
        path: path.to_path_buf(),
    })?;

    let executable = fs::metadata(path)
        .map(|m| {
            use std::os::unix::fs::PermissionsExt;
            m.permissions().mode() & 0o111 != 0
        })
        .unwrap_or(false);
    let binary = cv.admin.expand.as_deref() == Some(b"b");
    let default_branch = cv.admin.branch.as_ref().map(|n| n.to_string());

    let mut walker = Walker {
        path,
        cv: &cv,
        branch_symbols: &branch_symbols,
        tag_symbols: &tag_symbols,
        encodings,
        id_map: HashMap::new(),
        next_id: 0,
        items: Vec::new(),
        has_commits: HashSet::new(),
    };
    walker.walk(head, None, None, "trunk".to_string())?;

    let rcs_path = path
        .strip_prefix(prefix)
        .unwrap_or(path)
        .as_os_str()
        .as_bytes()
        .to_vec();

    let file = CvsFile {
        id: file_id,
        path: real_path.as_os_str().as_bytes().to_vec(),
        rcs_path,
        executable,
        binary,
        default_branch,
    };

    Ok((file, walker.items))
}

struct Walker<'a> {
    path: &'a Path,
    cv: &'a CommaVFile,
    branch_symbols: &'a HashMap<Num, Vec<String>>,
    tag_symbols: &'a HashMap<Num, Vec<String>>,
    encodings: &'a [String],
    id_map: HashMap<Num, u64>,
    next_id: u64,
    items: Vec<CvsItem>,
    has_commits: HashSet<Num>,
}

impl<'a> Walker<'a> {
    fn alloc(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn walk(
        &mut self,
        num: &Num,
        predecessor: Option<u64>,
        branch_of_origin: Option<u64>,
        branch_revnum: String,
    ) -> Result<()> {
        if self.id_map.contains_key(num) {
            return Err(Error::CyclicHistory {
                path: self.path.to_path_buf(),
                revision: num.to_string(),
            });
        }

        let (delta, delta_text) = self.cv.revision(num).ok_or_else(|| Error::MissingRevision {
            path: self.path.to_path_buf(),
            revision: num.to_string(),
        })?;

        let id = self.alloc();
        self.id_map.insert(num.clone(), id);

        let timestamp = delta
            .date
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let log_message = decode(&delta_text.log, self.encodings);

        self.items.push(CvsItem::Revision(Revision {
            id,
            file_id: 0,
            revnum: num.to_string(),
            author: decode(&delta.author, self.encodings),
            timestamp,
            log_digest: hash_log_message(&log_message),
            log_message,
            deleted: is_dead(delta),
            predecessor,
            branch_of_origin,
            branch_revnum: branch_revnum.clone(),
        }));

        if let Some(names) = self.tag_symbols.get(num) {
            for name in names {
                let tag_id = self.alloc();
                self.items.push(CvsItem::Tag(Tag {
                    id: tag_id,
                    file_id: 0,
                    symbol: name.clone(),
                    revision: id,
                }));
            }
        }

        for branch_head in delta.branches.iter() {
            let branch_num = branch_head.to_branch();
            self.has_commits.insert(branch_num.clone());

            let names = self
                .branch_symbols
                .get(&branch_num)
                .cloned()
                .unwrap_or_else(|| vec![]);
            let candidates: Vec<Option<String>> = if names.is_empty() {
                vec![None]
            } else {
                names.into_iter().map(Some).collect()
            };

            let mut primary_branch_id = None;
            for (i, symbol) in candidates.into_iter().enumerate() {
                let branch_id = self.alloc();
                self.items.push(CvsItem::Branch(Branch {
                    id: branch_id,
                    file_id: 0,
                    symbol,
                    revision: id,
                    branch_revnum: branch_num.to_string(),
                }));
                if i == 0 {
                    primary_branch_id = Some(branch_id);
                }
            }

            self.walk(branch_head, None, primary_branch_id, branch_num.to_string())?;
        }

        if let Some(next) = &delta.next {
            self.walk(next, Some(id), branch_of_origin, branch_revnum)?;
        }

        Ok(())
    }
}

fn is_dead(delta: &Delta) -> bool {
    delta.state.as_deref() == Some(b"dead")
}

/// Strips the CVSROOT-relative prefix, the `,v` suffix, and a trailing
/// `Attic/` directory component from a file's on-disk path.
fn munge_raw_path(input: &Path, prefix: &Path) -> PathBuf {
    let unprefixed = input.strip_prefix(prefix).unwrap_or(input);

    if let Some(input_file) = unprefixed.file_name() {
        let file = strip_comma_v_suffix(input_file).unwrap_or_else(|| PathBuf::from(input_file));
        strip_attic_suffix(unprefixed)
            .map(|path| path.join(file))
            .unwrap_or_else(|| input_file.into())
    } else {
        unprefixed.into()
    }
}

fn strip_attic_suffix(path: &Path) -> Option<&Path> {
    path.parent().and_then(|parent| {
        if parent.ends_with(OsStr::from_bytes(b"Attic")) {
            parent.parent()
        } else {
            Some(parent)
        }
    })
}

fn strip_comma_v_suffix(file: &OsStr) -> Option<PathBuf> {
    file.as_bytes()
        .strip_suffix(b",v")
        .map(|stripped| PathBuf::from(OsStr::from_bytes(stripped)))
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! assert_munge {
        ($input:expr, $prefix:expr, $want:expr) => {
            assert_eq!(
                munge_raw_path(
                    Path::new(OsStr::from_bytes($input)),
                    Path::new(OsStr::from_bytes($prefix)),
                ),
                PathBuf::from(OsStr::from_bytes($want))
            )
        };
    }

    #[test]
    fn test_munge_raw_path() {
        assert_munge!(b"foo", b"", b"foo");
        assert_munge!(b"foo,v", b"", b"foo");
        assert_munge!(b"/foo/Attic/bar,v", b"", b"/foo/bar");
        assert_munge!(b"/foo/bar/Attic/quux,v", b"/foo/bar", b"quux");
    }

    fn commit(n: &[u64]) -> Num {
        Num::Commit(n.to_vec())
    }

    fn delta(author: &str, next: Option<Num>, branches: Vec<Num>) -> Delta {
        Delta {
            date: UNIX_EPOCH,
            author: comma_v::Id(author.as_bytes().to_vec()),
            state: None,
            branches,
            next,
            commit_id: None,
        }
    }

    fn delta_text(log: &str) -> comma_v::DeltaText {
        comma_v::DeltaText {
            log: comma_v::VString(log.as_bytes().to_vec()),
            text: comma_v::VString(b"line one\n".to_vec()),
        }
    }

    fn two_revision_trunk_file() -> CommaVFile {
        let head = commit(&[1, 2]);
        let root = commit(&[1, 1]);

        let mut delta_map = HashMap::new();
        delta_map.insert(head.clone(), delta("bob", Some(root.clone()), vec![]));
        delta_map.insert(root.clone(), delta("alice", None, vec![]));

        let mut delta_text_map = HashMap::new();
        delta_text_map.insert(head.clone(), delta_text("second commit"));
        delta_text_map.insert(root.clone(), delta_text("first commit"));

        CommaVFile {
            admin: comma_v::Admin {
                head: Some(head),
                branch: None,
                access: vec![],
                symbols: HashMap::new(),
                locks: HashMap::new(),
                strict: true,
                integrity: None,
                comment: None,
                expand: None,
            },
            delta: delta_map,
            desc: comma_v::VString(vec![]),
            delta_text: delta_text_map,
        }
    }

    #[test]
    fn walks_trunk_revisions_oldest_last_with_predecessor_links() {
        let cv = two_revision_trunk_file();
        let head = cv.head().unwrap().clone();

        let mut walker = Walker {
            path: Path::new("foo,v"),
            cv: &cv,
            branch_symbols: &HashMap::new(),
            tag_symbols: &HashMap::new(),
            encodings: &[],
            id_map: HashMap::new(),
            next_id: 0,
            items: Vec::new(),
            has_commits: HashSet::new(),
        };
        walker.walk(&head, None, None, "trunk".to_string()).unwrap();

        let revisions: Vec<&Revision> = walker
            .items
            .iter()
            .filter_map(|item| match item {
                CvsItem::Revision(r) => Some(r),
                _ => None,
            })
            .collect();

        assert_eq!(revisions.len(), 2);
        assert_eq!(revisions[0].revnum, "1.2");
        assert_eq!(revisions[0].predecessor, Some(revisions[1].id));
        assert_eq!(revisions[1].revnum, "1.1");
        assert!(revisions[1].predecessor.is_none());
        assert!(revisions.iter().all(|r| r.branch_of_origin.is_none()));
    }

    #[test]
    fn detects_cyclic_history() {
        let head = commit(&[1, 2]);
        let root = commit(&[1, 1]);

        let mut delta_map = HashMap::new();
        // 1.1's `next` pointing back to 1.2 is not something valid RCS would
        // produce, but the walker must refuse to loop forever on it.
        delta_map.insert(head.clone(), delta("bob", Some(root.clone()), vec![]));
        delta_map.insert(root.clone(), delta("alice", Some(head.clone()), vec![]));

        let mut delta_text_map = HashMap::new();
        delta_text_map.insert(head.clone(), delta_text("second"));
        delta_text_map.insert(root.clone(), delta_text("first"));

        let cv = CommaVFile {
            admin: comma_v::Admin {
                head: Some(head.clone()),
                branch: None,
                access: vec![],
                symbols: HashMap::new(),
                locks: HashMap::new(),
                strict: true,
                integrity: None,
                comment: None,
                expand: None,
            },
            delta: delta_map,
            desc: comma_v::VString(vec![]),
            delta_text: delta_text_map,
        };

        let mut walker = Walker {
            path: Path::new("foo,v"),
            cv: &cv,
            branch_symbols: &HashMap::new(),
            tag_symbols: &HashMap::new(),
            encodings: &[],
            id_map: HashMap::new(),
            next_id: 0,
            items: Vec::new(),
            has_commits: HashSet::new(),
        };
        let err = walker.walk(&head, None, None, "trunk".to_string()).unwrap_err();
        assert!(matches!(err, Error::CyclicHistory { .. }));
    }
}
