//! Generic sliding-window commit grouping, keyed by `(author, message)` and
//! split on either a timestamp gap exceeding `delta` or a repeated file
//! within the current window (the one-item-per-file invariant, §4.5/§8.7).
//!
//! This is the teacher's `Detector`/`PatchSet` pair, generalized: the
//! original overwrote a repeated file's content id within the same
//! patchset, which let two copies of the same physical CVS commit interleave
//! and then collapse into one SVN revision touching a file twice. The
//! grouper crate cannot allow that (the sequencer asserts "no RevisionChangeset
//! contains two items with the same file id"), so a duplicate file arrival
//! now closes the current window and opens a fresh one, exactly as a
//! genuine timestamp gap would.

use std::{
    collections::HashMap,
    ffi::{OsStr, OsString},
    fmt::Debug,
    hash::Hash,
    mem,
    time::{Duration, SystemTime},
};

use binary_heap_plus::{BinaryHeap, MinComparator};
use thiserror::Error;

/// A `Detector` ingests a stream of file commits, and yields an iterator over
/// the patchsets detected within those file commits.
///
/// This is required because CVS treats each file commit as an independent
/// commit, and doesn't have a concept of a repo-wide commit like later VCSes
/// such as Subversion and Git. Therefore the same logical patchset can be
/// represented as a set of file commits over a period of time (since each file
/// commit gets the timestamp of when that _file_ was committed, rather than
/// when the user ran `cvs commit`).
///
/// Commits are considered to be linked into a single patchset when they have
/// matching "commit keys" within a certain duration (represented by the `delta`
/// argument to [`Detector::new()`]). The commit key is generated based on the
/// commit message, author, and branch context.
///
/// The `ID` type parameter refers to the opaque ID used to represent a file:
/// this will be passed back to the caller when yielding patchsets.
#[derive(Debug)]
pub struct Detector<ID>
where
    ID: Debug + Clone + Eq,
{
    delta: Duration,
    file_commits: HashMap<CommitKey, BinaryHeap<Commit<ID>, MinComparator>>,
}

impl<ID> Detector<ID>
where
    ID: Debug + Clone + Eq,
{
    /// Constructs a new detector.
    ///
    /// The `delta` duration will be used as the maximum time two otherwise
    /// matching file commits may diverge by before they are considered to be
    /// separate patchsets.
    pub fn new(delta: Duration) -> Self {
        Self {
            delta,
            file_commits: HashMap::new(),
        }
    }

    /// Adds a file commit to the detector.
    ///
    /// `id` is used to link the commit back to the file content. It is the
    /// responsibility of the caller to be able to map that back.
    ///
    /// If `id` is `None`, then this commit represents the file being deleted.
    #[allow(clippy::too_many_arguments)]
    pub fn add_file_commit(
        &mut self,
        path: OsString,
        id: Option<ID>,
        branch: Vec<u8>,
        author: String,
        message: String,
        time: SystemTime,
    ) {
        let key = CommitKey {
            author,
            message,
            branch: branch.clone(),
        };
        let value = Commit {
            path,
            branch,
            id,
            time,
        };

        self.file_commits
            .entry(key)
            .or_insert_with(BinaryHeap::new_min)
            .push(value);
    }

    /// Consumes the detector and returns the detected patchsets in ascending
    /// time order.
    pub fn into_patchset_iter(self) -> impl Iterator<Item = PatchSet<ID>> {
        self.into_binary_heap().into_iter_sorted()
    }

    fn into_binary_heap(self) -> BinaryHeap<PatchSet<ID>, MinComparator> {
        let mut patchsets = BinaryHeap::new_min();

        for (key, commits) in self.file_commits.into_iter() {
            let mut last = None;
            let mut pending_files: HashMap<OsString, Vec<Option<ID>>> = HashMap::new();

            for commit in commits.into_iter_sorted() {
                let gap_exceeded = last
                    .map(|last| commit.time.duration_since(last).unwrap_or_default() > self.delta)
                    .unwrap_or(false);
                let duplicate_file = pending_files.contains_key(&commit.path);

                if (gap_exceeded || duplicate_file) && !pending_files.is_empty() {
                    patchsets.push(PatchSet {
                        time: last.unwrap(),
                        author: key.author.clone(),
                        message: key.message.clone(),
                        branch: key.branch.clone(),
                        files: mem::take(&mut pending_files),
                    });
                }

                last = Some(commit.time);
                pending_files
                    .entry(commit.path)
                    .or_insert_with(Vec::new)
                    .push(commit.id);
            }

            if !pending_files.is_empty() {
                patchsets.push(PatchSet {
                    time: last.unwrap(),
                    author: key.author.clone(),
                    message: key.message.clone(),
                    branch: key.branch,
                    files: pending_files,
                });
            }
        }

        patchsets
    }
}

/// A `PatchSet` represents a single patchset detected by a [`Detector`].
///
/// This contains the commit time, author, message, branch context, and the
/// files modified by the patchset, along with all file IDs that were
/// squashed into the patchset.
#[derive(Debug, Clone, Eq)]
pub struct PatchSet<ID>
where
    ID: Debug + Clone + Eq,
{
    pub time: SystemTime,
    pub author: String,
    pub message: String,
    pub branch: Vec<u8>,
    files: HashMap<OsString, Vec<Option<ID>>>,
}

impl<ID> PatchSet<ID>
where
    ID: Debug + Clone + Eq,
{
    /// Returns the content ID for the given file. If the file is deleted in
    /// this patchset, None is returned.
    pub fn file_content(&self, file: &OsStr) -> Result<Option<&ID>, Error> {
        match self.files.get(file) {
            Some(ids) => Ok(Self::content(ids)),
            None => Err(Error::file_not_found(file)),
        }
    }

    /// Iterates over each file in the patchset, in arbitrary order, along with
    /// the content ID for the file. If the file is deleted in the patchset, the
    /// ID will be None.
    pub fn file_content_iter(&self) -> impl Iterator<Item = (&OsString, Option<&ID>)> {
        self.files
            .iter()
            .map(|(file, ids)| (file, Self::content(ids)))
    }

    /// Iterates over each file in the patchset, in arbitrary order, and
    /// provides the file and a Vec of all the content IDs that were squashed
    /// into the patchset for that file.
    pub fn file_revision_iter(&self) -> impl Iterator<Item = (&OsString, &Vec<Option<ID>>)> {
        self.files.iter()
    }

    /// Checks if the file is deleted in the patchset.
    ///
    /// In most cases, [`Self::file_content`] will be more useful.
    pub fn is_deleted(&self, file: &OsStr) -> Result<bool, Error> {
        Ok(self.file_content(file)?.is_none())
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    fn content(ids: &[Option<ID>]) -> Option<&ID> {
        ids.last().and_then(|id| id.as_ref())
    }
}

impl<ID> Default for PatchSet<ID>
where
    ID: Debug + Clone + Eq,
{
    fn default() -> Self {
        Self {
            time: SystemTime::UNIX_EPOCH,
            author: Default::default(),
            message: Default::default(),
            branch: Default::default(),
            files: Default::default(),
        }
    }
}

impl<ID> Ord for PatchSet<ID>
where
    ID: Debug + Clone + Eq,
{
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.time.cmp(&other.time)
    }
}

impl<ID> PartialOrd for PatchSet<ID>
where
    ID: Debug + Clone + Eq,
{
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.time.partial_cmp(&other.time)
    }
}

impl<ID> PartialEq for PatchSet<ID>
where
    ID: Debug + Clone + Eq,
{
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CommitKey {
    author: String,
    message: String,
    branch: Vec<u8>,
}

#[derive(Debug, Clone, Eq)]
struct Commit<ID>
where
    ID: Debug + Clone + Eq,
{
    path: OsString,
    #[allow(dead_code)]
    branch: Vec<u8>,
    id: Option<ID>,
    time: SystemTime,
}

impl<ID> Ord for Commit<ID>
where
    ID: Debug + Clone + Eq,
{
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.time.cmp(&other.time)
    }
}

impl<ID> PartialOrd for Commit<ID>
where
    ID: Debug + Clone + Eq,
{
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.time.partial_cmp(&other.time)
    }
}

impl<ID> PartialEq for Commit<ID>
where
    ID: Debug + Clone + Eq,
{
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("file does not exist: {0}")]
    FileNotFound(String),
}

impl Error {
    fn file_not_found(name: &OsStr) -> Self {
        Self::FileNotFound(name.to_string_lossy().into())
    }
}

#[cfg(test)]
mod tests {
    use std::{iter::FromIterator, str::FromStr};

    use super::*;

    #[test]
    fn test_detector() {
        let mut detector = Detector::new(Duration::from_secs(120));
        let branch = b"HEAD".to_vec();

        let author = String::from("author");
        let message = String::from("message in a bottle");

        detector.add_file_commit(
            path("foo"),
            Some(1),
            branch.clone(),
            author.clone(),
            message.clone(),
            timestamp(100),
        );

        detector.add_file_commit(
            path("bar"),
            Some(2),
            branch.clone(),
            author.clone(),
            message.clone(),
            timestamp(101),
        );

        // Delete foo on a new commit.
        detector.add_file_commit(
            path("foo"),
            None,
            branch.clone(),
            author.clone(),
            message.clone(),
            timestamp(300),
        );

        // Add a file on a separate commit.
        detector.add_file_commit(
            path("bar"),
            Some(3),
            branch.clone(),
            author.clone(),
            String::from("this is a different message"),
            timestamp(90),
        );

        detector.add_file_commit(
            path("foo"),
            Some(4),
            branch,
            author.clone(),
            message,
            timestamp(120),
        );

        let have: Vec<PatchSet<i32>> = detector.into_patchset_iter().collect();
        assert_eq!(have.len(), 3);
        assert_eq!(have[0].time, timestamp(90));
        assert_eq!(have[1].time, timestamp(120));
        assert_eq!(have[1].file_count(), 2);
        assert_eq!(have[2].time, timestamp(300));
    }

    #[test]
    fn duplicate_file_in_window_splits_instead_of_overwriting() {
        let mut detector = Detector::new(Duration::from_secs(120));
        let branch = b"HEAD".to_vec();
        let author = String::from("author");
        let message = String::from("msg");

        // Two commits to the same file well within the delta window: this
        // must produce two separate patchsets, not one with the second
        // commit silently winning.
        detector.add_file_commit(
            path("foo"),
            Some(1),
            branch.clone(),
            author.clone(),
            message.clone(),
            timestamp(0),
        );
        detector.add_file_commit(
            path("foo"),
            Some(2),
            branch,
            author,
            message,
            timestamp(10),
        );

        let have: Vec<PatchSet<i32>> = detector.into_patchset_iter().collect();
        assert_eq!(have.len(), 2);
        assert_eq!(have[0].file_content(&path("foo")).unwrap(), Some(&1));
        assert_eq!(have[1].file_content(&path("foo")).unwrap(), Some(&2));
    }

    fn path(s: &str) -> OsString {
        OsString::from_str(s).unwrap()
    }

    fn timestamp(ts: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(ts)
    }
}
