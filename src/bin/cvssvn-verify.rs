//! Tree-diff verifier (§7, §8): compares two already-exported directory
//! trees - typically a CVS checkout of one tag/branch/trunk and the matching
//! `svn export` of the converted repository - and reports every mismatch as
//! a recoverable anomaly (§7's third error kind) instead of aborting on the
//! first one. Exits non-zero only if at least one anomaly was found, so it
//! can be dropped straight into a CI job that converts a repository and then
//! verifies it.
//!
//! This binary is a separate compilation unit from `cvs-svn-import` (the
//! workspace has no library crate to share between the two `[[bin]]`
//! targets), so it is intentionally self-contained: it knows nothing about
//! `Context`, the pass manager, or the mirror, and only ever reads two
//! directories given to it on the command line.

use std::{
    collections::BTreeSet,
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use structopt::StructOpt;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "cvssvn-verify",
    about = "Diffs two exported directory trees and reports content-fidelity anomalies (§8 property 1)."
)]
struct Opt {
    /// The reference tree, e.g. a CVS checkout of a tag, branch, or HEAD.
    #[structopt(parse(from_os_str))]
    left: PathBuf,

    /// The tree to verify, e.g. `svn export` of the converted repository at
    /// the matching path.
    #[structopt(parse(from_os_str))]
    right: PathBuf,

    /// Glob (relative to either tree's root) to skip entirely, e.g.
    /// `CVS/**` or `.svn/**`. May be given more than once.
    #[structopt(long = "ignore")]
    ignore: Vec<String>,

    #[structopt(long, short, parse(from_occurrences))]
    verbose: u8,
}

#[derive(Debug, Error)]
enum Error {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid --ignore pattern {pattern:?}: {source}")]
    BadPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

type Result<T> = std::result::Result<T, Error>;

/// One diff between the two trees. Every variant is a §7 "recoverable
/// anomaly": logged and counted, never fatal.
#[derive(Debug)]
enum Anomaly {
    OnlyInLeft(PathBuf),
    OnlyInRight(PathBuf),
    KindMismatch(PathBuf),
    ContentMismatch(PathBuf),
    ExecutableMismatch { path: PathBuf, left: bool, right: bool },
}

impl std::fmt::Display for Anomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Anomaly::OnlyInLeft(p) => write!(f, "{}: present on the left only", p.display()),
            Anomaly::OnlyInRight(p) => write!(f, "{}: present on the right only", p.display()),
            Anomaly::KindMismatch(p) => {
                write!(f, "{}: file on one side, directory on the other", p.display())
            }
            Anomaly::ContentMismatch(p) => write!(f, "{}: content differs", p.display()),
            Anomaly::ExecutableMismatch { path, left, right } => write!(
                f,
                "{}: owner-executable bit differs (left={}, right={})",
                path.display(),
                left,
                right
            ),
        }
    }
}

fn main() {
    let opt = Opt::from_args();
    pretty_env_logger::formatted_builder()
        .filter_level(match opt.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        })
        .init();

    match run(&opt) {
        Ok(anomalies) => {
            for anomaly in &anomalies {
                log::warn!("{}", anomaly);
            }
            log::info!(
                "verified {} against {}: {} anomalies",
                opt.left.display(),
                opt.right.display(),
                anomalies.len()
            );
            std::process::exit(if anomalies.is_empty() { 0 } else { 1 });
        }
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn run(opt: &Opt) -> Result<Vec<Anomaly>> {
    let mut ignore = globset::GlobSetBuilder::new();
    for pattern in &opt.ignore {
        ignore.add(
            globset::Glob::new(pattern).map_err(|source| Error::BadPattern {
                pattern: pattern.clone(),
                source,
            })?,
        );
    }
    let ignore = ignore
        .build()
        .map_err(|source| Error::BadPattern { pattern: "<combined>".into(), source })?;

    let left_paths = relative_paths(&opt.left, &ignore)?;
    let right_paths = relative_paths(&opt.right, &ignore)?;

    let mut anomalies = Vec::new();
    for only_left in left_paths.difference(&right_paths) {
        anomalies.push(Anomaly::OnlyInLeft(only_left.clone()));
    }
    for only_right in right_paths.difference(&left_paths) {
        anomalies.push(Anomaly::OnlyInRight(only_right.clone()));
    }

    for rel in left_paths.intersection(&right_paths) {
        let left_path = opt.left.join(rel);
        let right_path = opt.right.join(rel);
        diff_entry(rel, &left_path, &right_path, &mut anomalies)?;
    }

    Ok(anomalies)
}

fn diff_entry(rel: &Path, left: &Path, right: &Path, anomalies: &mut Vec<Anomaly>) -> Result<()> {
    let left_meta = fs::symlink_metadata(left).map_err(|source| Error::Io { path: left.to_path_buf(), source })?;
    let right_meta = fs::symlink_metadata(right).map_err(|source| Error::Io { path: right.to_path_buf(), source })?;

    if left_meta.is_dir() != right_meta.is_dir() {
        anomalies.push(Anomaly::KindMismatch(rel.to_path_buf()));
        return Ok(());
    }
    if left_meta.is_dir() {
        return Ok(());
    }

    let left_content = fs::read(left).map_err(|source| Error::Io { path: left.to_path_buf(), source })?;
    let right_content = fs::read(right).map_err(|source| Error::Io { path: right.to_path_buf(), source })?;
    if left_content != right_content {
        anomalies.push(Anomaly::ContentMismatch(rel.to_path_buf()));
    }

    // Content fidelity (§8 property 1) only cares about the owner-executable
    // bit; group/other bits and full mode comparisons are intentionally
    // ignored since CVS/RCS carries no notion of them.
    let left_exec = left_meta.permissions().mode() & 0o100 != 0;
    let right_exec = right_meta.permissions().mode() & 0o100 != 0;
    if left_exec != right_exec {
        anomalies.push(Anomaly::ExecutableMismatch {
            path: rel.to_path_buf(),
            left: left_exec,
            right: right_exec,
        });
    }

    Ok(())
}

fn relative_paths(root: &Path, ignore: &globset::GlobSet) -> Result<BTreeSet<PathBuf>> {
    let mut paths = BTreeSet::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| Error::Io {
            path: e.path().unwrap_or(root).to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        })?;
        if entry.path() == root {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .expect("walkdir yields paths under root")
            .to_path_buf();
        if ignore.is_match(&rel) {
            continue;
        }
        paths.insert(rel);
    }
    Ok(paths)
}
