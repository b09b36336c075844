use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}: cannot find HEAD revision")]
    MissingHead(PathBuf),

    #[error("{path}: revision {revnum} not reachable from HEAD")]
    UnreachableRevision { path: PathBuf, revnum: String },

    #[error("external checkout of {path} at {revnum} failed: {status}")]
    ExternalCheckoutFailed {
        path: PathBuf,
        revnum: String,
        status: std::process::ExitStatus,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    CommaV(#[from] comma_v::Error),

    /// `rcs-ed`'s delta application and parsing errors are surfaced as
    /// `anyhow::Error`, matching how the teacher's own RCS tree-walking code
    /// (`discovery::handle_tree`) propagates them.
    #[error(transparent)]
    Delta(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
