use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: malformed RCS file: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: comma_v::Error,
    },

    #[error("{path}: revision {revision} is its own ancestor")]
    CyclicHistory { path: PathBuf, revision: String },

    #[error("{path}: symbol {symbol} names revision {revision}, which does not exist")]
    DanglingSymbol {
        path: PathBuf,
        symbol: String,
        revision: String,
    },

    #[error("{path}: head revision is missing from the delta table")]
    MissingHead { path: PathBuf },

    #[error("{path}: revision {revision} is referenced but has no delta")]
    MissingRevision { path: PathBuf, revision: String },

    #[error("file id {file_id}: branch-of-origin relation cycles back through item {item}")]
    CyclicBranchOrigin {
        file_id: crate::model::FileId,
        item: crate::model::ItemId,
    },

    #[error(transparent)]
    Store(#[from] artifact_store::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
