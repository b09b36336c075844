//! The three error kinds §7 of the design doc calls for (`Fatal`, `Internal`,
//! `Anomaly`), and the root `Error` enum that every pass's error folds into
//! via [`Classify::classify`] so `main` can match on [`Kind`] exactly once
//! instead of threading kind information through every `?`.

use thiserror::Error;

/// How the top-level driver should react to an error bubbling out of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// User-facing misconfiguration or input corruption. Printed as a single
    /// line; exit code 1.
    Fatal,
    /// An invariant the pipeline itself is supposed to maintain was violated.
    /// Printed with a "this is a bug" hint; exit code 1.
    Internal,
    /// Only produced by the verifier; counted rather than aborting on.
    Anomaly,
}

pub trait Classify {
    fn classify(&self) -> Kind;
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Usage(String),

    #[error("target path {0} already exists; pass --existing-svnrepos to load into it")]
    TargetExists(std::path::PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Store(#[from] artifact_store::Error),

    #[error(transparent)]
    ItemGraph(#[from] item_graph::Error),

    #[error(transparent)]
    SymbolStrategy(#[from] symbol_strategy::Error),

    #[error(transparent)]
    Sequencer(#[from] sequencer::Error),

    #[error(transparent)]
    RevisionReader(#[from] revision_reader::Error),

    #[error(transparent)]
    SvnDump(#[from] svn_dump::Error),

    #[error(transparent)]
    SvnProps(#[from] svn_props::Error),

    #[error(transparent)]
    SvnadminProcess(#[from] svnadmin_process::Error),

    #[error("pass manager: unknown pass {0:?}")]
    UnknownPass(String),

    #[error("mirror: {0}")]
    Mirror(String),

    #[error("changeset {0} reached the output pass with no handler for its variant")]
    UnhandledChangesetVariant(u64),

    #[error("output: {0}")]
    Output(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Classify for Error {
    fn classify(&self) -> Kind {
        match self {
            Error::Usage(_) | Error::TargetExists(_) | Error::Toml(_) => Kind::Fatal,
            Error::ItemGraph(item_graph::Error::Io { .. } | item_graph::Error::Parse { .. }) => {
                Kind::Fatal
            }
            Error::SymbolStrategy(symbol_strategy::Error::AmbiguousSymbol { .. })
            | Error::SymbolStrategy(symbol_strategy::Error::BadTransform { .. }) => Kind::Fatal,
            Error::RevisionReader(revision_reader::Error::ExternalCheckoutFailed { .. }) => {
                Kind::Fatal
            }
            Error::Io(_) => Kind::Fatal,
            Error::Mirror(_)
            | Error::UnhandledChangesetVariant(_)
            | Error::UnknownPass(_)
            | Error::Output(_) => Kind::Internal,
            Error::Store(_) => Kind::Internal,
            _ => Kind::Internal,
        }
    }
}
