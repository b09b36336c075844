use thiserror::Error;

/// Errors raised by the artifact store.
///
/// Most variants here are programmer errors: a pass that reads or writes an
/// artifact it did not declare up front, or a schema version mismatch caused
/// by resuming a pipeline against artifacts written by a different build.
/// Both are reported rather than panicking so that the top-level driver can
/// classify them into the `Internal` error kind described in the project
/// spec.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Bincode(#[from] bincode::Error),

    #[error("artifact {pass}/{name} was not declared as a write by pass {pass}")]
    UndeclaredWrite { pass: String, name: String },

    #[error("pass {pass} did not declare a read of artifact {producer}/{name}")]
    UndeclaredRead {
        pass: String,
        producer: String,
        name: String,
    },

    #[error("artifact {pass}/{name} has schema version {found}, expected {expected}; refusing to reuse it")]
    SchemaMismatch {
        pass: String,
        name: String,
        expected: u32,
        found: u32,
    },

    #[error("artifact {pass}/{name} has bad magic bytes; it is not an artifact-store file")]
    BadMagic { pass: String, name: String },

    #[error("artifact {pass}/{name} was declared indexed but no index lookup was requested")]
    NotIndexed { pass: String, name: String },

    #[error("pass {0} appears more than once in the pipeline plan")]
    DuplicatePass(String),

    #[error("pass {reader} reads {producer}/{name} before it is written by any earlier pass")]
    ReadBeforeWrite {
        reader: String,
        producer: String,
        name: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
