//! Named, pass-scoped artifact files with typed records.
//!
//! Each pass in the conversion pipeline declares, up front, which artifacts it
//! writes and which artifacts (written by earlier passes) it reads. This
//! crate enforces that declaration: reading an undeclared artifact or writing
//! an undeclared one is a programmer error, not silently permitted. Artifacts
//! are homogeneous streams of `bincode`-encoded, length-prefixed records
//! behind a small versioned header, stored as `<pass>-<artifact>.dat` under a
//! configured directory, with an optional sidecar `.idx` file for artifacts
//! that need random access by a primary key.

mod error;
mod index;
mod record;
mod store;

pub use error::{Error, Result};
pub use index::Index;
pub use record::{RecordReader, RecordWriter};
pub use store::{artifact_path, ArtifactRef, Kind, PassDecl, Plan, Store, WriteDecl};
