//! Groups validated CVS items into commit-sized [`changeset::Changeset`]s
//! (§4.5): same-author/message/branch file commits within a sliding time
//! window become one [`changeset::RevisionChangeset`], vendor-branch heads
//! mirror onto trunk as [`changeset::PostCommitChangeset`]s, and classified
//! symbols become [`changeset::SymbolChangeset`]s.
//!
//! [`detector::Detector`] is the grouping primitive; [`grouper`] is the pass
//! that wires it to the artifact store.

pub mod changeset;
pub mod detector;
pub mod grouper;

pub use changeset::{
    Changeset, ChangesetId, InitialChangeset, ItemRef, PostCommitChangeset, PostCommitOp,
    RevisionChangeset, SymbolChangeset,
};
pub use detector::{Detector, PatchSet};
pub use grouper::{changesets_ref, decl, run, DEFAULT_WINDOW};
