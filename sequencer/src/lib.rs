//! Orders changesets into a dense stream of SVN revnums (`order`, §4.6) and
//! plans the minimal set of copy operations needed to fill in each named
//! branch or tag (`fill`, §4.7).

pub mod error;
pub mod fill;
pub mod order;

pub use error::{Error, Result};
pub use fill::FillOp;
pub use order::{sequence, sequence_ref, SequencedChangeset};
