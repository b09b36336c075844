//! Drives `svnadmin create`/`load` as a live-repository output delegate
//! (§4.8, §6), generalizing the teacher's `git fast-import` process manager.

pub mod error;
pub mod process;

pub use error::{Error, Result};
pub use process::{reverse_bdb_txn_nosync, Opt, SvnadminProcess};
