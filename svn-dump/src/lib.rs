//! The Subversion dumpfile wire format (§4.8, §6): a writer for the v3
//! format, and the [`delegate::OutputDelegate`] trait the repository mirror
//! drives every mutation through.

pub mod delegate;
pub mod error;
pub mod node;
pub mod writer;

pub use delegate::{dumpfile::DumpfileDelegate, progress::ProgressDelegate, MultiDelegate, OutputDelegate};
pub use error::{Error, Result};
pub use node::{Node, NodeAction, NodeKind, Properties, RevProps};
pub use writer::DumpWriter;
