//! Materializes file contents by shelling out to `co -p`, CVS/RCS's own
//! checkout tool. Simpler and slower than [`crate::delta::DeltaReader`], but
//! useful as a cross-check and for repositories with RCS extensions the
//! delta applier doesn't understand.

use std::{path::Path, process::Command};

use crate::error::{Error, Result};
use crate::RevisionReader;

pub struct ExternalReader {
    co_binary: String,
}

impl Default for ExternalReader {
    fn default() -> Self {
        Self {
            co_binary: "co".to_string(),
        }
    }
}

impl ExternalReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the `co` binary looked up on `PATH`, for tests or
    /// environments that vendor a specific RCS toolchain.
    pub fn with_binary(co_binary: impl Into<String>) -> Self {
        Self {
            co_binary: co_binary.into(),
        }
    }
}

impl RevisionReader for ExternalReader {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn read(&mut self, _file_id: u32, path: &Path, revnum: &str) -> Result<Vec<u8>> {
        let output = Command::new(&self.co_binary)
            .arg("-p")
            .arg(format!("-r{}", revnum))
            .arg(path)
            .output()?;

        if !output.status.success() {
            return Err(Error::ExternalCheckoutFailed {
                path: path.to_path_buf(),
                revnum: revnum.to_string(),
                status: output.status,
            });
        }

        Ok(output.stdout)
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}
