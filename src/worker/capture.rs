//! Capture of a worker's incidental standard output.
//!
//! File descriptor 1 is pointed at an anonymous temporary file while the
//! computation runs, so anything written to stdout (including output of
//! child processes and C code) ends up in the frame's output tail instead of
//! interleaving with other workers.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// An active stdout redirection.
pub struct StdoutCapture {
    file: File,
}

impl StdoutCapture {
    /// Redirect stdout into a fresh anonymous file.
    ///
    /// Whatever stdout referred to before is no longer reachable through
    /// fd 1; duplicate it first if it is still needed.
    pub fn begin() -> io::Result<Self> {
        io::stdout().flush()?;
        let file = tempfile::tempfile()?;
        nix::unistd::dup2_stdout(&file).map_err(io::Error::from)?;
        Ok(Self { file })
    }

    /// Flush pending output and return everything captured so far.
    ///
    /// Stdout stays redirected; later writes are discarded with the file.
    pub fn finish(mut self) -> io::Result<Vec<u8>> {
        io::stdout().flush()?;
        // fd 1 and `file` share one offset, so rewind before reading.
        self.file.seek(SeekFrom::Start(0))?;
        let mut captured = Vec::new();
        self.file.read_to_end(&mut captured)?;
        Ok(captured)
    }
}
