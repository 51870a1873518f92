//! An output stream that publishes files atomically.
//!
//! Three files are involved: the destination, a temporary sibling that
//! receives every write, and the lock file that arbitrates writers. When
//! the stream is opened the destination's lock is taken exclusively and
//! the temporary file is created next to it. On a committing close the
//! temporary file is renamed onto the destination before the lock is
//! released, so to every observer the destination is either absent or
//! fully written — never partial.
//!
//! The lock file also makes progress observable from the outside, see
//! [`SafeFileOutput::probe`].

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};
use tracing::{error, warn};

use crate::filelock::{self, LockMode, LockingFile};

/// Prefix used to create a temp file name in the destination's directory.
const TEMP_FILE_PREFIX: &str = "__SETL__.";

/// Suffix used to create a temp file name in the destination's directory.
const TEMP_FILE_SUFFIX: &str = ".pending";

/// Should temporary files be kept after a failure, for post-mortems?
/// Read once from the environment.
static KEEP_BAD_TEMP_FILE: LazyLock<bool> = LazyLock::new(|| {
    std::env::var("BINTEXT_KEEP_BAD_TEMP_FILE")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
});

/// Progress of writing a file, as observed from outside the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The file has been completely written.
    Complete,
    /// The file is missing and nothing is writing it.
    Missing,
    /// Writing of the file is in progress.
    InProgress,
    /// A previous attempt to write the file crashed before cleaning up.
    /// This should be a very rare observation.
    Failed,
}

/// A safe file output stream. See the [module docs](self) for the
/// protocol.
pub struct SafeFileOutput {
    /// The destination file.
    destination: PathBuf,
    /// The temporary file being built, until the stream is closed.
    temp: Option<NamedTempFile>,
    /// The lock on the destination, held for the life of the stream.
    lock: Arc<LockingFile>,
}

impl SafeFileOutput {
    /// Open a stream writing to `path`.
    ///
    /// Returns `None` when `overwrite` is false and the destination
    /// already exists — including when another writer publishes it while
    /// we wait for the lock. Blocks while another thread or process holds
    /// the destination's lock.
    pub fn open(path: impl AsRef<Path>, overwrite: bool) -> io::Result<Option<Self>> {
        let path = path.as_ref();
        if !overwrite && path.exists() {
            return Ok(None);
        }
        let mut stream = Self::create(path)?;
        if !overwrite && path.exists() {
            stream.close(false)?;
            return Ok(None);
        }
        Ok(Some(stream))
    }

    fn create(path: &Path) -> io::Result<Self> {
        let lock = filelock::locking_file(path)?;
        lock.lock(LockMode::Exclusive)?;

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let temp = match Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .suffix(TEMP_FILE_SUFFIX)
            .tempfile_in(&parent)
        {
            Ok(temp) => temp,
            Err(cause) => {
                if let Err(unlock_err) = lock.unlock() {
                    error!("failed to unlock after temp file creation failed: {unlock_err}");
                }
                return Err(cause);
            }
        };

        Ok(SafeFileOutput { destination: path.to_path_buf(), temp: Some(temp), lock })
    }

    /// The destination this stream publishes to.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Copy the whole of `reader` to this stream, returning the number of
    /// bytes transferred.
    pub fn transfer_from<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<u64> {
        let mut buf = [0u8; 4096];
        let mut total = 0u64;
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                return Ok(total);
            }
            self.write_all(&buf[..n])?;
            total += n as u64;
        }
    }

    /// Close this stream, optionally committing the data to the
    /// destination.
    ///
    /// With `commit`, the temporary file is renamed onto the destination;
    /// otherwise it is deleted (or retained when the keep-bad-temp-file
    /// switch is set). Closing an already-closed stream does nothing.
    pub fn close(&mut self, commit: bool) -> io::Result<()> {
        let Some(temp) = self.temp.take() else {
            return Ok(());
        };

        if commit {
            if let Err(persist_err) = temp.persist(&self.destination) {
                self.temp = Some(persist_err.file);
                return Err(self.abort_with(
                    &format!(
                        "Failed to rename temporary file to {}",
                        self.destination.display()
                    ),
                    persist_err.error,
                ));
            }
        } else {
            discard(temp);
        }

        self.release_lock();
        Ok(())
    }

    /// Fail the stream: clean up the temporary file, release the lock, and
    /// return an error wrapping `cause`.
    fn abort_with(&mut self, context: &str, cause: io::Error) -> io::Error {
        let err = io::Error::new(cause.kind(), format!("{context}: {cause}"));
        if let Some(temp) = self.temp.take() {
            discard(temp);
        }
        self.release_lock();
        warn!("error during safe file output: {err}");
        err
    }

    fn release_lock(&self) {
        if let Err(cause) = self.lock.unlock() {
            error!("failed to release lock on {}: {cause}", self.destination.display());
        }
    }

    /// Test a path which may currently be written by another thread or
    /// process.
    pub fn probe(path: impl AsRef<Path>) -> io::Result<Progress> {
        let path = path.as_ref();
        // if the file exists, it is complete
        if path.exists() {
            return Ok(Progress::Complete);
        }

        // with no lock file, nothing is writing: definitely missing
        let lock = filelock::locking_file(path)?;
        if !lock.lock_file_exists() {
            return Ok(Progress::Missing);
        }

        if !lock.try_lock(LockMode::Exclusive, Duration::from_millis(1))? {
            return Ok(Progress::InProgress);
        }
        // it was not locked, so the write finished or failed
        let progress = if path.exists() { Progress::Complete } else { Progress::Failed };
        if let Err(cause) = lock.unlock() {
            error!("failed to release probe lock: {cause}");
        }
        Ok(progress)
    }

    /// Wait for a file to be either complete or missing, blocking while
    /// another thread or process writes it. Returns whether the file is
    /// complete.
    pub fn wait_for(path: impl AsRef<Path>) -> io::Result<bool> {
        let path = path.as_ref();
        if path.exists() {
            return Ok(true);
        }

        let lock = filelock::locking_file(path)?;
        if !lock.lock_file_exists() {
            return Ok(false);
        }

        // whoever was writing has finished once a shared hold is granted
        lock.lock(LockMode::Shared)?;
        let exists = path.exists();
        if let Err(cause) = lock.unlock() {
            error!("failed to release wait lock: {cause}");
        }
        Ok(exists)
    }
}

fn discard(temp: NamedTempFile) {
    if *KEEP_BAD_TEMP_FILE {
        let path = temp.into_temp_path();
        match path.keep() {
            Ok(kept) => warn!("temporary file retained for post-mortem: {}", kept.display()),
            Err(cause) => warn!("failed to retain temporary file: {cause}"),
        }
    } else if let Err(cause) = temp.close() {
        warn!("failed to delete temporary file: {cause}");
    }
}

impl Write for SafeFileOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = match self.temp.as_mut() {
            None => return Err(closed_error()),
            Some(temp) => temp.as_file_mut().write(buf),
        };
        result.map_err(|cause| self.abort_with("Failed to write to temporary file", cause))
    }

    fn flush(&mut self) -> io::Result<()> {
        let result = match self.temp.as_mut() {
            None => return Err(closed_error()),
            Some(temp) => temp.as_file_mut().flush(),
        };
        result.map_err(|cause| self.abort_with("Failed to flush temporary file", cause))
    }
}

impl Drop for SafeFileOutput {
    fn drop(&mut self) {
        if self.temp.is_some() {
            if let Err(cause) = self.close(false) {
                error!("failed to discard output for {}: {cause}", self.destination.display());
            }
        }
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "Output stream is closed")
}
