use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use fs2::FileExt;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info};

use super::gate::Gate;
pub use super::gate::LockMode;

/// Errors raised by the file-lock subsystem.
#[derive(Debug, Error)]
pub enum LockError {
    /// An I/O failure while opening, locking, or releasing the lock file.
    #[error("file lock operation failed")]
    Io(#[from] io::Error),
    /// `unlock` was called with no outstanding lock.
    #[error("file is not locked")]
    NotLocked,
}

impl From<LockError> for io::Error {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Io(cause) => cause,
            LockError::NotLocked => io::Error::other(err),
        }
    }
}

struct OsState {
    /// Open handle on the lock file while the OS lock is held.
    file: Option<File>,
    /// One token per outstanding acquisition, most recent last.
    tokens: Vec<LockMode>,
}

/// A file which acts as a lock for another file, locking it against other
/// threads in this process and against other processes on the host.
///
/// Two mechanisms compose. A reentrant shared/exclusive gate serialises
/// threads within the process, and a single OS-level lock on the `.lock`
/// file arbitrates between processes. The OS lock is held only while at
/// least one in-process acquisition is outstanding; the token stack
/// records the mode of each acquisition so `unlock` releases the right
/// side of the gate.
///
/// Instances are obtained from [`locking_file`](super::locking_file),
/// which guarantees one instance per canonical path.
pub struct LockingFile {
    /// The protected file.
    protected: PathBuf,
    /// The lock file.
    lock_path: PathBuf,
    /// Display form of the protected path, written into the lock file.
    uri: String,
    gate: Gate,
    /// Guards the OS lock state and the token stack. The gate is always
    /// acquired before this, never the other way around.
    inner: Mutex<OsState>,
}

impl LockingFile {
    pub(super) fn new(protected: PathBuf) -> Self {
        let lock_path = if protected.is_dir() {
            protected.join(".lock")
        } else {
            let mut name = protected.file_name().map(|n| n.to_os_string()).unwrap_or_default();
            name.push(".lock");
            protected.with_file_name(name)
        };
        let uri = format!("file://{}", protected.display());
        LockingFile {
            protected,
            lock_path,
            uri,
            gate: Gate::new(),
            inner: Mutex::new(OsState { file: None, tokens: Vec::new() }),
        }
    }

    /// The path protected by this locking file.
    pub fn protected_path(&self) -> &Path {
        &self.protected
    }

    /// The absolute path of the lock file itself.
    pub fn path(&self) -> &Path {
        &self.lock_path
    }

    /// Check whether the lock file currently exists. If it does, some
    /// lock is probably held.
    pub fn lock_file_exists(&self) -> bool {
        self.lock_path.exists()
    }

    /// Lock the file, blocking until the lock is acquired.
    pub fn lock(self: &Arc<Self>, mode: LockMode) -> Result<(), LockError> {
        self.lock_with(mode, None)?;
        Ok(())
    }

    /// Attempt to lock the file within `timeout`.
    ///
    /// A zero timeout makes a single attempt; otherwise the OS lock is
    /// polled until the deadline passes. Returns whether the lock was
    /// acquired. When the in-process gate is won but the OS lock cannot be
    /// obtained in time, the gate hold is released before returning
    /// `false`.
    pub fn try_lock(self: &Arc<Self>, mode: LockMode, timeout: Duration) -> Result<bool, LockError> {
        self.lock_with(mode, Some(timeout))
    }

    fn lock_with(self: &Arc<Self>, mode: LockMode, timeout: Option<Duration>) -> Result<bool, LockError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        if !self.gate.try_acquire(mode, deadline) {
            return Ok(false);
        }

        // the gate protects the OS lock, so we can manipulate it now
        let mut state = self.inner.lock();
        if state.file.is_none() {
            match self.lock_os(&mut state, mode, deadline, timeout) {
                Ok(true) => {}
                Ok(false) => {
                    drop(state);
                    self.gate.release(mode);
                    return Ok(false);
                }
                Err(cause) => {
                    drop(state);
                    self.gate.release(mode);
                    return Err(cause.into());
                }
            }
        }
        state.tokens.push(mode);
        Ok(true)
    }

    /// Acquire the OS lock with the requested mode. Re-opening the lock
    /// file on every acquisition is what allows the effective mode to
    /// change between uses, and gives other processes a turn at the file.
    fn lock_os(
        self: &Arc<Self>,
        state: &mut OsState,
        mode: LockMode,
        deadline: Option<Instant>,
        timeout: Option<Duration>,
    ) -> io::Result<bool> {
        let file =
            OpenOptions::new().read(true).write(true).create(true).truncate(false).open(&self.lock_path)?;

        match deadline {
            None => match mode {
                LockMode::Shared => file.lock_shared()?,
                LockMode::Exclusive => file.lock_exclusive()?,
            },
            Some(deadline) => {
                // the holder may be another process, so briefly sleep and
                // spin back rather than wait on anything in-process
                let pause = timeout.unwrap_or_default() / 10;
                loop {
                    let attempt = match mode {
                        LockMode::Shared => FileExt::try_lock_shared(&file),
                        LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
                    };
                    match attempt {
                        Ok(()) => break,
                        Err(cause) if cause.kind() == io::ErrorKind::WouldBlock => {
                            if Instant::now() > deadline {
                                return Ok(false);
                            }
                            thread::sleep(pause);
                        }
                        Err(cause) => return Err(cause),
                    }
                }
            }
        }

        // pin this instance so the registry cannot drop it while locked
        super::pin(self);
        self.write_marker(&file);
        state.file = Some(file);
        Ok(true)
    }

    /// Write the human-readable marker payload, if the file is empty.
    fn write_marker(&self, file: &File) {
        let write = |mut file: &File| -> io::Result<()> {
            if file.metadata()?.len() != 0 {
                return Ok(());
            }
            let text = format!(
                "DO NOT DELETE OR RENAME THIS FILE\n\n\
                 This file is used to prevent concurrent updates of:\n\
                 {}\n\n\
                 Created at : {}\n",
                self.uri,
                iso8601(SystemTime::now())
            );
            file.seek(SeekFrom::Start(0))?;
            file.write_all(text.as_bytes())?;
            file.sync_data()
        };
        if write(file).is_err() {
            // as long as the file exists, it does not matter if it is empty
            info!("unable to write contents to lock file {}", self.uri);
        }
    }

    /// Unlock the file.
    ///
    /// Pops the most recent acquisition token; when the last token is
    /// popped the OS lock is released and the lock file deleted, unless
    /// another process holds a lock on it.
    pub fn unlock(self: &Arc<Self>) -> Result<(), LockError> {
        let mode;
        {
            let mut state = self.inner.lock();
            if state.file.is_none() {
                return Err(LockError::NotLocked);
            }
            mode = match state.tokens.pop() {
                Some(mode) => mode,
                None => return Err(LockError::NotLocked),
            };
            if state.tokens.is_empty() {
                self.close(&mut state);
            }
        }
        self.gate.release(mode);
        Ok(())
    }

    /// Release the OS lock, delete the lock file when no other process
    /// holds it, close the handle and unpin this instance. Failures here
    /// are logged, never raised.
    fn close(&self, state: &mut OsState) {
        if let Some(file) = state.file.take() {
            if let Err(cause) = FileExt::unlock(&file) {
                error!("I/O failure when releasing lock: {cause}");
            }

            // delete probe: only remove the file if no other process is
            // using it right now
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    match fs::remove_file(&self.lock_path) {
                        Ok(()) => debug!("lock file {} deleted", self.uri),
                        Err(cause) if cause.kind() == io::ErrorKind::NotFound => {
                            debug!("lock file {} was already deleted", self.uri);
                        }
                        Err(cause) => {
                            error!("I/O failure when deleting lock file: {cause}");
                        }
                    }
                    if let Err(cause) = FileExt::unlock(&file) {
                        error!("I/O failure when releasing delete probe: {cause}");
                    }
                }
                Err(cause) if cause.kind() == io::ErrorKind::WouldBlock => {
                    debug!("lock file not deleted, as locked by another process");
                }
                Err(cause) => error!("I/O failure when probing lock file: {cause}"),
            }
        }
        super::unpin(self);
    }
}

impl fmt::Display for LockingFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockFile[{} protecting {}]", self.lock_path.display(), self.uri)
    }
}

impl Drop for LockingFile {
    fn drop(&mut self) {
        // a pinned instance cannot be dropped while OS-locked, so this
        // only tidies up after a leaked lock
        let state = self.inner.get_mut();
        if let Some(file) = state.file.take() {
            let _ = FileExt::unlock(&file);
        }
    }
}

/// Format a timestamp as an ISO-8601 UTC instant, e.g.
/// `2024-07-01T12:30:45Z`.
fn iso8601(time: SystemTime) -> String {
    let secs = match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => duration.as_secs() as i64,
        Err(_) => 0,
    };
    let days = secs.div_euclid(86_400);
    let tod = secs.rem_euclid(86_400);

    // civil-from-days (Howard Hinnant's algorithm)
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let year = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if month <= 2 { year + 1 } else { year };

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        month,
        day,
        tod / 3600,
        (tod / 60) % 60,
        tod % 60
    )
}
