use std::thread::{self, ThreadId};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

/// How a lock is held: shared with other readers, or exclusively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Any number of shared holders may coexist.
    Shared,
    /// An exclusive holder excludes every other holder.
    Exclusive,
}

#[derive(Default)]
struct GateState {
    /// The thread currently holding the gate exclusively, if any.
    writer: Option<ThreadId>,
    /// Reentrant exclusive holds by `writer`.
    write_holds: usize,
    /// Shared holds nested inside `writer`'s exclusive hold.
    writer_reads: usize,
    /// Shared holds when no writer is present.
    readers: usize,
}

/// A reentrant shared/exclusive gate for threads within the process.
///
/// A thread that holds the gate exclusively can acquire any number of
/// further holds of either mode. If no exclusive hold exists, any number
/// of threads can acquire shared holds, but no exclusive hold can be
/// taken. Releases are by mode token: while an exclusive hold exists all
/// holds belong to one thread, and otherwise all holds are shared, so
/// thread identity never matters for a shared release.
pub(crate) struct Gate {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl Gate {
    pub fn new() -> Self {
        Gate { state: Mutex::new(GateState::default()), cond: Condvar::new() }
    }

    /// Acquire a hold, waiting at most until `deadline` (forever if
    /// `None`). Returns whether the hold was acquired.
    pub fn try_acquire(&self, mode: LockMode, deadline: Option<Instant>) -> bool {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.writer == Some(me) {
            // reentrant under our own exclusive hold
            match mode {
                LockMode::Shared => state.writer_reads += 1,
                LockMode::Exclusive => state.write_holds += 1,
            }
            return true;
        }

        loop {
            let blocked = match mode {
                LockMode::Shared => state.writer.is_some(),
                LockMode::Exclusive => state.writer.is_some() || state.readers > 0,
            };
            if !blocked {
                match mode {
                    LockMode::Shared => state.readers += 1,
                    LockMode::Exclusive => {
                        state.writer = Some(me);
                        state.write_holds = 1;
                    }
                }
                return true;
            }
            match deadline {
                None => self.cond.wait(&mut state),
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return false;
                    }
                    let _ = self.cond.wait_until(&mut state, deadline);
                }
            }
        }
    }

    /// Release one hold of the given mode, taken by the current thread.
    pub fn release(&self, mode: LockMode) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        match mode {
            LockMode::Shared => {
                if state.writer == Some(me) && state.writer_reads > 0 {
                    state.writer_reads -= 1;
                } else {
                    debug_assert!(state.readers > 0, "shared release without a shared hold");
                    state.readers = state.readers.saturating_sub(1);
                    if state.readers == 0 {
                        self.cond.notify_all();
                    }
                }
            }
            LockMode::Exclusive => {
                debug_assert_eq!(state.writer, Some(me), "exclusive release by a non-owner");
                state.write_holds = state.write_holds.saturating_sub(1);
                if state.write_holds == 0 {
                    state.writer = None;
                    self.cond.notify_all();
                }
            }
        }
    }
}
