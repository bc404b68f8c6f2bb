//! Reentrant read/write lock guarding the object graph.
//!
//! Built from a plain `parking_lot::RwLock<()>` plus per-thread hold counts.
//! A thread that already holds the lock in any mode re-enters reads without
//! touching the underlying lock, and re-enters writes if it holds the write
//! side. Upgrading from a read to a write is refused instead of deadlocking.

use crate::error::{CoreError, CoreResult};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;
use std::thread::{self, ThreadId};

#[derive(Debug, Default, Clone, Copy)]
struct Holds {
    reads: usize,
    writes: usize,
}

#[derive(Default)]
pub(crate) struct AccessLock {
    rw: RwLock<()>,
    holds: Mutex<HashMap<ThreadId, Holds>>,
}

impl AccessLock {
    fn held(&self) -> Holds {
        self.holds
            .lock()
            .get(&thread::current().id())
            .copied()
            .unwrap_or_default()
    }

    fn update(&self, change: impl FnOnce(&mut Holds)) {
        let me = thread::current().id();
        let mut holds = self.holds.lock();
        let entry = holds.entry(me).or_default();
        change(entry);
        let released = entry.reads == 0 && entry.writes == 0;
        if released {
            holds.remove(&me);
        }
    }

    /// Enters a read hold, blocking while another thread writes.
    pub(crate) fn read(&self) -> ReadHold<'_> {
        let held = self.held();
        let guard = (held.reads == 0 && held.writes == 0).then(|| self.rw.read());
        self.update(|h| h.reads += 1);
        ReadHold {
            lock: self,
            _guard: guard,
        }
    }

    /// Enters a write hold, blocking while any other thread holds the lock.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::WriteInsideReadForbidden`] when the calling
    /// thread holds a read hold, including one nested in its own write.
    pub(crate) fn write(&self) -> CoreResult<WriteHold<'_>> {
        let held = self.held();
        if held.reads > 0 {
            return Err(CoreError::WriteInsideReadForbidden);
        }
        let guard = (held.writes == 0).then(|| self.rw.write());
        self.update(|h| h.writes += 1);
        Ok(WriteHold {
            lock: self,
            depth: held.writes + 1,
            _guard: guard,
        })
    }

    /// Read holds of the calling thread.
    #[cfg(test)]
    pub(crate) fn read_depth(&self) -> usize {
        self.held().reads
    }

    /// Write holds of the calling thread.
    #[cfg(test)]
    pub(crate) fn write_depth(&self) -> usize {
        self.held().writes
    }
}

pub(crate) struct ReadHold<'a> {
    lock: &'a AccessLock,
    _guard: Option<RwLockReadGuard<'a, ()>>,
}

impl Drop for ReadHold<'_> {
    fn drop(&mut self) {
        self.lock.update(|h| h.reads = h.reads.saturating_sub(1));
    }
}

pub(crate) struct WriteHold<'a> {
    lock: &'a AccessLock,
    depth: usize,
    _guard: Option<RwLockWriteGuard<'a, ()>>,
}

impl WriteHold<'_> {
    /// Whether this is the thread's first write hold.
    pub(crate) fn is_outermost(&self) -> bool {
        self.depth == 1
    }
}

impl Drop for WriteHold<'_> {
    fn drop(&mut self) {
        self.lock.update(|h| h.writes = h.writes.saturating_sub(1));
    }
}
