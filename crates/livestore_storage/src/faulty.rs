//! Fault-injecting wrapper backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared switch controlling a [`FaultyBackend`].
///
/// The switch stays with the test after the backend has been moved into a
/// store, so failures can be armed at a precise point.
#[derive(Debug, Clone, Default)]
pub struct FaultSwitch {
    fail_appends: Arc<AtomicBool>,
    fail_flushes: Arc<AtomicBool>,
    fail_truncates: Arc<AtomicBool>,
}

impl FaultSwitch {
    /// Makes every subsequent `append` fail until disarmed.
    pub fn fail_appends(&self, on: bool) {
        self.fail_appends.store(on, Ordering::SeqCst);
    }

    /// Makes every subsequent `flush` and `sync` fail until disarmed.
    pub fn fail_flushes(&self, on: bool) {
        self.fail_flushes.store(on, Ordering::SeqCst);
    }

    /// Makes every subsequent `truncate` fail until disarmed.
    pub fn fail_truncates(&self, on: bool) {
        self.fail_truncates.store(on, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, operation: &'static str) -> StorageResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StorageError::Injected { operation })
        } else {
            Ok(())
        }
    }
}

/// Wraps a backend and fails selected operations on demand.
pub struct FaultyBackend {
    inner: Box<dyn StorageBackend>,
    switch: FaultSwitch,
}

impl FaultyBackend {
    /// Wraps `inner`; returns the backend and the switch controlling it.
    #[must_use]
    pub fn new(inner: Box<dyn StorageBackend>) -> (Self, FaultSwitch) {
        let switch = FaultSwitch::default();
        (
            Self {
                inner,
                switch: switch.clone(),
            },
            switch,
        )
    }
}

impl StorageBackend for FaultyBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        FaultSwitch::check(&self.switch.fail_appends, "append")?;
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        FaultSwitch::check(&self.switch.fail_flushes, "flush")?;
        self.inner.flush()
    }

    fn sync(&mut self) -> StorageResult<()> {
        FaultSwitch::check(&self.switch.fail_flushes, "sync")?;
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        FaultSwitch::check(&self.switch.fail_truncates, "truncate")?;
        self.inner.truncate(new_size)
    }
}
