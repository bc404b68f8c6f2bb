//! Read and write scopes over a store's root object.
//!
//! [`Storage`] is the only way application code reaches the object graph.
//! Every closure passed to [`Storage::read_return`] or
//! [`Storage::write_return`] runs under the access lock with a transaction
//! bound to the calling thread:
//!
//! - reads share one transaction across all concurrent readers and may not
//!   mutate anything;
//! - writes are exclusive, reentrant, and commit when the outermost write
//!   scope returns `Ok`. An `Err` or a panic rolls everything back;
//! - asking for a write from inside a read fails with
//!   [`CoreError::WriteInsideReadForbidden`].

use crate::config::StoreConfig;
use crate::context::{self, TransactionSlot};
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::id::TransactionId;
use crate::lock::AccessLock;
use crate::persist::Load;
use crate::store::ObjectStore;
use crate::transaction::{Lifecycle, Transaction};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// The root aggregate of a store.
pub trait Root: Entity + Load {
    /// Builds the initial root for an empty store. Runs inside a write
    /// transaction, so it may create entities freely.
    ///
    /// # Errors
    ///
    /// Returns an error if an entity cannot be created.
    fn create() -> CoreResult<Arc<Self>>;
}

/// Transactional access to the object graph under root `R`.
pub struct Storage<R: Root> {
    store: ObjectStore,
    root: Arc<R>,
    lock: AccessLock,
    slot: TransactionSlot,
    next_txid: AtomicU64,
}

impl<R: Root> Storage<R> {
    /// Opens access over `store`, creating and committing a root when the
    /// store has none yet, or loading the existing one.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be created, committed, or loaded.
    pub fn open(store: ObjectStore) -> CoreResult<Self> {
        let next_txid = AtomicU64::new(1);
        let root = match store.load_root::<R>()? {
            Some(root) => {
                info!(root = %root.object_id(), "loaded existing root");
                root
            }
            None => Self::bootstrap(&store, &next_txid)?,
        };
        Ok(Self {
            store,
            root,
            lock: AccessLock::default(),
            slot: TransactionSlot::default(),
            next_txid,
        })
    }

    /// Opens the store directory at `path` and then [`open`](Self::open)s it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreLocked`] if the directory is in use, or any
    /// error from opening the store or its root.
    pub fn open_path(path: &Path, config: &StoreConfig) -> CoreResult<Self> {
        Self::open(ObjectStore::open(path, config)?)
    }

    fn bootstrap(store: &ObjectStore, next_txid: &AtomicU64) -> CoreResult<Arc<R>> {
        let tx = Arc::new(Transaction::new(
            TransactionId(next_txid.fetch_add(1, Ordering::SeqCst)),
            Lifecycle::Exclusive,
            store.clone(),
        ));
        tx.set_writable(true);
        let _binding = context::bind(tx.clone());

        let created = R::create().and_then(|root| {
            tx.set_root(&root)?;
            Ok(root)
        });
        match created {
            Ok(root) => {
                tx.commit()?;
                info!(root = %root.object_id(), "created new root");
                Ok(root)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    error!(error = %rollback_err, "rollback of root creation failed");
                }
                Err(err)
            }
        }
    }

    /// The underlying object store.
    #[must_use]
    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    fn new_transaction(&self, lifecycle: Lifecycle) -> Arc<Transaction> {
        let id = TransactionId(self.next_txid.fetch_add(1, Ordering::SeqCst));
        Arc::new(Transaction::new(id, lifecycle, self.store.clone()))
    }

    /// Runs `reader` against the root under shared access.
    ///
    /// # Errors
    ///
    /// Returns whatever `reader` returns.
    pub fn read<E, F>(&self, reader: F) -> Result<(), E>
    where
        F: FnOnce(&R) -> Result<(), E>,
        E: From<CoreError>,
    {
        self.read_return(reader)
    }

    /// Runs `reader` against the root under shared access and returns its
    /// result.
    ///
    /// Concurrent readers share one transaction. A read nested in a write on
    /// the same thread borrows the write transaction, read-only for the
    /// duration of the closure.
    ///
    /// # Errors
    ///
    /// Returns whatever `reader` returns.
    pub fn read_return<T, E, F>(&self, reader: F) -> Result<T, E>
    where
        F: FnOnce(&R) -> Result<T, E>,
        E: From<CoreError>,
    {
        let _hold = self.lock.read();
        let scope = self.enter_read();
        let _binding = context::bind(scope.tx.clone());
        reader(&self.root)
    }

    fn enter_read(&self) -> ReadScope<'_> {
        let mut slot = self.slot.lock();
        let tx = match slot.as_ref() {
            Some(tx) => tx.clone(),
            None => {
                let tx = self.new_transaction(Lifecycle::Shared);
                *slot = Some(tx.clone());
                tx
            }
        };
        let previously_writable = tx.is_writable();
        tx.set_writable(false);
        tx.inc_usages();
        ReadScope {
            slot: &self.slot,
            tx,
            previously_writable,
        }
    }

    /// Runs `writer` against the root under exclusive access.
    ///
    /// # Errors
    ///
    /// Returns whatever `writer` returns, or the commit error.
    pub fn write<E, F>(&self, writer: F) -> Result<(), E>
    where
        F: FnOnce(&R, &Transaction) -> Result<(), E>,
        E: From<CoreError>,
    {
        self.write_return(writer)
    }

    /// Runs `writer` against the root under exclusive access and returns its
    /// result.
    ///
    /// The outermost write scope commits when `writer` returns `Ok`. Nested
    /// write scopes join the outer transaction. When any scope returns `Err`
    /// the whole transaction is rolled back, the error is returned unchanged,
    /// and further use of that transaction fails with
    /// [`CoreError::TransactionFinished`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::WriteInsideReadForbidden`] when called inside a
    /// read scope, the error returned by `writer`, or the commit error. An
    /// outermost scope whose transaction was rolled back by a failed nested
    /// scope returns [`CoreError::TransactionFinished`] even if `writer`
    /// returned `Ok`.
    pub fn write_return<T, E, F>(&self, writer: F) -> Result<T, E>
    where
        F: FnOnce(&R, &Transaction) -> Result<T, E>,
        E: From<CoreError>,
    {
        let hold = self.lock.write()?;
        let tx = self.enter_write()?;
        let scope = WriteScope {
            slot: &self.slot,
            tx: tx.clone(),
            outermost: hold.is_outermost(),
        };
        let _binding = context::bind(tx.clone());

        match writer(&self.root, &tx) {
            Ok(value) => {
                if scope.outermost {
                    // A nested scope failed and its error was swallowed.
                    if tx.is_rolled_back() {
                        error!(
                            txid = %tx.id(),
                            "write scope returned Ok after its transaction rolled back"
                        );
                        return Err(CoreError::TransactionFinished.into());
                    }
                    tx.commit()?;
                }
                Ok(value)
            }
            Err(err) => {
                error!(txid = %tx.id(), "write scope failed, rolling back");
                if let Err(rollback_err) = tx.rollback() {
                    error!(txid = %tx.id(), error = %rollback_err, "automatic rollback failed");
                }
                Err(err)
            }
        }
    }

    fn enter_write(&self) -> CoreResult<Arc<Transaction>> {
        let mut slot = self.slot.lock();
        let tx = match slot.as_ref() {
            Some(tx) if tx.lifecycle() == Lifecycle::Exclusive => tx.clone(),
            Some(tx) => {
                return Err(CoreError::invalid_operation(format!(
                    "shared {} still bound under the write lock",
                    tx.id()
                )))
            }
            None => {
                let tx = self.new_transaction(Lifecycle::Exclusive);
                *slot = Some(tx.clone());
                tx
            }
        };
        tx.set_writable(true);
        Ok(tx)
    }

    /// Waits for running scopes to finish and syncs the object log.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::WriteInsideReadForbidden`] when called from a
    /// read scope, or the sync error.
    pub fn shutdown(&self) -> CoreResult<()> {
        let _hold = self.lock.write()?;
        self.store.sync()?;
        info!("storage shut down");
        Ok(())
    }
}

struct ReadScope<'a> {
    slot: &'a TransactionSlot,
    tx: Arc<Transaction>,
    previously_writable: bool,
}

impl Drop for ReadScope<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        self.tx.set_writable(self.previously_writable);
        let remaining = self.tx.dec_usages();
        if remaining == 0 && self.tx.lifecycle() == Lifecycle::Shared {
            self.tx.finish();
            TransactionSlot::clear_if(&mut slot, &self.tx);
        }
    }
}

struct WriteScope<'a> {
    slot: &'a TransactionSlot,
    tx: Arc<Transaction>,
    outermost: bool,
}

impl Drop for WriteScope<'_> {
    fn drop(&mut self) {
        if !self.outermost {
            return;
        }
        // Only an unwinding writer leaves the transaction open here.
        if !self.tx.is_finished() {
            warn!(txid = %self.tx.id(), "write scope unwound, rolling back");
            if let Err(err) = self.tx.rollback() {
                error!(txid = %self.tx.id(), error = %err, "rollback during unwind failed");
            }
        }
        TransactionSlot::clear_if(&mut self.slot.lock(), &self.tx);
    }
}
