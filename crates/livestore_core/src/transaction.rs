//! Transactions over the live object graph.
//!
//! A transaction collects the entities that were created or modified while
//! it was bound, and either stores them in one atomic batch ([`commit`]) or
//! restores them from their last committed records ([`rollback`]).
//!
//! Transactions are created and retired by [`Storage`](crate::Storage); see
//! [`Lifecycle`] for who owns which transaction.
//!
//! [`commit`]: Transaction::commit
//! [`rollback`]: Transaction::rollback

use crate::context;
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::id::{ObjectId, TransactionId};
use crate::persist::Persistable;
use crate::save_state::SaveState;
use crate::store::{ObjectStore, WriteBatch};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Who governs a transaction's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Created by a read scope and shared by all concurrent readers. The last
    /// reader to leave finishes it.
    Shared,
    /// Created by a write scope. The outermost write scope commits or rolls
    /// it back; nested read scopes only borrow it.
    Exclusive,
}

/// A separately stored value that can be dropped from memory once the
/// transaction that loaded it ends.
pub trait Unload: Persistable {
    /// Whether the value has a committed record to reload from.
    fn is_stored(&self) -> bool;

    /// Drops the in-memory value. Returns whether anything was dropped.
    fn unload(&self) -> bool;
}

#[derive(Default)]
struct Pending {
    registered: Vec<Arc<dyn Entity>>,
    deferred: HashMap<ObjectId, Arc<dyn Unload>>,
}

/// A unit of work against the live object graph.
pub struct Transaction {
    id: TransactionId,
    lifecycle: Lifecycle,
    store: ObjectStore,
    batch: Option<Mutex<WriteBatch>>,
    writable: AtomicBool,
    finished: AtomicBool,
    rolled_back: AtomicBool,
    usages: AtomicUsize,
    pending: Mutex<Pending>,
}

impl Transaction {
    pub(crate) fn new(id: TransactionId, lifecycle: Lifecycle, store: ObjectStore) -> Self {
        let batch = match lifecycle {
            Lifecycle::Exclusive => Some(Mutex::new(store.begin_batch())),
            Lifecycle::Shared => None,
        };
        debug!(txid = %id, ?lifecycle, "transaction started");
        Self {
            id,
            lifecycle,
            store,
            batch,
            writable: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            rolled_back: AtomicBool::new(false),
            usages: AtomicUsize::new(0),
            pending: Mutex::new(Pending::default()),
        }
    }

    /// The transaction bound to the calling scope.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionAbsent`] outside any read or write scope.
    pub fn current() -> CoreResult<Arc<Self>> {
        context::current()
    }

    /// This transaction's id.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Who governs this transaction's lifetime.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// The store this transaction commits to.
    #[must_use]
    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    /// Whether mutations are currently allowed.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.writable.load(Ordering::SeqCst)
    }

    pub(crate) fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::SeqCst);
    }

    /// Whether the transaction has committed or rolled back.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Whether the transaction ended in a rollback rather than a commit.
    #[must_use]
    pub fn is_rolled_back(&self) -> bool {
        self.rolled_back.load(Ordering::SeqCst)
    }

    /// Number of read scopes currently sharing this transaction.
    #[must_use]
    pub fn usages(&self) -> usize {
        self.usages.load(Ordering::SeqCst)
    }

    pub(crate) fn inc_usages(&self) {
        self.usages.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns how many usages remain.
    pub(crate) fn dec_usages(&self) -> usize {
        let previous = self
            .usages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or_default();
        previous.saturating_sub(1)
    }

    /// Number of entities created or modified in this transaction.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.pending.lock().registered.len()
    }

    /// Checks that the transaction is open and writable.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionFinished`] or
    /// [`CoreError::TransactionReadOnly`].
    pub fn validate_for_write_access(&self) -> CoreResult<()> {
        if self.is_finished() {
            return Err(CoreError::TransactionFinished);
        }
        if !self.is_writable() {
            return Err(CoreError::TransactionReadOnly);
        }
        Ok(())
    }

    /// Checks that the transaction is open.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionFinished`].
    pub fn validate_for_read_access(&self) -> CoreResult<()> {
        if self.is_finished() {
            Err(CoreError::TransactionFinished)
        } else {
            Ok(())
        }
    }

    pub(crate) fn register(&self, entity: Arc<dyn Entity>) -> CoreResult<()> {
        self.validate_for_write_access()?;
        let mut pending = self.pending.lock();
        let state = entity.entity_state();
        match state.save_state() {
            SaveState::Registered | SaveState::Dirty => Ok(()),
            SaveState::Saved => Err(CoreError::invalid_state(format!(
                "entity {} is already persisted and cannot be registered",
                state.object_id()
            ))),
            SaveState::Fresh => {
                state.set_save_state(SaveState::Registered);
                pending.registered.push(entity);
                Ok(())
            }
        }
    }

    pub(crate) fn mark_dirty(&self, entity: Arc<dyn Entity>) -> CoreResult<()> {
        self.validate_for_write_access()?;
        let mut pending = self.pending.lock();
        let state = entity.entity_state();
        match state.save_state() {
            SaveState::Registered | SaveState::Dirty => Ok(()),
            SaveState::Fresh => Err(CoreError::invalid_state(format!(
                "entity {} was modified before being registered",
                state.object_id()
            ))),
            SaveState::Saved => {
                state.set_save_state(SaveState::Dirty);
                pending.registered.push(entity);
                Ok(())
            }
        }
    }

    /// Schedules `handle` to be unloaded when this transaction finishes,
    /// provided its value is stored by then.
    pub fn defer_unload(&self, handle: Arc<dyn Unload>) {
        self.pending
            .lock()
            .deferred
            .insert(handle.object_id(), handle);
    }

    pub(crate) fn set_root<P: Persistable>(&self, root: &Arc<P>) -> CoreResult<()> {
        self.validate_for_write_access()?;
        self.batch()?.lock().set_root(root)
    }

    fn batch(&self) -> CoreResult<&Mutex<WriteBatch>> {
        self.batch.as_ref().ok_or(CoreError::TransactionReadOnly)
    }

    /// Stores every dirty entity and its owned objects in one atomic batch,
    /// then finishes the transaction.
    ///
    /// Registered entities are not stored directly; they reach the log through
    /// the batch walk from whichever stored object owns them. On failure the
    /// transaction is rolled back and the commit error returned. Committing a
    /// finished transaction does nothing.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while encoding or writing the batch,
    /// or [`CoreError::TransactionReadOnly`] for a shared transaction.
    pub fn commit(&self) -> CoreResult<()> {
        if self.is_finished() {
            return Ok(());
        }
        if let Err(err) = self.persist() {
            error!(txid = %self.id, error = %err, "commit failed, rolling back");
            if let Err(rollback_err) = self.rollback() {
                error!(txid = %self.id, error = %rollback_err, "rollback after failed commit also failed");
            }
            self.finish();
            return Err(err);
        }
        debug!(txid = %self.id, "transaction committed");
        self.finish();
        Ok(())
    }

    fn persist(&self) -> CoreResult<()> {
        let batch = self.batch()?;
        let pending = self.pending.lock();
        let mut batch = batch.lock();
        for entity in &pending.registered {
            let state = entity.entity_state();
            match state.save_state() {
                SaveState::Fresh => {
                    return Err(CoreError::invalid_state(format!(
                        "entity {} reached commit unregistered",
                        state.object_id()
                    )))
                }
                SaveState::Registered => state.set_save_state(SaveState::Saved),
                SaveState::Saved => {}
                SaveState::Dirty => {
                    for owned in entity.additional_to_persist() {
                        batch.store(&owned)?;
                    }
                    batch.store(entity)?;
                    state.set_save_state(SaveState::Saved);
                }
            }
        }
        batch.commit()
    }

    /// Restores every entity of this transaction from its last committed
    /// record, then finishes the transaction.
    ///
    /// Every entity is attempted even after a failure. Rolling back a
    /// finished transaction does nothing.
    ///
    /// # Errors
    ///
    /// Returns the first reload error.
    pub fn rollback(&self) -> CoreResult<()> {
        if self.is_finished() {
            return Ok(());
        }
        let mut first_error = None;
        {
            let pending = self.pending.lock();
            for entity in &pending.registered {
                let restored = entity
                    .additional_to_persist()
                    .iter()
                    .try_for_each(|owned| self.store.reload_flat(owned.as_ref()))
                    .and_then(|()| self.store.reload_flat(entity.as_ref()));
                if let Err(err) = restored {
                    error!(txid = %self.id, entity = %entity.object_id(), error = %err, "reload during rollback failed");
                    first_error.get_or_insert(err);
                }
                entity.entity_state().set_save_state(SaveState::Saved);
            }
        }
        self.rolled_back.store(true, Ordering::SeqCst);
        debug!(txid = %self.id, "transaction rolled back");
        self.finish();
        first_error.map_or(Ok(()), Err)
    }

    /// Marks the transaction finished, unloads deferred values that are
    /// stored, and drops all pending state. Idempotent.
    pub(crate) fn finish(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut pending = self.pending.lock();
        for handle in pending.deferred.values() {
            if handle.is_stored() {
                handle.unload();
            }
        }
        pending.deferred.clear();
        pending.registered.clear();
        drop(pending);
        if let Some(batch) = &self.batch {
            batch.lock().clear();
        }
        debug!(txid = %self.id, "transaction finished");
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("lifecycle", &self.lifecycle)
            .field("writable", &self.is_writable())
            .field("finished", &self.is_finished())
            .field("rolled_back", &self.is_rolled_back())
            .field("usages", &self.usages())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::bind;
    use crate::testing::{Account, Bank};

    fn exclusive(store: &ObjectStore) -> Arc<Transaction> {
        let tx = Arc::new(Transaction::new(
            TransactionId(1),
            Lifecycle::Exclusive,
            store.clone(),
        ));
        tx.set_writable(true);
        tx
    }

    #[test]
    fn validation_follows_flags() {
        let store = ObjectStore::in_memory().unwrap();
        let tx = Transaction::new(TransactionId(1), Lifecycle::Shared, store);
        assert!(matches!(
            tx.validate_for_write_access(),
            Err(CoreError::TransactionReadOnly)
        ));
        tx.validate_for_read_access().unwrap();
        tx.finish();
        assert!(matches!(
            tx.validate_for_read_access(),
            Err(CoreError::TransactionFinished)
        ));
        assert!(matches!(
            tx.validate_for_write_access(),
            Err(CoreError::TransactionFinished)
        ));
    }

    #[test]
    fn usages_count_down_to_zero() {
        let store = ObjectStore::in_memory().unwrap();
        let tx = Transaction::new(TransactionId(1), Lifecycle::Shared, store);
        tx.inc_usages();
        tx.inc_usages();
        assert_eq!(tx.dec_usages(), 1);
        assert_eq!(tx.dec_usages(), 0);
        assert_eq!(tx.dec_usages(), 0);
    }

    #[test]
    fn creating_registers_once() {
        let store = ObjectStore::in_memory().unwrap();
        let tx = exclusive(&store);
        let _bound = bind(tx.clone());

        let account = Account::new("alice", 10).unwrap();
        assert_eq!(account.entity_state().save_state(), SaveState::Registered);
        let before = tx.registered_count();
        account.entity_state().register().unwrap();
        account.set_balance(20).unwrap();
        assert_eq!(tx.registered_count(), before);
        assert_eq!(account.entity_state().save_state(), SaveState::Registered);
    }

    #[test]
    fn saved_entity_cannot_be_registered_again() {
        let store = ObjectStore::in_memory().unwrap();
        let tx = exclusive(&store);
        let _bound = bind(tx.clone());
        let account = Account::new("bob", 1).unwrap();
        tx.commit().unwrap();
        assert_eq!(account.entity_state().save_state(), SaveState::Saved);

        let next = exclusive(&store);
        let _next = bind(next.clone());
        assert!(matches!(
            account.entity_state().register(),
            Err(CoreError::InvalidEntityState { .. })
        ));
    }

    #[test]
    fn commit_and_rollback_are_idempotent_once_finished() {
        let store = ObjectStore::in_memory().unwrap();
        let tx = exclusive(&store);
        tx.commit().unwrap();
        assert!(tx.is_finished());
        tx.commit().unwrap();
        tx.rollback().unwrap();
        assert!(!tx.is_rolled_back());

        let aborted = exclusive(&store);
        aborted.rollback().unwrap();
        aborted.commit().unwrap();
        assert!(aborted.is_rolled_back());
    }

    #[test]
    fn commit_stores_dirty_entities_and_owned_new_objects() {
        let store = ObjectStore::in_memory().unwrap();
        let tx = exclusive(&store);
        let _bound = bind(tx.clone());
        let bank = Bank::new().unwrap();
        tx.set_root(&bank).unwrap();
        tx.commit().unwrap();
        drop(_bound);

        let tx = exclusive(&store);
        let _bound = bind(tx.clone());
        let account = Account::new("carol", 5).unwrap();
        bank.accounts().unwrap().push(account.clone()).unwrap();
        tx.commit().unwrap();

        assert!(store.contains(account.object_id()));
        assert_eq!(account.entity_state().save_state(), SaveState::Saved);
        assert!(tx.registered_count() == 0);
    }

    #[test]
    fn rollback_restores_committed_fields() {
        let store = ObjectStore::in_memory().unwrap();
        let setup = exclusive(&store);
        let bound = bind(setup.clone());
        let bank = Bank::new().unwrap();
        let account = Account::new("dave", 100).unwrap();
        bank.accounts().unwrap().push(account.clone()).unwrap();
        setup.set_root(&bank).unwrap();
        setup.commit().unwrap();
        drop(bound);

        let tx = exclusive(&store);
        let _bound = bind(tx.clone());
        account.set_balance(1).unwrap();
        bank.accounts().unwrap().clear().unwrap();
        assert_eq!(account.entity_state().save_state(), SaveState::Dirty);
        tx.rollback().unwrap();

        let check = exclusive(&store);
        let _check = bind(check);
        assert_eq!(account.balance().unwrap(), 100);
        let accounts = bank.accounts().unwrap().to_vec().unwrap();
        assert_eq!(accounts.len(), 1);
        assert!(Arc::ptr_eq(&accounts[0], &account));
        assert_eq!(account.entity_state().save_state(), SaveState::Saved);
    }

    #[test]
    fn entity_calls_after_finish_are_rejected() {
        let store = ObjectStore::in_memory().unwrap();
        let tx = exclusive(&store);
        let _bound = bind(tx.clone());
        let account = Account::new("erin", 3).unwrap();
        tx.commit().unwrap();
        assert!(matches!(
            account.balance(),
            Err(CoreError::TransactionFinished)
        ));
        assert!(matches!(
            account.set_balance(4),
            Err(CoreError::TransactionFinished)
        ));
    }
}
