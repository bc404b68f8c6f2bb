//! Which transaction entity code runs under.
//!
//! Two pieces cooperate here. A [`TransactionSlot`] belongs to one
//! [`Storage`](crate::Storage) and holds the transaction currently shared by
//! its scopes; its own small mutex serializes get-or-create. The scope stack
//! is per thread: every read or write scope pushes its transaction for the
//! duration of the closure, and entity methods look at the top of the stack.
//! Code running outside any scope sees no transaction at all.

use crate::error::{CoreError, CoreResult};
use crate::transaction::Transaction;
use parking_lot::{Mutex, MutexGuard};
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

thread_local! {
    static SCOPES: RefCell<Vec<Arc<Transaction>>> = const { RefCell::new(Vec::new()) };
}

/// The transaction bound to the innermost scope on this thread.
///
/// # Errors
///
/// Returns [`CoreError::TransactionAbsent`] outside any read or write scope.
pub fn current() -> CoreResult<Arc<Transaction>> {
    try_current().ok_or(CoreError::TransactionAbsent)
}

/// Like [`current`], without the error.
#[must_use]
pub fn try_current() -> Option<Arc<Transaction>> {
    SCOPES.with(|scopes| scopes.borrow().last().cloned())
}

/// Binds `tx` to this thread until the returned guard drops.
pub(crate) fn bind(tx: Arc<Transaction>) -> ScopeBinding {
    SCOPES.with(|scopes| scopes.borrow_mut().push(tx));
    ScopeBinding {
        _thread_bound: PhantomData,
    }
}

/// Pops its transaction off the scope stack when dropped.
pub(crate) struct ScopeBinding {
    _thread_bound: PhantomData<*const ()>,
}

impl Drop for ScopeBinding {
    fn drop(&mut self) {
        let _ = SCOPES.try_with(|scopes| scopes.borrow_mut().pop());
    }
}

/// One storage instance's shared transaction.
#[derive(Default)]
pub(crate) struct TransactionSlot {
    current: Mutex<Option<Arc<Transaction>>>,
}

impl TransactionSlot {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Option<Arc<Transaction>>> {
        self.current.lock()
    }

    /// Empties the slot if it still holds `tx`.
    pub(crate) fn clear_if(slot: &mut Option<Arc<Transaction>>, tx: &Arc<Transaction>) {
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, tx)) {
            *slot = None;
        }
    }
}
