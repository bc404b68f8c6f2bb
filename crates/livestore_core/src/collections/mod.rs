//! Transactional containers.
//!
//! Each container is an entity whose elements live in a separately stored
//! [`Backing`]. Reads check that a transaction is bound; every mutating call
//! marks the container dirty first, so committing stores the elements and
//! rolling back restores them. Cursors handed out by a container mark it
//! dirty when they change it.

mod list;
mod map;
mod set;

pub use list::{ListCursor, TxList};
pub use map::{MapCursor, TxMap};
pub use set::{SetCursor, TxSet};

use crate::backing::Backing;
use crate::entity::EntityState;
use crate::error::CoreResult;
use crate::persist::{Contents, Persistable};
use crate::record::{RecordReader, RecordWriter};
use std::sync::Arc;

/// Tracking state and element storage shared by all containers.
struct Tracked<C> {
    state: EntityState,
    items: Arc<Backing<C>>,
}

impl<C: Contents> Tracked<C> {
    fn new(state: EntityState, contents: C) -> Self {
        Self {
            state,
            items: Backing::new(contents),
        }
    }

    fn read<R>(&self, reader: impl FnOnce(&C) -> R) -> CoreResult<R> {
        self.state.require_read_access()?;
        Ok(reader(&self.items.read()))
    }

    fn modify<R>(&self, change: impl FnOnce(&mut C) -> R) -> CoreResult<R> {
        self.state.mark_dirty()?;
        Ok(change(&mut self.items.write()))
    }

    fn additional(&self) -> Vec<Arc<dyn Persistable>> {
        vec![self.items.clone()]
    }

    fn write_flat(&self, record: &mut RecordWriter) {
        record.reference(&self.items);
    }

    fn reload_flat(&self, record: &mut RecordReader<'_>) -> CoreResult<()> {
        record.expect_reference(self.items.object_id())
    }
}
