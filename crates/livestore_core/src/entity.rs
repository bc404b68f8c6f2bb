//! The entity capability.
//!
//! An entity is a persistable object whose changes are tracked by the current
//! transaction. Entity types embed an [`EntityState`] and implement
//! [`Entity`]; their accessors call [`EntityState::require_read_access`] and
//! their mutators call [`EntityState::mark_dirty`] before touching anything.
//!
//! New entities are built with [`create`], which registers them with the
//! bound transaction. Loaded entities are built with [`restore`] inside
//! [`Load::load`](crate::Load::load) and start out [`SaveState::Saved`].

use crate::context;
use crate::error::{CoreError, CoreResult};
use crate::id::ObjectId;
use crate::persist::Persistable;
use crate::save_state::SaveState;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

/// A persistable object with transactional change tracking.
pub trait Entity: Persistable {
    /// The embedded tracking state.
    fn entity_state(&self) -> &EntityState;

    /// Owned objects that must be stored together with this entity whenever
    /// it is dirty, and reloaded with it on rollback.
    fn additional_to_persist(&self) -> Vec<Arc<dyn Persistable>> {
        Vec::new()
    }
}

/// Identity and save-state of one entity, plus a weak handle back to it.
pub struct EntityState {
    id: ObjectId,
    save_state: Mutex<SaveState>,
    this: Weak<dyn Entity>,
}

impl EntityState {
    fn new(id: ObjectId, save_state: SaveState, this: Weak<dyn Entity>) -> Self {
        Self {
            id,
            save_state: Mutex::new(save_state),
            this,
        }
    }

    /// The entity's object id.
    #[must_use]
    pub fn object_id(&self) -> ObjectId {
        self.id
    }

    /// Current save-state.
    #[must_use]
    pub fn save_state(&self) -> SaveState {
        *self.save_state.lock()
    }

    pub(crate) fn set_save_state(&self, state: SaveState) {
        *self.save_state.lock() = state;
    }

    fn entity(&self) -> CoreResult<Arc<dyn Entity>> {
        self.this
            .upgrade()
            .ok_or_else(|| CoreError::invalid_state(format!("entity {} is being dropped", self.id)))
    }

    /// Registers the entity with the bound transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionAbsent`], [`CoreError::TransactionFinished`]
    /// or [`CoreError::TransactionReadOnly`] when no writable transaction is
    /// bound, and [`CoreError::InvalidEntityState`] for an entity that is
    /// already saved.
    pub fn register(&self) -> CoreResult<()> {
        context::current()?.register(self.entity()?)
    }

    /// Marks the entity as modified in the bound transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionAbsent`], [`CoreError::TransactionFinished`]
    /// or [`CoreError::TransactionReadOnly`] when no writable transaction is
    /// bound, and [`CoreError::InvalidEntityState`] for a fresh entity.
    pub fn mark_dirty(&self) -> CoreResult<()> {
        context::current()?.mark_dirty(self.entity()?)
    }

    /// Checks that a live transaction is bound.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionAbsent`] or
    /// [`CoreError::TransactionFinished`].
    pub fn require_read_access(&self) -> CoreResult<()> {
        context::current()?.validate_for_read_access()
    }
}

impl fmt::Debug for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityState")
            .field("id", &self.id)
            .field("save_state", &self.save_state())
            .finish()
    }
}

/// Creates a new entity inside the bound write transaction.
///
/// `build` receives the entity's state and returns the entity. The entity is
/// registered before it is returned.
///
/// # Errors
///
/// Returns an error when no writable transaction is bound.
pub fn create<T, F>(build: F) -> CoreResult<Arc<T>>
where
    T: Entity,
    F: FnOnce(EntityState) -> T,
{
    let tx = context::current()?;
    tx.validate_for_write_access()?;
    let entity = Arc::new_cyclic(|this: &Weak<T>| {
        let this: Weak<dyn Entity> = this.clone();
        build(EntityState::new(ObjectId::new(), SaveState::Fresh, this))
    });
    tx.register(entity.clone())?;
    Ok(entity)
}

/// Rebuilds a stored entity with id `id` in state [`SaveState::Saved`].
pub fn restore<T, F>(id: ObjectId, build: F) -> Arc<T>
where
    T: Entity,
    F: FnOnce(EntityState) -> T,
{
    Arc::new_cyclic(|this: &Weak<T>| {
        let this: Weak<dyn Entity> = this.clone();
        build(EntityState::new(id, SaveState::Saved, this))
    })
}
