//! # livestore core
//!
//! A transactional layer over a live object graph persisted in an
//! append-only object log.
//!
//! This crate provides:
//! - [`Storage`]: read and write scopes over a root object, with a
//!   reentrant access lock, automatic commit and automatic rollback
//! - [`Transaction`]: per-scope tracking of created and modified entities
//! - [`Entity`] and [`EntityState`]: save-state tracking for graph nodes
//! - [`TxList`], [`TxSet`], [`TxMap`]: containers that track their own changes
//! - [`ObjectStore`]: the durable store underneath, with [`Lazy`] values,
//!   non-owning [`Link`]s and separately stored [`Backing`] field groups
//!
//! ## Defining entities
//!
//! An entity embeds an [`EntityState`], keeps its mutable fields in a
//! [`Backing`], and implements [`Entity`], [`Persistable`] and [`Load`].
//! Accessors call [`EntityState::require_read_access`]; mutators call
//! [`EntityState::mark_dirty`] before changing anything. New entities are
//! built with [`entity::create`] inside a write scope.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod access;
mod backing;
mod collections;
mod config;
pub mod context;
pub mod entity;
mod error;
mod id;
mod lazy;
mod link;
mod lock;
mod persist;
mod record;
mod save_state;
mod store;
mod transaction;

#[cfg(test)]
mod testing;

pub use access::{Root, Storage};
pub use backing::Backing;
pub use collections::{ListCursor, MapCursor, SetCursor, TxList, TxMap, TxSet};
pub use config::StoreConfig;
pub use entity::{Entity, EntityState};
pub use error::{CoreError, CoreResult};
pub use id::{ObjectId, TransactionId};
pub use lazy::{Lazy, LazyValue};
pub use link::Link;
pub use persist::{AsAny, Contents, Element, Load, Persistable};
pub use record::{RecordReader, RecordWriter};
pub use save_state::SaveState;
pub use store::{ObjectStore, StoreStats, WriteBatch};
pub use transaction::{Lifecycle, Transaction, Unload};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
