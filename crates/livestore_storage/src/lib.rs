//! # livestore storage
//!
//! Byte-level backends underneath the livestore object log.
//!
//! A backend is an append-only byte sequence. It knows nothing about frames,
//! records or objects; the core crate owns the log format and only asks a
//! backend to append, read back, flush and truncate.
//!
//! ## Backends
//!
//! - [`InMemoryBackend`] keeps the bytes in a shared buffer. Clones share the
//!   buffer, which lets a test drop a store and reopen it from the same bytes.
//! - [`FileBackend`] appends to a single file.
//! - [`FaultyBackend`] wraps another backend and fails on demand, for
//!   exercising commit failure paths.
//!
//! ```rust
//! use livestore_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"frame").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"frame");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod faulty;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use faulty::{FaultSwitch, FaultyBackend};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
