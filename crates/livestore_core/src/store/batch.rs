//! Write batches: everything one commit puts into the log.

use super::ObjectStore;
use crate::error::CoreResult;
use crate::id::ObjectId;
use crate::persist::Persistable;
use crate::record::{Record, RecordWriter};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Objects queued for one atomic commit.
///
/// Storing an object encodes its own fields immediately and then walks its
/// owning references. A referenced object that the store has never committed
/// and that is not queued yet is stored too, recursively; objects the store
/// already knows are left alone and only change when stored explicitly.
pub struct WriteBatch {
    target: ObjectStore,
    queued: Vec<(ObjectId, Vec<u8>)>,
    positions: HashMap<ObjectId, usize>,
    live: Vec<(ObjectId, Arc<dyn Any + Send + Sync>)>,
    root: Option<ObjectId>,
}

impl WriteBatch {
    pub(crate) fn new(target: ObjectStore) -> Self {
        Self {
            target,
            queued: Vec::new(),
            positions: HashMap::new(),
            live: Vec::new(),
            root: None,
        }
    }

    /// Queues `object`, plus every new object it owns.
    ///
    /// Queuing an object twice keeps one entry holding the latest fields.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be encoded.
    pub fn store<P: Persistable + ?Sized>(&mut self, object: &Arc<P>) -> CoreResult<()> {
        let id = object.object_id();
        let mut writer = RecordWriter::new();
        object.write_flat(&mut writer)?;
        let (fields, references) = writer.into_parts();
        let bytes = Record {
            kind: object.kind().to_owned(),
            fields,
        }
        .encode()?;
        object.attach(&self.target);

        match self.positions.get(&id) {
            Some(&position) => self.queued[position].1 = bytes,
            None => {
                self.positions.insert(id, self.queued.len());
                self.queued.push((id, bytes));
                self.live.push((id, object.clone().into_any()));
            }
        }

        for reference in references {
            let reference_id = reference.object_id();
            if !self.positions.contains_key(&reference_id) && !self.target.contains(reference_id) {
                self.store(&reference)?;
            }
        }
        Ok(())
    }

    /// Queues `root` and makes it the store's root when the batch commits.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be encoded.
    pub fn set_root<P: Persistable>(&mut self, root: &Arc<P>) -> CoreResult<()> {
        self.store(root)?;
        self.root = Some(root.object_id());
        Ok(())
    }

    /// Writes every queued record and a commit marker in one append, then
    /// publishes them to the store's index. An empty batch is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the log append or flush fails; the log is left as
    /// it was before the call and the queue is kept.
    pub fn commit(&mut self) -> CoreResult<()> {
        if self.queued.is_empty() && self.root.is_none() {
            return Ok(());
        }
        let spans = self.target.append(&self.queued, self.root)?;
        self.target
            .publish(spans, self.root, std::mem::take(&mut self.live));
        self.clear();
        Ok(())
    }

    /// Drops everything queued.
    pub fn clear(&mut self) {
        self.queued.clear();
        self.positions.clear();
        self.live.clear();
        self.root = None;
    }

    /// Number of queued records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queued.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queued.is_empty() && self.root.is_none()
    }
}
