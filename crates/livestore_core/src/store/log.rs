//! The append-only object log.
//!
//! Every frame has the layout
//!
//! ```text
//! | magic "LSOB" (4) | version u16 (2) | type u8 (1) | len u32 (4) | payload (len) | crc32 (4) |
//! ```
//!
//! with all integers little-endian. The checksum covers header and payload.
//! A committed batch is a run of `Object` frames, an optional `Root` frame,
//! and a closing `Commit` frame carrying the number of frames it seals.
//! Frames after the last `Commit` never took effect and are dropped on replay.

use crate::error::{CoreError, CoreResult};
use crate::id::ObjectId;
use livestore_storage::StorageBackend;
use std::collections::HashMap;
use tracing::{debug, error, warn};

/// Magic bytes opening every frame.
pub(crate) const LOG_MAGIC: [u8; 4] = *b"LSOB";

/// Current frame format version.
pub(crate) const LOG_VERSION: u16 = 1;

const HEADER_SIZE: usize = 4 + 2 + 1 + 4;
const CRC_SIZE: usize = 4;
const ID_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum FrameType {
    Object = 1,
    Root = 2,
    Commit = 3,
}

impl FrameType {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Object),
            2 => Some(Self::Root),
            3 => Some(Self::Commit),
            _ => None,
        }
    }
}

/// Location of one object's record bytes inside the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    pub(crate) offset: u64,
    pub(crate) len: usize,
}

#[derive(Debug)]
enum Frame {
    Object { id: ObjectId, record: Span },
    Root { id: ObjectId },
    Commit { frames: u32 },
}

/// State rebuilt from the committed part of the log.
#[derive(Debug, Default)]
pub(crate) struct Replay {
    pub(crate) index: HashMap<ObjectId, Span>,
    pub(crate) root: Option<ObjectId>,
    pub(crate) commits: u64,
    pub(crate) discarded_bytes: u64,
}

/// IEEE CRC-32 over `data`.
pub(crate) fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut n = 0;
        while n < 256 {
            let mut crc = n as u32;
            let mut bit = 0;
            while bit < 8 {
                crc = if crc & 1 == 1 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                bit += 1;
            }
            table[n] = crc;
            n += 1;
        }
        table
    };

    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    })
}

fn push_frame(out: &mut Vec<u8>, frame_type: FrameType, payload: &[u8]) {
    let start = out.len();
    out.extend_from_slice(&LOG_MAGIC);
    out.extend_from_slice(&LOG_VERSION.to_le_bytes());
    out.push(frame_type as u8);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    let crc = compute_crc32(&out[start..]);
    out.extend_from_slice(&crc.to_le_bytes());
}

fn le_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn object_id(bytes: &[u8]) -> ObjectId {
    let mut raw = [0u8; ID_SIZE];
    raw.copy_from_slice(&bytes[..ID_SIZE]);
    ObjectId::from_bytes(raw)
}

/// Decodes the frame starting at `pos`.
///
/// Returns `None` when the remaining bytes cannot hold a whole frame, which is
/// how a torn tail looks.
fn decode_frame(log: &[u8], pos: usize) -> CoreResult<Option<(Frame, usize)>> {
    let rest = &log[pos..];
    if rest.len() < HEADER_SIZE {
        return Ok(None);
    }
    if rest[..4] != LOG_MAGIC {
        return Err(CoreError::corrupted(format!("bad frame magic at offset {pos}")));
    }
    let version = le_u16(&rest[4..6]);
    if version != LOG_VERSION {
        return Err(CoreError::corrupted(format!(
            "unsupported frame version {version} at offset {pos}"
        )));
    }
    let frame_type = FrameType::from_byte(rest[6]).ok_or_else(|| {
        CoreError::corrupted(format!("unknown frame type {} at offset {pos}", rest[6]))
    })?;
    let len = le_u32(&rest[7..11]) as usize;
    let total = HEADER_SIZE + len + CRC_SIZE;
    if rest.len() < total {
        return Ok(None);
    }

    let expected = le_u32(&rest[HEADER_SIZE + len..total]);
    let actual = compute_crc32(&rest[..HEADER_SIZE + len]);
    if expected != actual {
        return Err(CoreError::ChecksumMismatch { expected, actual });
    }

    let payload = &rest[HEADER_SIZE..HEADER_SIZE + len];
    let frame = match frame_type {
        FrameType::Object if len >= ID_SIZE => Frame::Object {
            id: object_id(payload),
            record: Span {
                offset: (pos + HEADER_SIZE + ID_SIZE) as u64,
                len: len - ID_SIZE,
            },
        },
        FrameType::Root if len == ID_SIZE => Frame::Root {
            id: object_id(payload),
        },
        FrameType::Commit if len == 4 => Frame::Commit {
            frames: le_u32(payload),
        },
        _ => {
            return Err(CoreError::corrupted(format!(
                "{frame_type:?} frame at offset {pos} has invalid length {len}"
            )))
        }
    };
    Ok(Some((frame, pos + total)))
}

/// Owns the backend and speaks the frame format.
pub(crate) struct ObjectLog {
    backend: Box<dyn StorageBackend>,
    sync_on_commit: bool,
    /// Set when a failed batch could not be cut back. The tail then holds
    /// frames of unknown extent, so nothing more may be appended after it.
    poisoned: bool,
}

impl ObjectLog {
    pub(crate) fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend,
            sync_on_commit,
            poisoned: false,
        }
    }

    /// Rebuilds the index from committed frames and truncates anything after
    /// the last commit.
    pub(crate) fn replay(&mut self) -> CoreResult<Replay> {
        let size = self.backend.size()?;
        let log = self.backend.read_at(0, size as usize)?;

        let mut replay = Replay::default();
        let mut pending = Vec::new();
        let mut pending_root = None;
        let mut committed_end = 0;
        let mut pos = 0;

        while let Some((frame, next)) = decode_frame(&log, pos)? {
            match frame {
                Frame::Object { id, record } => pending.push((id, record)),
                Frame::Root { id } => pending_root = Some(id),
                Frame::Commit { frames } => {
                    let sealed = pending.len() + usize::from(pending_root.is_some());
                    if frames as usize != sealed {
                        return Err(CoreError::corrupted(format!(
                            "commit at offset {pos} seals {frames} frames, found {sealed}"
                        )));
                    }
                    replay.index.extend(pending.drain(..));
                    if let Some(root) = pending_root.take() {
                        replay.root = Some(root);
                    }
                    replay.commits += 1;
                    committed_end = next;
                }
            }
            pos = next;
        }

        if committed_end < log.len() {
            replay.discarded_bytes = (log.len() - committed_end) as u64;
            warn!(
                discarded = replay.discarded_bytes,
                "discarding uncommitted object log tail"
            );
            self.backend.truncate(committed_end as u64)?;
        }
        debug!(
            commits = replay.commits,
            objects = replay.index.len(),
            "object log replayed"
        );
        Ok(replay)
    }

    /// Appends one batch and its commit frame, then makes it durable.
    ///
    /// On failure the log is cut back to where the batch started. If that
    /// cut fails too the log refuses further batches until it is reopened,
    /// where replay drops the uncommitted tail.
    pub(crate) fn append_batch(
        &mut self,
        objects: &[(ObjectId, Vec<u8>)],
        root: Option<ObjectId>,
    ) -> CoreResult<Vec<(ObjectId, Span)>> {
        if self.poisoned {
            return Err(CoreError::invalid_operation(
                "object log is unusable after a failed rollback; reopen the store",
            ));
        }
        let start = self.backend.size()?;
        let mut frames = Vec::new();
        let mut spans = Vec::with_capacity(objects.len());
        let mut payload = Vec::new();

        for (id, record) in objects {
            let frame_start = start + frames.len() as u64;
            payload.clear();
            payload.extend_from_slice(id.as_bytes());
            payload.extend_from_slice(record);
            push_frame(&mut frames, FrameType::Object, &payload);
            spans.push((
                *id,
                Span {
                    offset: frame_start + (HEADER_SIZE + ID_SIZE) as u64,
                    len: record.len(),
                },
            ));
        }
        if let Some(root) = root {
            push_frame(&mut frames, FrameType::Root, root.as_bytes());
        }
        let sealed = objects.len() + usize::from(root.is_some());
        push_frame(&mut frames, FrameType::Commit, &(sealed as u32).to_le_bytes());

        if let Err(err) = self.write_durably(&frames) {
            if let Err(truncate_err) = self.backend.truncate(start) {
                error!(
                    error = %truncate_err,
                    offset = start,
                    "could not cut back failed batch, refusing further writes"
                );
                self.poisoned = true;
            }
            return Err(err);
        }
        Ok(spans)
    }

    fn write_durably(&mut self, frames: &[u8]) -> CoreResult<()> {
        self.backend.append(frames)?;
        self.backend.flush()?;
        if self.sync_on_commit {
            self.backend.sync()?;
        }
        Ok(())
    }

    pub(crate) fn read(&self, span: Span) -> CoreResult<Vec<u8>> {
        Ok(self.backend.read_at(span.offset, span.len)?)
    }

    pub(crate) fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }

    pub(crate) fn sync(&mut self) -> CoreResult<()> {
        self.backend.flush()?;
        Ok(self.backend.sync()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livestore_storage::{FaultyBackend, InMemoryBackend};
    use proptest::prelude::*;

    fn open(backend: &InMemoryBackend) -> ObjectLog {
        ObjectLog::new(Box::new(backend.clone()), true)
    }

    #[test]
    fn crc_matches_reference_vector() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn committed_batches_are_replayed() {
        let memory = InMemoryBackend::new();
        let a = ObjectId::new();
        let b = ObjectId::new();
        let spans = {
            let mut log = open(&memory);
            log.append_batch(&[(a, b"alpha".to_vec())], Some(a)).unwrap();
            log.append_batch(&[(b, b"beta".to_vec()), (a, b"alpha2".to_vec())], None)
                .unwrap()
        };

        let mut log = open(&memory);
        let replay = log.replay().unwrap();
        assert_eq!(replay.commits, 2);
        assert_eq!(replay.root, Some(a));
        assert_eq!(replay.index[&a], spans[1].1);
        assert_eq!(log.read(replay.index[&a]).unwrap(), b"alpha2");
        assert_eq!(log.read(replay.index[&b]).unwrap(), b"beta");
    }

    #[test]
    fn torn_tail_is_discarded_and_truncated() {
        let memory = InMemoryBackend::new();
        let id = ObjectId::new();
        let mut log = open(&memory);
        log.append_batch(&[(id, b"kept".to_vec())], None).unwrap();
        let committed = memory.snapshot().len();
        log.append_batch(&[(id, b"lost".to_vec())], None).unwrap();

        let torn = memory.snapshot()[..memory.snapshot().len() - 3].to_vec();
        let torn_backend = InMemoryBackend::with_bytes(torn);
        let mut log = open(&torn_backend);
        let replay = log.replay().unwrap();
        assert_eq!(replay.commits, 1);
        assert!(replay.discarded_bytes > 0);
        assert_eq!(torn_backend.snapshot().len(), committed);
        assert_eq!(log.read(replay.index[&id]).unwrap(), b"kept");
    }

    #[test]
    fn frames_without_commit_are_ignored() {
        let memory = InMemoryBackend::new();
        let id = ObjectId::new();
        let mut frames = Vec::new();
        let mut payload = id.as_bytes().to_vec();
        payload.extend_from_slice(b"orphan");
        push_frame(&mut frames, FrameType::Object, &payload);
        let mut backend = memory.clone();
        StorageBackend::append(&mut backend, &frames).unwrap();

        let replay = open(&memory).replay().unwrap();
        assert!(replay.index.is_empty());
        assert!(memory.snapshot().is_empty());
    }

    #[test]
    fn flipped_byte_is_a_checksum_error() {
        let memory = InMemoryBackend::new();
        open(&memory)
            .append_batch(&[(ObjectId::new(), b"payload".to_vec())], None)
            .unwrap();
        memory.corrupt_byte(HEADER_SIZE + ID_SIZE + 2);
        assert!(matches!(
            open(&memory).replay(),
            Err(CoreError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn bad_magic_is_corruption() {
        let memory = InMemoryBackend::new();
        open(&memory)
            .append_batch(&[(ObjectId::new(), b"payload".to_vec())], None)
            .unwrap();
        memory.corrupt_byte(0);
        assert!(matches!(
            open(&memory).replay(),
            Err(CoreError::Corrupted { .. })
        ));
    }

    #[test]
    fn failed_flush_cuts_the_batch_back() {
        let memory = InMemoryBackend::new();
        let (backend, switch) = FaultyBackend::new(Box::new(memory.clone()));
        let mut log = ObjectLog::new(Box::new(backend), false);
        log.append_batch(&[(ObjectId::new(), b"one".to_vec())], None)
            .unwrap();
        let before = memory.snapshot();

        switch.fail_flushes(true);
        assert!(log
            .append_batch(&[(ObjectId::new(), b"two".to_vec())], None)
            .is_err());
        assert_eq!(memory.snapshot(), before);
    }

    #[test]
    fn failed_cut_back_refuses_later_batches_until_reopened() {
        let memory = InMemoryBackend::new();
        let kept = ObjectId::new();
        let (backend, switch) = FaultyBackend::new(Box::new(memory.clone()));
        let mut log = ObjectLog::new(Box::new(backend), false);
        log.append_batch(&[(kept, b"one".to_vec())], None).unwrap();

        switch.fail_flushes(true);
        switch.fail_truncates(true);
        assert!(log
            .append_batch(&[(ObjectId::new(), b"two".to_vec())], None)
            .is_err());

        switch.fail_flushes(false);
        switch.fail_truncates(false);
        assert!(matches!(
            log.append_batch(&[(ObjectId::new(), b"three".to_vec())], None),
            Err(CoreError::InvalidOperation { .. })
        ));

        let mut reopened = open(&memory);
        let replay = reopened.replay().unwrap();
        assert_eq!(replay.commits, 2);
        assert_eq!(reopened.read(replay.index[&kept]).unwrap(), b"one");
        reopened
            .append_batch(&[(ObjectId::new(), b"four".to_vec())], None)
            .unwrap();
    }

    proptest! {
        #[test]
        fn any_batch_replays_to_its_records(records in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 0..64), 1..8)
        ) {
            let memory = InMemoryBackend::new();
            let batch: Vec<(ObjectId, Vec<u8>)> =
                records.into_iter().map(|r| (ObjectId::new(), r)).collect();
            open(&memory).append_batch(&batch, None).unwrap();

            let mut log = open(&memory);
            let replay = log.replay().unwrap();
            for (id, record) in &batch {
                prop_assert_eq!(&log.read(replay.index[id]).unwrap(), record);
            }
        }
    }
}
