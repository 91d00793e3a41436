//! Ring-buffer engine over the mapped data region.
//!
//! The queue state lives in two places. The mapped control block persists
//! the `(head, tail, size)` triple so the queue is recoverable after a
//! close or crash. Process memory holds the claim counters that drive the
//! concurrent protocol: `enqueue_sequence` and `dequeue_sequence` hand out
//! claims, and `publish_cursor` is the single point that serialises
//! publication.
//!
//! Each claimed sequence moves through `Claimed -> Written -> Published`
//! and never back. Admission and claiming are one compare-and-swap: an
//! attempt that reports `Full` or `Empty` claims nothing, so the claim
//! sequence has no gaps and every claimed sequence is eventually
//! published. Producers reserve slots without locking, write into distinct
//! slots without contention, and then publish in claim order: a producer
//! busy-waits until `publish_cursor` reaches `claim - 1`, advances the
//! mapped tail, bumps the size (in memory and in the mapped word together,
//! under the size mutex), and releases the cursor. The persisted tail and
//! size therefore always describe a prefix of the logical queue, and a
//! consumer that observes `publish_cursor >= k` is guaranteed the slot
//! bytes of every sequence up to `k` are fully written.

use std::fmt;
use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::codec;
use crate::errors::{QueueError, Result};
use crate::file::QueueFile;
use crate::format::CONTROL_BLOCK_SIZE;

const HEAD_POS: usize = 0;
const TAIL_POS: usize = 8;
const SIZE_POS: usize = 16;

/// Outcome of an enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    /// The element was placed at the tail of the queue.
    Enqueued,
    /// The queue was at capacity; nothing was claimed or written. Retry
    /// after a dequeue frees a slot.
    Full,
}

/// Committed queue state guarded by the size mutex.
struct ControlState {
    /// Byte offset of the next slot to dequeue, after all completed
    /// dequeues (not the open-time snapshot).
    head: u64,
    size: u64,
}

/// A persistent bounded FIFO queue over a [`QueueFile`].
///
/// Safe to share across threads: any number of producers and consumers may
/// call [`enqueue`](Self::enqueue) and [`dequeue`](Self::dequeue)
/// concurrently on the same instance.
pub struct MemoryMappedQueue {
    file: QueueFile,
    base: *mut u8,
    region_len: usize,
    capacity: u64,
    slot_size: u64,
    initial_head: u64,
    initial_tail: u64,
    initial_size: u64,
    enqueue_sequence: AtomicU64,
    dequeue_sequence: AtomicU64,
    publish_cursor: AtomicU64,
    /// Mirror of `ControlState::size` for lock-free reads.
    size: AtomicU64,
    control: Mutex<ControlState>,
    busy_iterations: AtomicU64,
}

// SAFETY: the raw base pointer targets a mapping owned by `self.file`, so
// it stays valid for the life of the queue. Concurrent access is sound
// because slot ranges are touched only by the single producer or consumer
// holding the claim for them, the mapped tail is written only while the
// publication barrier is held, and the mapped head and size words are
// written only under the control mutex.
unsafe impl Send for MemoryMappedQueue {}
unsafe impl Sync for MemoryMappedQueue {}

impl MemoryMappedQueue {
    /// Open an existing queue file and bring up the ring over it.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<MemoryMappedQueue> {
        Self::new(QueueFile::open(path)?)
    }

    /// Create (or reuse, per [`QueueFile::create`]) a queue file and bring
    /// up the ring over it.
    pub fn create(
        path: impl AsRef<std::path::Path>,
        schema_id: u64,
        capacity: u32,
        slot_size: u32,
        overwrite: bool,
    ) -> Result<MemoryMappedQueue> {
        Self::new(QueueFile::create(path, schema_id, capacity, slot_size, overwrite)?)
    }

    /// Bring up the ring over an open queue file.
    ///
    /// Reads the control block, initialising zeroed head/tail words to the
    /// start of the slot region, and rejects control values that cannot be
    /// valid: words with nonzero upper four bytes, offsets outside or
    /// unaligned within the slot region, or a stored size above capacity.
    pub fn new(mut file: QueueFile) -> Result<MemoryMappedQueue> {
        let capacity = u64::from(file.capacity());
        let slot_size = u64::from(file.slot_size());
        let span = capacity * slot_size;
        if span == 0 {
            return Err(QueueError::invalid_format("zero capacity or slot size"));
        }
        let region_len = file.data_region().len();
        if region_len as u64 != CONTROL_BLOCK_SIZE + span {
            return Err(QueueError::invalid_format(
                "file length does not match recorded geometry",
            ));
        }

        let base = file.region_ptr();
        let mut queue = MemoryMappedQueue {
            file,
            base,
            region_len,
            capacity,
            slot_size,
            initial_head: 0,
            initial_tail: 0,
            initial_size: 0,
            enqueue_sequence: AtomicU64::new(0),
            dequeue_sequence: AtomicU64::new(0),
            publish_cursor: AtomicU64::new(0),
            size: AtomicU64::new(0),
            control: Mutex::new(ControlState { head: 0, size: 0 }),
            busy_iterations: AtomicU64::new(0),
        };

        let head = queue.init_offset_word(HEAD_POS, "head")?;
        let tail = queue.init_offset_word(TAIL_POS, "tail")?;
        let size = queue.read_control_word(SIZE_POS);
        if size > u64::from(u32::MAX) {
            return Err(QueueError::invalid_format("control block size word corrupt"));
        }
        if size > capacity {
            return Err(QueueError::invalid_format("stored size exceeds capacity"));
        }

        queue.initial_head = head;
        queue.initial_tail = tail;
        queue.initial_size = size;
        queue.size.store(size, Ordering::Release);
        queue.control = Mutex::new(ControlState { head, size });
        Ok(queue)
    }

    /// Read a head/tail word, defaulting a stored zero to the start of the
    /// slot region and persisting that default.
    fn init_offset_word(&self, pos: usize, name: &str) -> Result<u64> {
        let mut value = self.read_control_word(pos);
        if value == 0 {
            value = CONTROL_BLOCK_SIZE;
            self.write_control_word(pos, value);
        }
        if value > u64::from(u32::MAX) {
            return Err(QueueError::InvalidFormat {
                reason: format!("control block {name} word corrupt"),
            });
        }
        let span = self.capacity * self.slot_size;
        let in_range = (CONTROL_BLOCK_SIZE..CONTROL_BLOCK_SIZE + span).contains(&value);
        if !in_range || (value - CONTROL_BLOCK_SIZE) % self.slot_size != 0 {
            return Err(QueueError::InvalidFormat {
                reason: format!("control block {name} offset {value} is not a slot boundary"),
            });
        }
        Ok(value)
    }

    /// Add an element to the tail of the queue.
    ///
    /// `bytes` must be exactly one slot long; shorter encodings are the
    /// caller's to zero-pad (see [`Element`](crate::element::Element)).
    /// Returns [`Enqueue::Full`] without writing anything when the queue is
    /// at capacity.
    pub fn enqueue(&self, bytes: &[u8]) -> Result<Enqueue> {
        assert_eq!(
            bytes.len(),
            self.slot_size as usize,
            "enqueue expects exactly one slot of bytes"
        );

        // Admission and claim are one CAS: in-flight fill counts every
        // claim past the published point. The cursor must be read before
        // the size: publication bumps the size before advancing the
        // cursor, so a size read after the cursor reflects at least every
        // publish the cursor shows. That order can reject a claim that
        // would fit but never admits one that would overflow. A Full
        // outcome claims nothing, leaving no sequence gap for later
        // producers to wait on at the publication barrier.
        let mut claimed = self.enqueue_sequence.load(Ordering::SeqCst);
        let claim = loop {
            let claim = claimed + 1;
            let cursor = self.publish_cursor.load(Ordering::Acquire);
            if cursor > claimed {
                // The counter moved past this snapshot; refresh and retry.
                claimed = self.enqueue_sequence.load(Ordering::SeqCst);
                continue;
            }
            let size = self.size.load(Ordering::Acquire);
            if size + (claim - cursor) > self.capacity {
                return Ok(Enqueue::Full);
            }
            match self.enqueue_sequence.compare_exchange(
                claimed,
                claim,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break claim,
                Err(actual) => claimed = actual,
            }
        };

        let pos = self.producer_slot(claim);
        debug_assert!(pos as usize + bytes.len() <= self.region_len);
        // SAFETY: `pos` addresses one whole slot inside the mapped region,
        // and this claim is the only writer of that slot until a consumer
        // claims it (the admission check prevents re-use).
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), self.base.add(pos as usize), bytes.len());
        }

        // Publication barrier: control block updates happen in claim order.
        let mut spins = 0u64;
        while self.publish_cursor.load(Ordering::Acquire) != claim - 1 {
            spins += 1;
            std::hint::spin_loop();
        }
        if spins > 0 {
            self.busy_iterations.fetch_add(spins, Ordering::Relaxed);
        }

        let new_tail = self.wrap(pos + self.slot_size);
        self.write_control_word(TAIL_POS, new_tail);
        {
            let mut state = self.control.lock();
            state.size += 1;
            self.write_control_word(SIZE_POS, state.size);
            self.size.store(state.size, Ordering::Release);
        }
        self.publish_cursor.store(claim, Ordering::Release);

        Ok(Enqueue::Enqueued)
    }

    /// Remove and return the element at the head of the queue, or `None`
    /// when nothing is available.
    ///
    /// Consumers may drain at most what producers have published plus the
    /// elements already present at open time; an element whose publication
    /// is mid-flight can transiently report as absent.
    pub fn dequeue(&self) -> Result<Option<Vec<u8>>> {
        // Availability and claim are one CAS, mirroring enqueue: an Empty
        // outcome claims nothing, so no two consumers can ever share a
        // claim.
        let mut claimed = self.dequeue_sequence.load(Ordering::SeqCst);
        let claim = loop {
            let claim = claimed + 1;
            let cursor = self.publish_cursor.load(Ordering::Acquire);
            if cursor + self.initial_size < claim {
                return Ok(None);
            }
            match self.dequeue_sequence.compare_exchange(
                claimed,
                claim,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break claim,
                Err(actual) => claimed = actual,
            }
        };

        let pos = self.consumer_slot(claim);
        let mut bytes = vec![0u8; self.slot_size as usize];
        debug_assert!(pos as usize + bytes.len() <= self.region_len);
        // SAFETY: `pos` addresses one whole slot inside the mapped region;
        // this claim is its only reader, and the producer that wrote it
        // published before the availability check could see it.
        unsafe {
            ptr::copy_nonoverlapping(self.base.add(pos as usize), bytes.as_mut_ptr(), bytes.len());
        }

        {
            let mut state = self.control.lock();
            state.head = self.wrap(state.head + self.slot_size);
            self.write_control_word(HEAD_POS, state.head);
            debug_assert!(state.size > 0, "dequeue admitted on an empty queue");
            state.size -= 1;
            self.write_control_word(SIZE_POS, state.size);
            self.size.store(state.size, Ordering::Release);
        }

        Ok(Some(bytes))
    }

    /// Copy the element at the head of the queue without removing it.
    pub fn peek(&self) -> Result<Option<Vec<u8>>> {
        let state = self.control.lock();
        if state.size == 0 {
            return Ok(None);
        }
        let pos = state.head;
        let mut bytes = vec![0u8; self.slot_size as usize];
        // SAFETY: head stays a valid slot offset while the control mutex is
        // held, so no dequeue can retire this slot under us.
        unsafe {
            ptr::copy_nonoverlapping(self.base.add(pos as usize), bytes.as_mut_ptr(), bytes.len());
        }
        Ok(Some(bytes))
    }

    /// Number of elements currently in the queue.
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn is_full(&self) -> bool {
        self.size() >= self.capacity
    }

    /// Maximum number of elements the queue can hold.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Size in bytes of one element slot.
    pub fn slot_size(&self) -> u64 {
        self.slot_size
    }

    /// Schema id recorded in the file header.
    pub fn schema_id(&self) -> u64 {
        self.file.schema_id()
    }

    /// Total spins on the publication barrier since open. Diagnostic only.
    pub fn busy_iterations(&self) -> u64 {
        self.busy_iterations.load(Ordering::Relaxed)
    }

    /// Force mapped pages to disk.
    pub fn flush(&self) -> Result<()> {
        self.file.flush()
    }

    /// Flush and release the queue.
    pub fn close(self) -> Result<()> {
        self.file.flush()?;
        debug!(path = %self.file.path().display(), "closed queue");
        Ok(())
    }

    /// Slot offset for enqueue claim `claim` (1-indexed).
    #[inline]
    fn producer_slot(&self, claim: u64) -> u64 {
        let span = self.capacity * self.slot_size;
        CONTROL_BLOCK_SIZE + (self.initial_tail - CONTROL_BLOCK_SIZE + (claim - 1) * self.slot_size) % span
    }

    /// Slot offset for dequeue claim `claim` (1-indexed).
    #[inline]
    fn consumer_slot(&self, claim: u64) -> u64 {
        let span = self.capacity * self.slot_size;
        CONTROL_BLOCK_SIZE + (self.initial_head - CONTROL_BLOCK_SIZE + (claim - 1) * self.slot_size) % span
    }

    /// Fold an offset at or past the end of the slot region back to its
    /// start.
    #[inline]
    fn wrap(&self, offset: u64) -> u64 {
        let span = self.capacity * self.slot_size;
        CONTROL_BLOCK_SIZE + (offset - CONTROL_BLOCK_SIZE) % span
    }

    #[inline]
    fn read_control_word(&self, pos: usize) -> u64 {
        debug_assert!(pos + 8 <= CONTROL_BLOCK_SIZE as usize);
        // SAFETY: the 8 bytes at `pos` lie inside the control block; each
        // word is read either at open time (single thread) or never again.
        let word = unsafe { slice::from_raw_parts(self.base.add(pos), 8) };
        codec::read_u64(word, 0)
    }

    #[inline]
    fn write_control_word(&self, pos: usize, value: u64) {
        debug_assert!(pos + 8 <= CONTROL_BLOCK_SIZE as usize);
        // SAFETY: the 8 bytes at `pos` lie inside the control block. The
        // tail word is written only under the publication barrier, head and
        // size only under the control mutex, so no two threads write the
        // same word concurrently.
        let word = unsafe { slice::from_raw_parts_mut(self.base.add(pos), 8) };
        codec::write_u64(word, 0, value);
    }
}

impl fmt::Debug for MemoryMappedQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryMappedQueue")
            .field("capacity", &self.capacity)
            .field("slot_size", &self.slot_size)
            .field("size", &self.size())
            .field("initial_head", &self.initial_head)
            .field("initial_tail", &self.initial_tail)
            .field("enqueue_sequence", &self.enqueue_sequence.load(Ordering::Relaxed))
            .field("dequeue_sequence", &self.dequeue_sequence.load(Ordering::Relaxed))
            .field("publish_cursor", &self.publish_cursor.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::QueueFile;
    use tempfile::tempdir;

    fn new_queue(dir: &tempfile::TempDir, capacity: u32, slot_size: u32) -> MemoryMappedQueue {
        let path = dir.path().join("ring.mmqf");
        let file = QueueFile::create(&path, 42, capacity, slot_size, true).unwrap();
        MemoryMappedQueue::new(file).unwrap()
    }

    fn enc(v: u32) -> [u8; 4] {
        v.to_le_bytes()
    }

    fn dec(bytes: &[u8]) -> u32 {
        u32::from_le_bytes(bytes[0..4].try_into().unwrap())
    }

    #[test]
    fn fifo_order_single_threaded() {
        let dir = tempdir().unwrap();
        let queue = new_queue(&dir, 4, 4);

        for v in 1..=4u32 {
            assert_eq!(queue.enqueue(&enc(v)).unwrap(), Enqueue::Enqueued);
        }
        assert_eq!(queue.size(), 4);
        for v in 1..=4u32 {
            assert_eq!(dec(&queue.dequeue().unwrap().unwrap()), v);
        }
        assert_eq!(queue.size(), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_rejects_then_accepts_after_dequeue() {
        let dir = tempdir().unwrap();
        let queue = new_queue(&dir, 3, 4);

        for v in 1..=3u32 {
            assert_eq!(queue.enqueue(&enc(v)).unwrap(), Enqueue::Enqueued);
        }
        assert!(queue.is_full());
        assert_eq!(queue.enqueue(&enc(4)).unwrap(), Enqueue::Full);
        assert_eq!(queue.size(), 3);

        assert_eq!(dec(&queue.dequeue().unwrap().unwrap()), 1);
        assert_eq!(queue.enqueue(&enc(4)).unwrap(), Enqueue::Enqueued);

        for v in 2..=4u32 {
            assert_eq!(dec(&queue.dequeue().unwrap().unwrap()), v);
        }
        assert!(queue.dequeue().unwrap().is_none());
    }

    #[test]
    fn wrap_around_interleaved() {
        let dir = tempdir().unwrap();
        let queue = new_queue(&dir, 2, 4);

        assert_eq!(queue.enqueue(&enc(10)).unwrap(), Enqueue::Enqueued);
        assert_eq!(queue.enqueue(&enc(20)).unwrap(), Enqueue::Enqueued);
        assert_eq!(dec(&queue.dequeue().unwrap().unwrap()), 10);
        assert_eq!(queue.enqueue(&enc(30)).unwrap(), Enqueue::Enqueued);
        assert_eq!(dec(&queue.dequeue().unwrap().unwrap()), 20);
        assert_eq!(dec(&queue.dequeue().unwrap().unwrap()), 30);
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn repeated_enqueue_dequeue_beyond_capacity_stays_consistent() {
        let dir = tempdir().unwrap();
        let queue = new_queue(&dir, 2, 4);

        for v in 0..7u32 {
            assert_eq!(queue.enqueue(&enc(v)).unwrap(), Enqueue::Enqueued);
            assert_eq!(dec(&queue.dequeue().unwrap().unwrap()), v);
            assert!(queue.is_empty());
        }
    }

    #[test]
    fn dequeue_and_peek_on_empty_queue() {
        let dir = tempdir().unwrap();
        let queue = new_queue(&dir, 4, 4);
        assert!(queue.dequeue().unwrap().is_none());
        assert!(queue.peek().unwrap().is_none());
    }

    #[test]
    fn peek_is_idempotent_and_sees_dequeues() {
        let dir = tempdir().unwrap();
        let queue = new_queue(&dir, 4, 4);

        queue.enqueue(&enc(7)).unwrap();
        queue.enqueue(&enc(8)).unwrap();

        let first = queue.peek().unwrap().unwrap();
        let second = queue.peek().unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(dec(&first), 7);
        assert_eq!(queue.size(), 2);

        assert_eq!(dec(&queue.dequeue().unwrap().unwrap()), 7);
        // Peek follows the committed head, not the open-time snapshot.
        assert_eq!(dec(&queue.peek().unwrap().unwrap()), 8);
    }

    #[test]
    fn control_block_reflects_net_operations() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("control.mmqf");
        {
            let file = QueueFile::create(&path, 1, 2, 4, true).unwrap();
            let queue = MemoryMappedQueue::new(file).unwrap();
            queue.enqueue(&enc(10)).unwrap();
            queue.enqueue(&enc(20)).unwrap();
            queue.dequeue().unwrap().unwrap();
            queue.enqueue(&enc(30)).unwrap();
            queue.dequeue().unwrap().unwrap();
            queue.dequeue().unwrap().unwrap();
            queue.close().unwrap();
        }

        // Three net enqueues and dequeues over a two-slot span: both
        // offsets wrapped to 32 + (3 * 4) % 8 = 36.
        let file = QueueFile::open(&path).unwrap();
        let region = file.data_region();
        assert_eq!(codec::read_u64(region, HEAD_POS), 36);
        assert_eq!(codec::read_u64(region, TAIL_POS), 36);
        assert_eq!(codec::read_u64(region, SIZE_POS), 0);
    }

    #[test]
    fn busy_iterations_stay_zero_without_contention() {
        let dir = tempdir().unwrap();
        let queue = new_queue(&dir, 8, 4);
        for v in 0..8u32 {
            queue.enqueue(&enc(v)).unwrap();
        }
        assert_eq!(queue.busy_iterations(), 0);
    }

    #[test]
    fn corrupt_control_word_is_rejected_at_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corrupt.mmqf");
        {
            let mut file = QueueFile::create(&path, 1, 4, 4, true).unwrap();
            let region = file.data_region_mut();
            // Upper four bytes nonzero.
            codec::write_u64(region, HEAD_POS, 1 << 40);
            file.flush().unwrap();
        }
        let file = QueueFile::open(&path).unwrap();
        assert!(matches!(
            MemoryMappedQueue::new(file),
            Err(QueueError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn unaligned_head_is_rejected_at_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("unaligned.mmqf");
        {
            let mut file = QueueFile::create(&path, 1, 4, 4, true).unwrap();
            codec::write_u64(file.data_region_mut(), HEAD_POS, 33);
            file.flush().unwrap();
        }
        let file = QueueFile::open(&path).unwrap();
        assert!(matches!(
            MemoryMappedQueue::new(file),
            Err(QueueError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn oversized_stored_size_is_rejected_at_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("oversize.mmqf");
        {
            let mut file = QueueFile::create(&path, 1, 4, 4, true).unwrap();
            codec::write_u64(file.data_region_mut(), SIZE_POS, 5);
            file.flush().unwrap();
        }
        let file = QueueFile::open(&path).unwrap();
        assert!(matches!(
            MemoryMappedQueue::new(file),
            Err(QueueError::InvalidFormat { .. })
        ));
    }
}
