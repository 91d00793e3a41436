//! Bridge between application values and fixed-width byte slots.
//!
//! The ring engine moves opaque slot-sized byte buffers; this module is
//! where values become bytes and back. An [`Element`] declares its encoded
//! width and a 64-bit schema id, and [`ElementQueue`] pairs the trait with
//! a queue file, verifying at open time that the file was created for the
//! same element type.

use std::marker::PhantomData;
use std::path::Path;

use crate::codec;
use crate::errors::{QueueError, Result};
use crate::file::QueueFile;
use crate::ring::{Enqueue, MemoryMappedQueue};

/// A value that can live in a fixed-width queue slot.
///
/// `to_bytes` receives a buffer of exactly [`BYTE_SIZE`](Self::BYTE_SIZE)
/// bytes; when the file's slot size is larger than the encoding, the queue
/// zero-pads the remainder of the slot.
pub trait Element: Sized {
    /// Identifies the element layout. Recorded in the file header at
    /// creation and checked on open.
    const SCHEMA_ID: u64;

    /// Encoded width in bytes.
    const BYTE_SIZE: usize;

    fn to_bytes(&self, buf: &mut [u8]);

    fn from_bytes(bytes: &[u8]) -> Self;
}

impl Element for i32 {
    const SCHEMA_ID: u64 = u64::from_be_bytes(*b"mmq:i32\0");
    const BYTE_SIZE: usize = 4;

    fn to_bytes(&self, buf: &mut [u8]) {
        codec::write_i32(buf, 0, *self);
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        codec::read_i32(bytes, 0)
    }
}

impl Element for i64 {
    const SCHEMA_ID: u64 = u64::from_be_bytes(*b"mmq:i64\0");
    const BYTE_SIZE: usize = 8;

    fn to_bytes(&self, buf: &mut [u8]) {
        codec::write_i64(buf, 0, *self);
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        codec::read_i64(bytes, 0)
    }
}

/// A queue of typed elements over a [`MemoryMappedQueue`].
pub struct ElementQueue<T: Element> {
    queue: MemoryMappedQueue,
    _marker: PhantomData<T>,
}

impl<T: Element> ElementQueue<T> {
    /// Create a queue file sized for `T` and wrap it.
    pub fn create(path: impl AsRef<Path>, capacity: u32, overwrite: bool) -> Result<ElementQueue<T>> {
        let file = QueueFile::create(
            path,
            T::SCHEMA_ID,
            capacity,
            T::BYTE_SIZE as u32,
            overwrite,
        )?;
        Self::wrap(file)
    }

    /// Open an existing queue file for elements of type `T`.
    pub fn open(path: impl AsRef<Path>) -> Result<ElementQueue<T>> {
        Self::wrap(QueueFile::open(path)?)
    }

    /// Wrap an already open file, verifying schema id and slot size.
    pub fn wrap(file: QueueFile) -> Result<ElementQueue<T>> {
        if file.schema_id() != T::SCHEMA_ID {
            return Err(QueueError::SchemaMismatch {
                file: file.schema_id(),
                element: T::SCHEMA_ID,
            });
        }
        if (file.slot_size() as usize) < T::BYTE_SIZE {
            return Err(QueueError::GeometryMismatch {
                file_capacity: file.capacity(),
                file_slot_size: file.slot_size(),
                requested_capacity: file.capacity(),
                requested_slot_size: T::BYTE_SIZE as u32,
            });
        }
        Ok(ElementQueue {
            queue: MemoryMappedQueue::new(file)?,
            _marker: PhantomData,
        })
    }

    pub fn enqueue(&self, value: &T) -> Result<Enqueue> {
        let mut slot = vec![0u8; self.queue.slot_size() as usize];
        value.to_bytes(&mut slot[..T::BYTE_SIZE]);
        self.queue.enqueue(&slot)
    }

    pub fn dequeue(&self) -> Result<Option<T>> {
        Ok(self
            .queue
            .dequeue()?
            .map(|bytes| T::from_bytes(&bytes[..T::BYTE_SIZE])))
    }

    pub fn peek(&self) -> Result<Option<T>> {
        Ok(self
            .queue
            .peek()?
            .map(|bytes| T::from_bytes(&bytes[..T::BYTE_SIZE])))
    }

    pub fn size(&self) -> u64 {
        self.queue.size()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub fn capacity(&self) -> u64 {
        self.queue.capacity()
    }

    pub fn flush(&self) -> Result<()> {
        self.queue.flush()
    }

    pub fn close(self) -> Result<()> {
        self.queue.close()
    }

    /// The untyped queue underneath.
    pub fn as_raw(&self) -> &MemoryMappedQueue {
        &self.queue
    }
}
