//! A persistent, bounded FIFO queue backed by a memory mapped file.
//!
//! # Overview
//! The queue file (`.mmqf`) is both the storage medium and the shared
//! state: it survives restarts, and concurrent producers and consumers
//! synchronise through atomic counters and the shared mapping rather than
//! through in-process locks alone.
//!
//! Key components:
//! - [`QueueConfig`](config::QueueConfig): names the file and fixes the
//!   geometry; build one with [`QueueConfig::builder()`](config::QueueConfig::builder)
//!   and resolve it with [`create_context`](config::create_context) or
//!   [`open_context`](config::open_context).
//! - [`QueueFile`](file::QueueFile): the validated file with its data
//!   region mapped.
//! - [`MemoryMappedQueue`](ring::MemoryMappedQueue): the ring engine;
//!   enqueue, dequeue, and peek over opaque fixed-width byte slots.
//! - [`ElementQueue`](element::ElementQueue): typed wrapper that encodes
//!   values into slots and verifies the file's schema id.
//! - [`QueueError`](errors::QueueError): crate error type.
//!
//! # Concurrency model
//!
//! Producers claim a sequence number atomically, write their slot without
//! contention, and publish in claim order through a busy-wait barrier on
//! the publication cursor; the persisted tail and size always describe a
//! prefix of the logical queue. Consumers claim from their own sequence
//! and may drain whatever has been published plus whatever was already in
//! the file at open time. `Full` and `Empty` are ordinary outcomes, soft
//! and retryable; a rejected attempt claims nothing and counters stay
//! consistent.
//!
//! Durability is the OS writing mapped pages back; call
//! [`flush`](ring::MemoryMappedQueue::flush) to force it. Opening a file
//! validates magic, version, header checksum, and length before the ring
//! engine interprets anything.

pub mod codec;
pub mod config;
pub mod element;
pub mod errors;
pub mod file;
pub mod format;
pub mod ring;

#[cfg(test)]
mod tests;

pub use config::{create_context, open_context, QueueConfig};
pub use element::{Element, ElementQueue};
pub use errors::{QueueError, Result};
pub use file::QueueFile;
pub use format::FILE_EXTENSION;
pub use ring::{Enqueue, MemoryMappedQueue};
