//! Recovery behaviour: the control block makes the queue loadable after a
//! close, with size and FIFO position intact.

use tempfile::tempdir;

use crate::file::QueueFile;
use crate::ring::{Enqueue, MemoryMappedQueue};

fn open_ring(path: &std::path::Path) -> MemoryMappedQueue {
    MemoryMappedQueue::new(QueueFile::open(path).expect("open")).expect("ring")
}

#[test]
fn reopened_queue_resumes_at_the_oldest_unconsumed_element() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("resume.mmqf");

    {
        let file = QueueFile::create(&path, 3, 8, 4, true).unwrap();
        let queue = MemoryMappedQueue::new(file).unwrap();
        for v in [5u32, 6, 7] {
            assert_eq!(queue.enqueue(&v.to_le_bytes()).unwrap(), Enqueue::Enqueued);
        }
        assert_eq!(queue.dequeue().unwrap().unwrap(), 5u32.to_le_bytes());
        queue.close().unwrap();
    }

    let queue = open_ring(&path);
    assert_eq!(queue.size(), 2);
    assert_eq!(queue.peek().unwrap().unwrap(), 6u32.to_le_bytes());
    assert_eq!(queue.dequeue().unwrap().unwrap(), 6u32.to_le_bytes());

    // New traffic lands behind the recovered elements.
    assert_eq!(queue.enqueue(&8u32.to_le_bytes()).unwrap(), Enqueue::Enqueued);
    assert_eq!(queue.dequeue().unwrap().unwrap(), 7u32.to_le_bytes());
    assert_eq!(queue.dequeue().unwrap().unwrap(), 8u32.to_le_bytes());
    assert!(queue.is_empty());
    queue.close().unwrap();
}

#[test]
fn size_accumulates_across_sessions() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sessions.mmqf");

    {
        let file = QueueFile::create(&path, 1, 16, 8, true).unwrap();
        let queue = MemoryMappedQueue::new(file).unwrap();
        for v in 0..3u64 {
            queue.enqueue(&v.to_le_bytes()).unwrap();
        }
        queue.close().unwrap();
    }
    {
        let queue = open_ring(&path);
        assert_eq!(queue.size(), 3);
        for v in 3..5u64 {
            queue.enqueue(&v.to_le_bytes()).unwrap();
        }
        queue.close().unwrap();
    }

    let queue = open_ring(&path);
    assert_eq!(queue.size(), 5);
    for v in 0..5u64 {
        assert_eq!(queue.dequeue().unwrap().unwrap(), v.to_le_bytes());
    }
    assert!(queue.dequeue().unwrap().is_none());
}

#[test]
fn wrapped_state_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wrapped.mmqf");

    {
        let file = QueueFile::create(&path, 1, 2, 4, true).unwrap();
        let queue = MemoryMappedQueue::new(file).unwrap();
        // Cycle past the span so head and tail both wrap.
        for v in 0..5u32 {
            queue.enqueue(&v.to_le_bytes()).unwrap();
            queue.dequeue().unwrap().unwrap();
        }
        queue.enqueue(&99u32.to_le_bytes()).unwrap();
        queue.close().unwrap();
    }

    let queue = open_ring(&path);
    assert_eq!(queue.size(), 1);
    assert_eq!(queue.dequeue().unwrap().unwrap(), 99u32.to_le_bytes());
    assert!(queue.is_empty());

    // A fresh session over the emptied queue still round-trips.
    for v in [11u32, 22] {
        assert_eq!(queue.enqueue(&v.to_le_bytes()).unwrap(), Enqueue::Enqueued);
    }
    assert_eq!(queue.dequeue().unwrap().unwrap(), 11u32.to_le_bytes());
    assert_eq!(queue.dequeue().unwrap().unwrap(), 22u32.to_le_bytes());
}

#[test]
fn flush_persists_without_close() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("flush.mmqf");

    let file = QueueFile::create(&path, 1, 4, 4, true).unwrap();
    let queue = MemoryMappedQueue::new(file).unwrap();
    queue.enqueue(&1234u32.to_le_bytes()).unwrap();
    queue.flush().unwrap();

    // The mapping is shared, so a second handle over the same file sees
    // the published element.
    let other = open_ring(&path);
    assert_eq!(other.size(), 1);
    assert_eq!(other.peek().unwrap().unwrap(), 1234u32.to_le_bytes());
}
