use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while creating, opening, or operating a queue file.
///
/// `Full` and `Empty` outcomes of enqueue/dequeue are ordinary return
/// values, not errors; everything here is either fatal at open time or an
/// underlying I/O failure.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("advisory lock unavailable on {path}")]
    LockUnavailable { path: PathBuf },

    #[error("not a memory mapped queue file: {reason}")]
    InvalidFormat { reason: String },

    #[error("file format version {found} outside supported range {min}..={current}")]
    VersionUnsupported { found: u8, min: u8, current: u8 },

    #[error("header checksum mismatch: recorded {recorded:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { recorded: u32, computed: u32 },

    #[error("file length mismatch: header records {recorded} bytes, file has {actual}")]
    FileTruncated { recorded: u64, actual: u64 },

    #[error("file already exists: {path}")]
    AlreadyExists { path: PathBuf },

    #[error(
        "geometry mismatch: file has capacity {file_capacity} and slot size \
         {file_slot_size}, requested capacity {requested_capacity} and slot size \
         {requested_slot_size}"
    )]
    GeometryMismatch {
        file_capacity: u32,
        file_slot_size: u32,
        requested_capacity: u32,
        requested_slot_size: u32,
    },

    #[error("schema id mismatch: file records {file:#018x}, element uses {element:#018x}")]
    SchemaMismatch { file: u64, element: u64 },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl QueueError {
    pub(crate) fn invalid_format(reason: impl Into<String>) -> Self {
        QueueError::InvalidFormat {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
