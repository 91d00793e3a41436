//! Queue configuration for drivers and embedders.
//!
//! A [`QueueConfig`] names the file and fixes the geometry; driver binaries
//! deserialize one from TOML and hand it to [`create_context`] or
//! [`open_context`] to get a ready queue. Use [`QueueConfig::builder`] to
//! construct a validated config in code.

use std::path::PathBuf;

use serde_derive::{Deserialize, Serialize};

use crate::errors::{QueueError, Result};
use crate::file::QueueFile;
use crate::format;
use crate::ring::MemoryMappedQueue;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Directory holding the queue file.
    pub data_dir: String,
    /// File name within `data_dir`.
    pub file_name: String,
    /// Schema id recorded at creation.
    pub schema_id: u64,
    /// Maximum number of elements.
    pub capacity: u32,
    /// Size in bytes of one element slot.
    pub slot_size: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            data_dir: String::from("."),
            file_name: format!("queue.{}", format::FILE_EXTENSION),
            schema_id: 0,
            capacity: 1024,
            slot_size: 64,
        }
    }
}

impl QueueConfig {
    pub fn builder() -> QueueConfigBuilder {
        QueueConfigBuilder::default()
    }

    /// Full path of the queue file.
    pub fn queue_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.file_name)
    }

    fn validate(&self) -> Result<()> {
        if self.file_name.is_empty() {
            return Err(QueueError::InvalidConfig {
                reason: String::from("file_name must not be empty"),
            });
        }
        if self.capacity == 0 {
            return Err(QueueError::InvalidConfig {
                reason: String::from("capacity must be greater than zero"),
            });
        }
        if self.slot_size == 0 {
            return Err(QueueError::InvalidConfig {
                reason: String::from("slot_size must be greater than zero"),
            });
        }
        // Head and tail offsets are persisted as 32-bit-ranged words, so
        // the whole data region must stay below that bound.
        let region = u64::from(self.capacity) * u64::from(self.slot_size)
            + format::CONTROL_BLOCK_SIZE;
        if region > u64::from(u32::MAX) {
            return Err(QueueError::InvalidConfig {
                reason: format!("data region of {region} bytes exceeds the addressable range"),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct QueueConfigBuilder {
    config: QueueConfig,
}

impl QueueConfigBuilder {
    pub fn data_dir(mut self, data_dir: impl Into<String>) -> Self {
        self.config.data_dir = data_dir.into();
        self
    }

    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.config.file_name = file_name.into();
        self
    }

    pub fn schema_id(mut self, schema_id: u64) -> Self {
        self.config.schema_id = schema_id;
        self
    }

    pub fn capacity(mut self, capacity: u32) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn slot_size(mut self, slot_size: u32) -> Self {
        self.config.slot_size = slot_size;
        self
    }

    pub fn build(self) -> Result<QueueConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Create the configured queue file if it does not exist, or reuse an
/// existing one with matching geometry, and bring up the ring over it.
pub fn create_context(cfg: &QueueConfig) -> Result<MemoryMappedQueue> {
    cfg.validate()?;
    let file = QueueFile::create(
        cfg.queue_path(),
        cfg.schema_id,
        cfg.capacity,
        cfg.slot_size,
        false,
    )?;
    MemoryMappedQueue::new(file)
}

/// Open the configured queue file, which must already exist and validate.
pub fn open_context(cfg: &QueueConfig) -> Result<MemoryMappedQueue> {
    cfg.validate()?;
    MemoryMappedQueue::new(QueueFile::open(cfg.queue_path())?)
}
