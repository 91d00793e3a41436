//! Queue file container: owns the open file and the mapping of its data
//! region.
//!
//! A `QueueFile` caches the geometry fields after validation and exposes
//! the data region (control block plus slots) as one read-write mapping.
//! Everything the ring engine does goes through that mapping; writes are
//! observable process-wide immediately, and reach disk when the OS writes
//! the pages back or [`QueueFile::flush`] forces it.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};
use tracing::debug;

use crate::errors::{QueueError, Result};
use crate::format;

/// An open, validated queue file with its data region mapped.
#[derive(Debug)]
pub struct QueueFile {
    file: File,
    path: PathBuf,
    map: MmapMut,
    version: u8,
    data_offset: u16,
    schema_id: u64,
    capacity: u32,
    slot_size: u32,
}

impl QueueFile {
    /// Open an existing queue file.
    ///
    /// The file must exist and pass [`format::validate`]; geometry fields
    /// are cached and the data region is mapped read-write.
    pub fn open(path: impl AsRef<Path>) -> Result<QueueFile> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        format::validate(&file)?;
        Self::from_validated(file, path)
    }

    /// Create a queue file, or reuse a compatible existing one.
    ///
    /// With `overwrite` set, any existing file is replaced. Without it, an
    /// existing file is validated and must record the same capacity and
    /// slot size as requested (`GeometryMismatch` otherwise); its contents,
    /// schema id included, are left untouched.
    pub fn create(
        path: impl AsRef<Path>,
        schema_id: u64,
        capacity: u32,
        slot_size: u32,
        overwrite: bool,
    ) -> Result<QueueFile> {
        let path = path.as_ref().to_path_buf();
        if !overwrite && path.exists() {
            let existing = Self::open(&path)?;
            if existing.capacity != capacity || existing.slot_size != slot_size {
                return Err(QueueError::GeometryMismatch {
                    file_capacity: existing.capacity,
                    file_slot_size: existing.slot_size,
                    requested_capacity: capacity,
                    requested_slot_size: slot_size,
                });
            }
            return Ok(existing);
        }

        let file = format::create(&path, schema_id, slot_size, capacity)?;
        debug!(
            path = %path.display(),
            schema_id,
            capacity,
            slot_size,
            "created queue file"
        );
        Self::from_validated(file, path)
    }

    /// Create a queue file, failing if the path already exists.
    pub fn create_new(
        path: impl AsRef<Path>,
        schema_id: u64,
        capacity: u32,
        slot_size: u32,
    ) -> Result<QueueFile> {
        let path = path.as_ref();
        if path.exists() {
            return Err(QueueError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        Self::create(path, schema_id, capacity, slot_size, true)
    }

    fn from_validated(file: File, path: PathBuf) -> Result<QueueFile> {
        let version = format::version(&file)?;
        let data_offset = format::data_offset(&file)?;
        let schema_id = format::schema_id(&file)?;
        let capacity = format::capacity(&file)?;
        let slot_size = format::slot_size(&file)?;

        let length = file.metadata()?.len();
        let region_len = (length - u64::from(data_offset)) as usize;
        // SAFETY: the mapping stays valid for the life of `file`, which this
        // struct owns; the file was sized by `format::create` and validated.
        let map = unsafe {
            MmapOptions::new()
                .offset(u64::from(data_offset))
                .len(region_len)
                .map_mut(&file)?
        };

        debug!(path = %path.display(), capacity, slot_size, "mapped queue file");
        Ok(QueueFile {
            file,
            path,
            map,
            version,
            data_offset,
            schema_id,
            capacity,
            slot_size,
        })
    }

    /// The mapped data region: 32-byte control block followed by the slots.
    pub fn data_region(&self) -> &[u8] {
        &self.map
    }

    /// Mutable view of the mapped data region.
    pub fn data_region_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }

    /// Base pointer of the mapped data region, for callers that write
    /// disjoint ranges from several threads.
    pub(crate) fn region_ptr(&mut self) -> *mut u8 {
        self.map.as_mut_ptr()
    }

    /// Schedule all mapped pages for write-back and wait for completion.
    pub fn flush(&self) -> Result<()> {
        self.map.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn data_offset(&self) -> u16 {
        self.data_offset
    }

    pub fn schema_id(&self) -> u64 {
        self.schema_id
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn slot_size(&self) -> u32 {
        self.slot_size
    }

    /// Current length of the backing file in bytes.
    pub fn file_len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}
