//! On-disk format of a memory mapped queue file (`.mmqf`).
//!
//! All values little-endian:
//!
//! ```text
//!  +00 8B magic value [NUL M M Q F EOT SUB \n]
//!  +08 1B version (currently 0)
//!  +09 4B CRC32 checksum of the header bytes that follow
//!  +13 8B length of the file
//!  +21 8B schema id of the stored elements
//!  +29 4B capacity of the queue
//!  +33 4B slot size of one serialized element
//!  +37 2B offset to data
//!  +39 .. data (32-byte control block, then capacity x slot_size bytes)
//! ```
//!
//! Magic and version identify the file; the checksum covers everything that
//! describes the queue's geometry and identity, so a flipped bit in any of
//! those fields is caught before the ring engine interprets them.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use fs2::FileExt;

use crate::codec;
use crate::errors::{QueueError, Result};

/// File extension for queue files.
pub const FILE_EXTENSION: &str = "mmqf";

/// Magic value identifying a queue file.
pub const MAGIC: [u8; 8] = [0x00, 0x4D, 0x4D, 0x51, 0x46, 0x03, 0x1A, 0x0A];

/// Current version of the format.
pub const VERSION: u8 = 0x00;

/// Minimum version this code can read.
pub const MIN_SUPPORTED_VERSION: u8 = 0x00;

/// Size of the control block at the start of the data region.
pub const CONTROL_BLOCK_SIZE: u64 = 32;

pub(crate) const POS_MAGIC: usize = 0;
pub(crate) const LEN_MAGIC: usize = 8;
pub(crate) const POS_VERSION: usize = POS_MAGIC + LEN_MAGIC;
pub(crate) const POS_CHECKSUM: usize = POS_VERSION + 1;
pub(crate) const POS_LENGTH: usize = POS_CHECKSUM + 4;
pub(crate) const POS_SCHEMA_ID: usize = POS_LENGTH + 8;
pub(crate) const POS_CAPACITY: usize = POS_SCHEMA_ID + 8;
pub(crate) const POS_SLOT_SIZE: usize = POS_CAPACITY + 4;
pub(crate) const POS_DATA_OFFSET: usize = POS_SLOT_SIZE + 4;

/// Header size, which is also the data offset for version 0 files.
pub const HEADER_SIZE: usize = POS_DATA_OFFSET + 2;

/// Create a queue file at `path`, overwriting any existing content.
///
/// The file is sized for the full data region up front and the header is
/// written under an exclusive advisory lock: magic and version first, then
/// the geometry fields, then the checksum over them. The lock is released
/// once the header is complete; normal queue traffic never takes it.
pub fn create(path: &Path, schema_id: u64, slot_size: u32, capacity: u32) -> Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)?;

    file.try_lock_exclusive()
        .map_err(|_| QueueError::LockUnavailable {
            path: path.to_path_buf(),
        })?;

    let result = write_header(&file, schema_id, slot_size, capacity);
    let _ = FileExt::unlock(&file);
    result?;
    Ok(file)
}

fn write_header(mut file: &File, schema_id: u64, slot_size: u32, capacity: u32) -> Result<()> {
    let data_size = u64::from(slot_size) * u64::from(capacity) + CONTROL_BLOCK_SIZE;
    let length = HEADER_SIZE as u64 + data_size;
    file.set_len(length)?;

    let mut prelude = [0u8; POS_CHECKSUM];
    prelude[POS_MAGIC..POS_MAGIC + LEN_MAGIC].copy_from_slice(&MAGIC);
    prelude[POS_VERSION] = VERSION;
    file.seek(SeekFrom::Start(POS_MAGIC as u64))?;
    std::io::Write::write_all(&mut file, &prelude)?;

    // The checksum window: every field from length through data offset.
    let mut geometry = [0u8; HEADER_SIZE - POS_LENGTH];
    codec::write_u64(&mut geometry, POS_LENGTH - POS_LENGTH, length);
    codec::write_u64(&mut geometry, POS_SCHEMA_ID - POS_LENGTH, schema_id);
    codec::write_u32(&mut geometry, POS_CAPACITY - POS_LENGTH, capacity);
    codec::write_u32(&mut geometry, POS_SLOT_SIZE - POS_LENGTH, slot_size);
    codec::write_u16(&mut geometry, POS_DATA_OFFSET - POS_LENGTH, HEADER_SIZE as u16);
    file.seek(SeekFrom::Start(POS_LENGTH as u64))?;
    std::io::Write::write_all(&mut file, &geometry)?;

    let mut checksum = [0u8; 4];
    codec::write_u32(&mut checksum, 0, crc32fast::hash(&geometry));
    file.seek(SeekFrom::Start(POS_CHECKSUM as u64))?;
    std::io::Write::write_all(&mut file, &checksum)?;

    Ok(())
}

/// Validate that `file` is a queue file this code can read.
///
/// Checks, in order: magic value, version range, header checksum, and that
/// the recorded file length matches the actual one. Accessors below do not
/// re-validate; call this first.
pub fn validate(file: &File) -> Result<()> {
    let actual_len = file.metadata()?.len();
    if actual_len < HEADER_SIZE as u64 {
        return Err(QueueError::invalid_format("file too short for header"));
    }

    let mut header = [0u8; HEADER_SIZE];
    read_at(file, POS_MAGIC, &mut header)?;

    if header[POS_MAGIC..POS_MAGIC + LEN_MAGIC] != MAGIC {
        return Err(QueueError::invalid_format("magic value does not match"));
    }

    let found = header[POS_VERSION];
    if !(MIN_SUPPORTED_VERSION..=VERSION).contains(&found) {
        return Err(QueueError::VersionUnsupported {
            found,
            min: MIN_SUPPORTED_VERSION,
            current: VERSION,
        });
    }

    // The checksum window is fixed for the versions this code accepts, so
    // a corrupted geometry field (data offset included) always surfaces
    // as a checksum mismatch rather than as a secondary range error.
    let recorded = codec::read_u32(&header, POS_CHECKSUM);
    let computed = crc32fast::hash(&header[POS_LENGTH..HEADER_SIZE]);
    if recorded != computed {
        return Err(QueueError::ChecksumMismatch { recorded, computed });
    }

    let recorded_len = codec::read_u64(&header, POS_LENGTH);
    if recorded_len != actual_len {
        return Err(QueueError::FileTruncated {
            recorded: recorded_len,
            actual: actual_len,
        });
    }

    let data_offset = u64::from(codec::read_u16(&header, POS_DATA_OFFSET));
    if data_offset < HEADER_SIZE as u64 || data_offset > actual_len {
        return Err(QueueError::invalid_format("data offset out of range"));
    }

    Ok(())
}

pub fn version(file: &File) -> Result<u8> {
    let mut b = [0u8; 1];
    read_at(file, POS_VERSION, &mut b)?;
    Ok(b[0])
}

pub fn data_offset(file: &File) -> Result<u16> {
    let mut b = [0u8; 2];
    read_at(file, POS_DATA_OFFSET, &mut b)?;
    Ok(codec::read_u16(&b, 0))
}

pub fn schema_id(file: &File) -> Result<u64> {
    let mut b = [0u8; 8];
    read_at(file, POS_SCHEMA_ID, &mut b)?;
    Ok(codec::read_u64(&b, 0))
}

pub fn capacity(file: &File) -> Result<u32> {
    let mut b = [0u8; 4];
    read_at(file, POS_CAPACITY, &mut b)?;
    Ok(codec::read_u32(&b, 0))
}

pub fn slot_size(file: &File) -> Result<u32> {
    let mut b = [0u8; 4];
    read_at(file, POS_SLOT_SIZE, &mut b)?;
    Ok(codec::read_u32(&b, 0))
}

fn read_at(mut file: &File, pos: usize, buf: &mut [u8]) -> Result<()> {
    file.seek(SeekFrom::Start(pos as u64))?;
    file.read_exact(buf)?;
    Ok(())
}
