//! File descriptor encoding
//!
//! Builds the `FileGroupDescriptorW` payload that announces the virtual file
//! (name, size, timestamps) before any content is pulled.
//!
//! # Layout
//!
//! ```text
//! FileGroupDescriptorW            FILEDESCRIPTORW (592 bytes)
//! Offset | Size | Field           Offset | Size | Field
//! -------|------|------           -------|------|------
//! 0      | 4    | cItems          0      | 4    | dwFlags
//! 4      | 592  | fgd[0]          4      | 32   | clsid, sizel, pointl (unused)
//! 596    | 592  | fgd[1]          36     | 4    | dwFileAttributes
//! ...                             40     | 8    | ftCreationTime
//!                                 48     | 8    | ftLastAccessTime
//!                                 56     | 8    | ftLastWriteTime
//!                                 64     | 8    | nFileSizeHigh, nFileSizeLow
//!                                 72     | 520  | cFileName (UTF-16, NUL-terminated)
//! ```

use chrono::{DateTime, Utc};

use crate::clipboard::error::{ClipboardError, Result};

/// Size of one FILEDESCRIPTORW
pub const DESCRIPTOR_SIZE: usize = 592;

/// UTF-16 units in `cFileName`, terminator included
const NAME_UNITS: usize = 260;

/// Seconds between 1601-01-01 and 1970-01-01
const FILETIME_UNIX_OFFSET_SECS: i64 = 11_644_473_600;

/// FILE_ATTRIBUTE_NORMAL
pub const FILE_ATTRIBUTE_NORMAL: u32 = 0x80;

/// FILEDESCRIPTORW `dwFlags`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileDescriptorFlags(u32);

impl FileDescriptorFlags {
    /// File attributes are present
    pub const ATTRIBUTES: u32 = 0x0000_0001;
    /// Creation time is present
    pub const CREATETIME: u32 = 0x0000_0002;
    /// Access time is present
    pub const ACCESSTIME: u32 = 0x0000_0010;
    /// Write time is present
    pub const WRITESTIME: u32 = 0x0000_0020;
    /// File size is present
    pub const FILESIZE: u32 = 0x0000_0040;
    /// Target should show a progress dialog
    pub const PROGRESSUI: u32 = 0x0000_4000;

    /// Create from raw flags value
    pub fn from_raw(flags: u32) -> Self {
        Self(flags)
    }

    /// Raw flags value
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Check if a flag is set
    pub fn has_flag(&self, flag: u32) -> bool {
        (self.0 & flag) != 0
    }
}

/// Convert a timestamp to FILETIME (100ns intervals since 1601-01-01)
pub fn to_filetime(time: DateTime<Utc>) -> u64 {
    let secs = time.timestamp() + FILETIME_UNIX_OFFSET_SECS;
    (secs.max(0) as u64) * 10_000_000 + u64::from(time.timestamp_subsec_nanos() / 100)
}

/// Convert FILETIME back to a timestamp
pub fn from_filetime(filetime: u64) -> Option<DateTime<Utc>> {
    let secs = (filetime / 10_000_000) as i64 - FILETIME_UNIX_OFFSET_SECS;
    let nanos = ((filetime % 10_000_000) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
}

/// One virtual file as announced to the paste target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Which fields are valid
    pub flags: FileDescriptorFlags,
    /// FILE_ATTRIBUTE_* bits
    pub attributes: u32,
    /// Creation FILETIME
    pub creation_time: Option<u64>,
    /// Last access FILETIME
    pub access_time: Option<u64>,
    /// Last write FILETIME
    pub write_time: Option<u64>,
    /// Declared size
    pub size: Option<u64>,
    /// Display name
    pub name: String,
}

impl FileDescriptor {
    /// Descriptor for a virtual file created at `now`
    pub fn for_transfer(name: &str, size: u64, now: DateTime<Utc>) -> Self {
        let stamp = to_filetime(now);
        Self {
            flags: FileDescriptorFlags::from_raw(
                FileDescriptorFlags::FILESIZE
                    | FileDescriptorFlags::ATTRIBUTES
                    | FileDescriptorFlags::CREATETIME
                    | FileDescriptorFlags::WRITESTIME
                    | FileDescriptorFlags::PROGRESSUI,
            ),
            attributes: FILE_ATTRIBUTE_NORMAL,
            creation_time: Some(stamp),
            access_time: Some(stamp),
            write_time: Some(stamp),
            size: Some(size),
            name: name.to_string(),
        }
    }

    /// Encode as a 592-byte FILEDESCRIPTORW
    ///
    /// Names longer than 259 UTF-16 units are truncated.
    pub fn to_bytes(&self) -> [u8; DESCRIPTOR_SIZE] {
        let mut data = [0u8; DESCRIPTOR_SIZE];

        data[0..4].copy_from_slice(&self.flags.bits().to_le_bytes());
        data[36..40].copy_from_slice(&self.attributes.to_le_bytes());
        data[40..48].copy_from_slice(&self.creation_time.unwrap_or(0).to_le_bytes());
        data[48..56].copy_from_slice(&self.access_time.unwrap_or(0).to_le_bytes());
        data[56..64].copy_from_slice(&self.write_time.unwrap_or(0).to_le_bytes());

        let size = self.size.unwrap_or(0);
        data[64..68].copy_from_slice(&((size >> 32) as u32).to_le_bytes());
        data[68..72].copy_from_slice(&(size as u32).to_le_bytes());

        for (i, unit) in self.name.encode_utf16().take(NAME_UNITS - 1).enumerate() {
            let offset = 72 + i * 2;
            data[offset..offset + 2].copy_from_slice(&unit.to_le_bytes());
        }

        data
    }

    /// Decode one FILEDESCRIPTORW
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < DESCRIPTOR_SIZE {
            return Err(ClipboardError::MalformedDescriptor(format!(
                "FILEDESCRIPTORW too small: {} bytes (need {})",
                data.len(),
                DESCRIPTOR_SIZE
            )));
        }

        let u32_at = |at: usize| u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
        let u64_at = |at: usize| (u64::from(u32_at(at + 4)) << 32) | u64::from(u32_at(at));

        let flags = FileDescriptorFlags::from_raw(u32_at(0));
        let present = |flag: u32, value: u64| flags.has_flag(flag).then_some(value);

        let units: Vec<u16> = data[72..DESCRIPTOR_SIZE]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .take_while(|&unit| unit != 0)
            .collect();
        let name = String::from_utf16(&units)
            .map_err(|_| ClipboardError::MalformedDescriptor("file name is not UTF-16".to_string()))?;

        Ok(Self {
            flags,
            attributes: u32_at(36),
            creation_time: present(FileDescriptorFlags::CREATETIME, u64_at(40)),
            access_time: present(FileDescriptorFlags::ACCESSTIME, u64_at(48)),
            write_time: present(FileDescriptorFlags::WRITESTIME, u64_at(56)),
            size: present(
                FileDescriptorFlags::FILESIZE,
                (u64::from(u32_at(64)) << 32) | u64::from(u32_at(68)),
            ),
            name,
        })
    }
}

/// Encode a FileGroupDescriptorW
pub fn build_group(descriptors: &[FileDescriptor]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + descriptors.len() * DESCRIPTOR_SIZE);
    data.extend_from_slice(&(descriptors.len() as u32).to_le_bytes());
    for descriptor in descriptors {
        data.extend_from_slice(&descriptor.to_bytes());
    }
    data
}

/// Decode a FileGroupDescriptorW
pub fn parse_group(data: &[u8]) -> Result<Vec<FileDescriptor>> {
    if data.len() < 4 {
        return Err(ClipboardError::MalformedDescriptor(
            "FileGroupDescriptorW too small for count".to_string(),
        ));
    }

    let count = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let expected = 4 + count * DESCRIPTOR_SIZE;
    if data.len() < expected {
        return Err(ClipboardError::MalformedDescriptor(format!(
            "FileGroupDescriptorW too small: {} bytes (need {} for {} files)",
            data.len(),
            expected,
            count
        )));
    }

    data[4..expected]
        .chunks_exact(DESCRIPTOR_SIZE)
        .map(FileDescriptor::parse)
        .collect()
}
