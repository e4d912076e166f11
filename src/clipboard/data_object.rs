//! Virtual File Data Object
//!
//! What the paste target sees: a descriptor format announcing one file and a
//! contents format handing out the pull stream. Formats are a closed set
//! dispatched through a static table.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::clipboard::buffer::{BufferCoordinator, TransferAdvertiser};
use crate::clipboard::descriptor::{build_group, FileDescriptor};
use crate::clipboard::error::{ClipboardError, Result};
use crate::clipboard::operation::{AsyncOperation, OperationHandler};
use crate::clipboard::stream::FileContentsStream;

/// Registered name of the descriptor format
pub const CFSTR_FILEDESCRIPTORW: &str = "FileGroupDescriptorW";
/// Registered name of the contents format
pub const CFSTR_FILECONTENTS: &str = "FileContents";

/// Formats offered by the virtual file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VirtualFormat {
    /// FileGroupDescriptorW with one FILEDESCRIPTORW
    FileGroupDescriptor,
    /// Content stream of the file
    FileContents,
}

impl VirtualFormat {
    /// Registered clipboard format name
    pub fn name(&self) -> &'static str {
        match self {
            Self::FileGroupDescriptor => CFSTR_FILEDESCRIPTORW,
            Self::FileContents => CFSTR_FILECONTENTS,
        }
    }

    /// Look up by registered name
    pub fn from_name(name: &str) -> Option<Self> {
        FORMAT_TABLE
            .iter()
            .map(|entry| entry.format)
            .find(|format| format.name() == name)
    }
}

/// Storage medium of a format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Medium {
    /// Global memory block
    HGlobal,
    /// Pull stream
    Stream,
}

impl Medium {
    /// Medium name used in errors and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HGlobal => "HGLOBAL",
            Self::Stream => "ISTREAM",
        }
    }
}

/// Data returned for a format
#[derive(Debug, Clone)]
pub enum ClipboardData {
    /// Memory block contents
    Global(Vec<u8>),
    /// Shared content stream
    Stream(Arc<FileContentsStream>),
}

/// What gets registered with the OS clipboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardOffer {
    /// Display name
    pub name: String,
    /// Declared size
    pub size: u64,
    /// Offered format names, in preference order
    pub formats: Vec<&'static str>,
}

/// OS clipboard registration
#[cfg_attr(test, mockall::automock)]
pub trait ClipboardPublisher: Send + Sync {
    /// Place (or replace) the virtual file on the clipboard
    fn publish(&self, offer: &ClipboardOffer) -> Result<()>;

    /// Remove the virtual file from the clipboard
    fn withdraw(&self) -> Result<()>;
}

type FormatHandler = fn(&VirtualFileObject, u32) -> Result<ClipboardData>;

struct FormatEntry {
    format: VirtualFormat,
    medium: Medium,
    handler: FormatHandler,
}

static FORMAT_TABLE: [FormatEntry; 2] = [
    FormatEntry {
        format: VirtualFormat::FileGroupDescriptor,
        medium: Medium::HGlobal,
        handler: VirtualFileObject::descriptor_data,
    },
    FormatEntry {
        format: VirtualFormat::FileContents,
        medium: Medium::Stream,
        handler: VirtualFileObject::contents_data,
    },
];

/// Clipboard object representing the current transfer
pub struct VirtualFileObject {
    coordinator: Arc<BufferCoordinator>,
    publisher: Option<Arc<dyn ClipboardPublisher>>,
    retry_backoff: Duration,
    descriptor: Mutex<Option<FileDescriptor>>,
    stream: Mutex<Option<Arc<FileContentsStream>>>,
    operation: AsyncOperation,
}

impl VirtualFileObject {
    /// Create the object and register it to be refreshed on every start
    pub fn new(
        coordinator: Arc<BufferCoordinator>,
        publisher: Option<Arc<dyn ClipboardPublisher>>,
        retry_backoff: Duration,
    ) -> Arc<Self> {
        let handler: Weak<BufferCoordinator> = Arc::downgrade(&coordinator);
        let handler: Weak<dyn OperationHandler> = handler;
        let object = Arc::new(Self {
            coordinator: Arc::clone(&coordinator),
            publisher,
            retry_backoff,
            descriptor: Mutex::new(None),
            stream: Mutex::new(None),
            operation: AsyncOperation::new(handler),
        });

        let advertiser: Weak<VirtualFileObject> = Arc::downgrade(&object);
        let advertiser: Weak<dyn TransferAdvertiser> = advertiser;
        coordinator.set_advertiser(advertiser);
        object
    }

    /// Async-operation interface of this object
    pub fn operation(&self) -> &AsyncOperation {
        &self.operation
    }

    /// Offered formats in preference order
    pub fn enum_formats(&self) -> Vec<(VirtualFormat, Medium)> {
        FORMAT_TABLE
            .iter()
            .map(|entry| (entry.format, entry.medium))
            .collect()
    }

    /// Check whether `get_data` would succeed for this format and medium
    pub fn query_get_data(&self, format: VirtualFormat, medium: Medium) -> Result<()> {
        self.entry(format, medium).map(|_| ())
    }

    /// Produce the data for a format. `index` selects the file (only 0 exists).
    pub fn get_data(&self, format: VirtualFormat, medium: Medium, index: u32) -> Result<ClipboardData> {
        let entry = self.entry(format, medium)?;
        debug!("get_data {} ({}) index {}", format.name(), medium.as_str(), index);
        (entry.handler)(self, index)
    }

    /// `get_data` keyed by registered format name
    pub fn get_data_by_name(&self, name: &str, medium: Medium, index: u32) -> Result<ClipboardData> {
        let format = VirtualFormat::from_name(name)
            .ok_or_else(|| ClipboardError::UnsupportedFormat(name.to_string()))?;
        self.get_data(format, medium, index)
    }

    /// Remove the object from the OS clipboard
    pub fn withdraw(&self) -> Result<()> {
        match &self.publisher {
            Some(publisher) => publisher.withdraw(),
            None => Ok(()),
        }
    }

    fn entry(&self, format: VirtualFormat, medium: Medium) -> Result<&'static FormatEntry> {
        let entry = FORMAT_TABLE
            .iter()
            .find(|entry| entry.format == format)
            .ok_or_else(|| ClipboardError::UnsupportedFormat(format.name().to_string()))?;

        if entry.medium != medium {
            return Err(ClipboardError::UnsupportedMedium {
                format: format.name().to_string(),
                medium: medium.as_str().to_string(),
            });
        }
        Ok(entry)
    }

    fn descriptor_data(&self, _index: u32) -> Result<ClipboardData> {
        let descriptor = self
            .descriptor
            .lock()
            .clone()
            .ok_or(ClipboardError::TransferInactive)?;
        Ok(ClipboardData::Global(build_group(&[descriptor])))
    }

    fn contents_data(&self, index: u32) -> Result<ClipboardData> {
        if index != 0 {
            return Err(ClipboardError::UnsupportedFormat(format!(
                "{} index {}",
                CFSTR_FILECONTENTS, index
            )));
        }
        if self.descriptor.lock().is_none() {
            return Err(ClipboardError::TransferInactive);
        }

        let mut slot = self.stream.lock();
        let stream = match slot.as_ref() {
            Some(stream) => {
                // Re-query starts over when nothing was delivered yet
                stream.rewind();
                Arc::clone(stream)
            }
            None => {
                let stream = Arc::new(FileContentsStream::new(
                    Arc::clone(&self.coordinator),
                    self.retry_backoff,
                ));
                *slot = Some(Arc::clone(&stream));
                stream
            }
        };
        Ok(ClipboardData::Stream(stream))
    }
}

impl TransferAdvertiser for VirtualFileObject {
    fn advertise(&self, name: &str, total_size: u64) {
        *self.descriptor.lock() = Some(FileDescriptor::for_transfer(name, total_size, Utc::now()));
        *self.stream.lock() = None;

        let Some(publisher) = &self.publisher else {
            return;
        };
        let offer = ClipboardOffer {
            name: name.to_string(),
            size: total_size,
            formats: FORMAT_TABLE.iter().map(|entry| entry.format.name()).collect(),
        };
        match publisher.publish(&offer) {
            Ok(()) => info!("Virtual file '{}' placed on clipboard", name),
            Err(e) => error!("Failed to place virtual file on clipboard: {}", e),
        }
    }
}

impl std::fmt::Debug for VirtualFileObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualFileObject")
            .field("descriptor", &*self.descriptor.lock())
            .field("operation", &self.operation)
            .finish()
    }
}
