//! The kinds of work a request can represent.
//!
//! A request carries exactly one [`RequestPayload`]. The payload is set when
//! the request is created and stays fixed afterwards, with two exceptions
//! handled by the graph: the owning stage may narrow a read's byte range while
//! the request is live, and borrowed output buffers are dropped when the
//! request finishes.

use super::buffer::OutputBuffer;
use super::external::{ExternalRequest, SyncSignal};
use super::id::RequestId;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Discriminant of a [`RequestPayload`], for logging and diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
    None,
    RequestLink,
    Read,
    CompressedRead,
    Wait,
    Cancel,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::RequestLink => write!(f, "request_link"),
            Self::Read => write!(f, "read"),
            Self::CompressedRead => write!(f, "compressed_read"),
            Self::Wait => write!(f, "wait"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}

// =============================================================================
// Payload Data
// =============================================================================

/// Bridges a caller-owned request into the graph.
#[derive(Debug)]
pub struct RequestLinkData {
    request: ExternalRequest,
    cancel_signal: Option<SyncSignal>,
}

impl RequestLinkData {
    pub(crate) fn new(request: ExternalRequest, cancel_signal: Option<SyncSignal>) -> Self {
        Self {
            request,
            cancel_signal,
        }
    }

    /// The caller's request.
    pub fn request(&self) -> &ExternalRequest {
        &self.request
    }

    /// True until the link has been finalized and its signal fired.
    pub fn has_cancel_signal(&self) -> bool {
        self.cancel_signal.is_some()
    }

    pub(crate) fn take_cancel_signal(&mut self) -> Option<SyncSignal> {
        self.cancel_signal.take()
    }
}

/// A plain byte-range read.
#[derive(Debug)]
pub struct ReadData {
    output: Option<OutputBuffer>,
    path: Arc<Path>,
    offset: u64,
    size: u64,
}

impl ReadData {
    pub(crate) fn new(output: OutputBuffer, path: Arc<Path>, offset: u64, size: u64) -> Self {
        Self {
            output: Some(output),
            path,
            offset,
            size,
        }
    }

    /// Destination buffer; `None` once the request has finished.
    pub fn output(&self) -> Option<&OutputBuffer> {
        self.output.as_ref()
    }

    pub fn path(&self) -> &Arc<Path> {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Describes where compressed data lives and how large it decompresses.
///
/// The graph stores this verbatim; only the stage that knows the codec
/// interprets it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompressionInfo {
    /// Codec tag, e.g. `"zstd"` or `"zlib"`.
    pub codec: String,
    /// Archive containing the compressed block.
    pub archive_path: Arc<Path>,
    /// Offset of the compressed block inside the archive.
    pub offset: u64,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl CompressionInfo {
    pub fn new(
        codec: impl Into<String>,
        archive_path: impl Into<Arc<Path>>,
        offset: u64,
        compressed_size: u64,
        uncompressed_size: u64,
    ) -> Self {
        Self {
            codec: codec.into(),
            archive_path: archive_path.into(),
            offset,
            compressed_size,
            uncompressed_size,
        }
    }

    /// Returns true if `[offset, offset + size)` lies inside the decompressed data.
    pub fn covers(&self, offset: u64, size: u64) -> bool {
        offset
            .checked_add(size)
            .is_some_and(|end| end <= self.uncompressed_size)
    }
}

/// A read that decompresses before extracting the requested window.
#[derive(Debug)]
pub struct CompressedReadData {
    compression: Arc<CompressionInfo>,
    output: Option<OutputBuffer>,
    read_offset: u64,
    read_size: u64,
}

impl CompressedReadData {
    pub(crate) fn new(
        compression: Arc<CompressionInfo>,
        output: OutputBuffer,
        read_offset: u64,
        read_size: u64,
    ) -> Self {
        Self {
            compression,
            output: Some(output),
            read_offset,
            read_size,
        }
    }

    pub fn compression(&self) -> &Arc<CompressionInfo> {
        &self.compression
    }

    /// Destination buffer; `None` once the request has finished.
    pub fn output(&self) -> Option<&OutputBuffer> {
        self.output.as_ref()
    }

    /// Offset into the decompressed stream.
    pub fn read_offset(&self) -> u64 {
        self.read_offset
    }

    pub fn read_size(&self) -> u64 {
        self.read_size
    }
}

/// Names the request a cancel operation is aimed at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CancelData {
    target: RequestId,
}

impl CancelData {
    pub(crate) fn new(target: RequestId) -> Self {
        Self { target }
    }

    pub fn target(&self) -> RequestId {
        self.target
    }
}

// =============================================================================
// Payload
// =============================================================================

/// The work a request represents.
#[derive(Debug, Default)]
pub enum RequestPayload {
    /// Freshly constructed or recycled; never visible to a consumer.
    #[default]
    None,
    RequestLink(RequestLinkData),
    Read(ReadData),
    CompressedRead(CompressedReadData),
    /// Synchronization point held open by a stage until explicitly finished.
    Wait,
    Cancel(CancelData),
}

impl RequestPayload {
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::None => RequestKind::None,
            Self::RequestLink(_) => RequestKind::RequestLink,
            Self::Read(_) => RequestKind::Read,
            Self::CompressedRead(_) => RequestKind::CompressedRead,
            Self::Wait => RequestKind::Wait,
            Self::Cancel(_) => RequestKind::Cancel,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn as_link(&self) -> Option<&RequestLinkData> {
        match self {
            Self::RequestLink(link) => Some(link),
            _ => None,
        }
    }

    pub fn as_read(&self) -> Option<&ReadData> {
        match self {
            Self::Read(read) => Some(read),
            _ => None,
        }
    }

    pub fn as_compressed_read(&self) -> Option<&CompressedReadData> {
        match self {
            Self::CompressedRead(read) => Some(read),
            _ => None,
        }
    }

    pub fn as_cancel(&self) -> Option<&CancelData> {
        match self {
            Self::Cancel(cancel) => Some(cancel),
            _ => None,
        }
    }

    /// Borrowed destination buffer, if this payload still holds one.
    pub fn output_buffer(&self) -> Option<&OutputBuffer> {
        match self {
            Self::Read(read) => read.output(),
            Self::CompressedRead(read) => read.output(),
            _ => None,
        }
    }

    pub(crate) fn as_link_mut(&mut self) -> Option<&mut RequestLinkData> {
        match self {
            Self::RequestLink(link) => Some(link),
            _ => None,
        }
    }

    /// Narrows the byte range of a read. Returns false for other payloads.
    pub(crate) fn narrow_range(&mut self, offset: u64, size: u64) -> bool {
        match self {
            Self::Read(read) => {
                read.offset = offset;
                read.size = size;
                true
            }
            Self::CompressedRead(read) => {
                read.read_offset = offset;
                read.read_size = size;
                true
            }
            _ => false,
        }
    }

    /// Current byte range of a read payload.
    pub(crate) fn range(&self) -> Option<(u64, u64)> {
        match self {
            Self::Read(read) => Some((read.offset, read.size)),
            Self::CompressedRead(read) => Some((read.read_offset, read.read_size)),
            _ => None,
        }
    }

    /// Drops references to caller-owned buffers.
    pub(crate) fn release_borrows(&mut self) {
        match self {
            Self::Read(read) => read.output = None,
            Self::CompressedRead(read) => read.output = None,
            _ => {}
        }
    }
}
