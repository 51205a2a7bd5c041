//! Request data model.
//!
//! A [`FileRequest`] is one node of the request graph: a [`RequestPayload`]
//! describing the work, a [`RequestStatus`], and links to its parent request
//! and owning stage. The types here hold no locks of their own and never
//! reach into other nodes; cross-node bookkeeping (dependency counts,
//! finalization, cancellation) lives in [`crate::graph`].
//!
//! # Payload kinds
//!
//! | Kind | Purpose |
//! |------|---------|
//! | `RequestLink` | Wraps an [`ExternalRequest`] owned by a caller outside the pipeline |
//! | `Read` | Byte-range read into an [`OutputBuffer`] |
//! | `CompressedRead` | Read that decompresses before extracting a window |
//! | `Wait` | Synchronization point held open by a stage |
//! | `Cancel` | Asks for early termination of another live request |

mod buffer;
mod external;
mod id;
mod node;
mod payload;
mod status;

pub use buffer::OutputBuffer;
pub use external::{sync_signal, CompletionHandle, ExternalRequest, SyncSignal, SyncWaiter};
pub use id::{RequestId, StageId};
pub use node::{FileRequest, RequestUsage};
pub use payload::{
    CancelData, CompressedReadData, CompressionInfo, ReadData, RequestKind, RequestLinkData,
    RequestPayload,
};
pub use status::RequestStatus;
