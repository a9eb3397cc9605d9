//! Domain types for the render-grid client.

pub mod digest;
pub mod error;
pub mod render;
pub mod resource;
pub mod snapshot;

pub use digest::{Digest, HASH_FORMAT};
pub use error::{GridError, Result};
pub use render::{
    BookedRenderer, CancelSignal, NativeMeta, Offset, Region, RenderRequest, RenderResult,
    RenderSettings, RenderStatus, RenderTarget, RenderTargetKind, RendererSettings, Size,
    StartedRender, WireRenderInfo, WireRenderRequest,
};
pub use resource::{
    ContentResource, FailedResource, PendingResource, Resource, ResourceHandle, ResourceMapping,
    WireResource,
};
pub use snapshot::{Snapshot, SnapshotResource};
