//! Gridshot Core Library
//!
//! Client-side orchestrator for a remote multi-renderer visual-rendering
//! grid: content-addressed resource deduplication, recursive snapshot
//! resolution, batched grid RPC, and the render-job polling state
//! machine.

pub mod batch;
pub mod booking;
pub mod cache;
pub mod client;
pub mod domain;
pub mod fetch;
pub mod job;
pub mod resolver;
pub mod rpc;
pub mod telemetry;
pub mod upload;

pub use batch::{BatchHandler, Batcher};
pub use booking::RendererBroker;
pub use cache::ResourceCache;
pub use client::{GridClient, GridConfig, BATCH_WINDOW, MAX_BATCH_SIZE, MAX_CONCURRENT_RENDERS};
pub use domain::{
    BookedRenderer, CancelSignal, ContentResource, Digest, FailedResource, GridError, NativeMeta,
    Offset, PendingResource, Region, RenderRequest, RenderResult, RenderSettings, RenderStatus,
    RenderTarget, RenderTargetKind, RendererSettings, Resource, ResourceHandle, ResourceMapping,
    Result, Size, Snapshot, SnapshotResource, StartedRender, WireRenderInfo, WireRenderRequest,
    WireResource, HASH_FORMAT,
};
pub use fetch::{
    AutProxy, Cookie, FetchOptions, HttpFetcher, ResourceFetcher, FETCH_ATTEMPTS,
    STREAMING_BODY_BUDGET, STREAMING_FAILURE_STATUS, TRANSPORT_FAILURE_STATUS,
};
pub use job::{RenderRunner, POLL_INTERVAL, RENDER_DEADLINE};
pub use resolver::{GraphResolver, DOCUMENT_CONTENT_TYPE, VHS_CONTENT_TYPE_PREFIX, VHS_KEY};
pub use rpc::{DeviceCatalog, GridRpc, HttpGridRpc};
pub use telemetry::init_tracing;
pub use upload::{Uploader, MAX_CONCURRENT_UPLOADS};

/// Gridshot version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
