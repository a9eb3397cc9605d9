//! Client facade: composes cache, fetch/upload pipelines, booking and
//! the render state machine behind a small public surface.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OnceCell, Semaphore};
use tracing::info;

use crate::booking::RendererBroker;
use crate::cache::ResourceCache;
use crate::domain::{
    BookedRenderer, CancelSignal, GridError, RenderRequest, RenderResult, RenderSettings,
    RenderTarget, RendererSettings, Result, Snapshot, WireRenderRequest,
};
use crate::fetch::{FetchOptions, HttpFetcher, ResourceFetcher};
use crate::job::{RenderRunner, POLL_INTERVAL, RENDER_DEADLINE};
use crate::resolver::GraphResolver;
use crate::rpc::{DeviceCatalog, GridRpc, HttpGridRpc};
use crate::upload::Uploader;

/// Debounce interval for all batched grid calls.
pub const BATCH_WINDOW: Duration = Duration::from_millis(100);

/// Early-flush threshold for one batch.
pub const MAX_BATCH_SIZE: usize = 100;

/// Default cap on simultaneous render jobs per client.
pub const MAX_CONCURRENT_RENDERS: usize = 20;

/// Client configuration. Defaults read `GRIDSHOT_SERVER` and
/// `GRIDSHOT_API_KEY` from the environment.
#[derive(Debug, Clone)]
pub struct GridConfig {
    pub server_url: String,
    pub api_key: String,
    pub batch_window: Duration,
    pub max_batch: usize,
    pub poll_interval: Duration,
    pub render_deadline: Duration,
    /// `0` means unbounded.
    pub max_concurrent_renders: usize,
    pub fetch: FetchOptions,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            server_url: std::env::var("GRIDSHOT_SERVER")
                .unwrap_or_else(|_| "https://grid.gridshot.dev".to_string()),
            api_key: std::env::var("GRIDSHOT_API_KEY").unwrap_or_default(),
            batch_window: BATCH_WINDOW,
            max_batch: MAX_BATCH_SIZE,
            poll_interval: POLL_INTERVAL,
            render_deadline: RENDER_DEADLINE,
            max_concurrent_renders: MAX_CONCURRENT_RENDERS,
            fetch: FetchOptions::default(),
        }
    }
}

impl GridConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn new(server_url: &str, api_key: &str) -> Self {
        GridConfig {
            server_url: server_url.to_string(),
            api_key: api_key.to_string(),
            ..GridConfig::default()
        }
    }

    pub fn with_fetch_options(mut self, fetch: FetchOptions) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn with_batch_window(mut self, window: Duration) -> Self {
        self.batch_window = window;
        self
    }

    pub fn with_render_deadline(mut self, deadline: Duration) -> Self {
        self.render_deadline = deadline;
        self
    }

    pub fn with_max_concurrent_renders(mut self, max: usize) -> Self {
        self.max_concurrent_renders = max;
        self
    }
}

/// Orchestrates render jobs against a remote rendering grid.
pub struct GridClient {
    rpc: Arc<dyn GridRpc>,
    cache: ResourceCache,
    resolver: GraphResolver,
    broker: RendererBroker,
    runner: RenderRunner,
    gate: Arc<Semaphore>,
    chrome_devices: OnceCell<DeviceCatalog>,
    ios_devices: OnceCell<DeviceCatalog>,
    android_devices: OnceCell<DeviceCatalog>,
}

impl GridClient {
    /// Production client over HTTP, sharing the process-wide cache.
    pub fn new(config: GridConfig) -> Result<Self> {
        let rpc = Arc::new(HttpGridRpc::new(&config.server_url, &config.api_key)?);
        Self::with_rpc(config, rpc)
    }

    /// Client over an injected RPC implementation, sharing the
    /// process-wide cache.
    pub fn with_rpc(config: GridConfig, rpc: Arc<dyn GridRpc>) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(config.fetch.clone())?);
        Self::with_components(config, rpc, fetcher, ResourceCache::shared())
    }

    /// Fully injected client: RPC, fetcher and cache are all supplied.
    /// Pass a fresh [`ResourceCache`] to isolate this client from the
    /// process-wide one.
    pub fn with_components(
        config: GridConfig,
        rpc: Arc<dyn GridRpc>,
        fetcher: Arc<dyn ResourceFetcher>,
        cache: ResourceCache,
    ) -> Result<Self> {
        let uploader = Arc::new(Uploader::new(
            rpc.clone(),
            config.batch_window,
            config.max_batch,
        ));
        let resolver = GraphResolver::new(cache.clone(), fetcher, uploader);
        let broker = RendererBroker::new(rpc.clone(), config.batch_window, config.max_batch);
        let runner = RenderRunner::new(
            rpc.clone(),
            config.batch_window,
            config.max_batch,
            config.poll_interval,
            config.render_deadline,
        );
        let permits = if config.max_concurrent_renders == 0 {
            Semaphore::MAX_PERMITS
        } else {
            config.max_concurrent_renders
        };
        info!(server = %config.server_url, "grid client ready");
        Ok(Self {
            rpc,
            cache,
            resolver,
            broker,
            runner,
            gate: Arc::new(Semaphore::new(permits)),
            chrome_devices: OnceCell::new(),
            ios_devices: OnceCell::new(),
            android_devices: OnceCell::new(),
        })
    }

    /// The resource cache this client resolves through.
    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// Resolve a snapshot into a submittable render target. All
    /// dependencies are fetched, hashed and confirmed on the grid store
    /// by the time this returns.
    pub async fn build_render_target(
        &self,
        snapshot: &Snapshot,
        settings: &RenderSettings,
    ) -> Result<RenderTarget> {
        self.resolver
            .resolve(snapshot, Some(settings.renderer.name.as_str()))
            .await
    }

    /// Reserve (or reuse) a rendering environment for `settings`.
    pub async fn book_renderer(&self, settings: &RendererSettings) -> Result<BookedRenderer> {
        self.broker.book(settings).await
    }

    /// Submit one render and poll it to a terminal state, bounded by the
    /// client-wide render gate.
    pub async fn render(
        &self,
        request: RenderRequest,
        cancel: CancelSignal,
    ) -> Result<RenderResult> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| GridError::Protocol("render gate closed".to_string()))?;
        let booked = self.broker.book(&request.settings.renderer).await?;
        let wire = WireRenderRequest::new(&request, &booked.renderer_id);
        self.runner.run(wire, cancel).await
    }

    /// Build a target from `snapshot` and render it in one call.
    pub async fn render_snapshot(
        &self,
        snapshot: &Snapshot,
        settings: RenderSettings,
        cancel: CancelSignal,
    ) -> Result<RenderResult> {
        let target = self.build_render_target(snapshot, &settings).await?;
        self.render(RenderRequest { target, settings }, cancel).await
    }

    /// Chrome device-emulation catalog; fetched once per process.
    pub async fn chrome_emulation_devices(&self) -> Result<DeviceCatalog> {
        self.chrome_devices
            .get_or_try_init(|| self.rpc.chrome_emulation_devices())
            .await
            .cloned()
    }

    /// iOS device catalog; fetched once per process.
    pub async fn ios_devices(&self) -> Result<DeviceCatalog> {
        self.ios_devices
            .get_or_try_init(|| self.rpc.ios_devices())
            .await
            .cloned()
    }

    /// Android device catalog; fetched once per process.
    pub async fn android_devices(&self) -> Result<DeviceCatalog> {
        self.android_devices
            .get_or_try_init(|| self.rpc.android_devices())
            .await
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builders_override_defaults() {
        let config = GridConfig::new("https://grid.example", "secret")
            .with_batch_window(Duration::from_millis(50))
            .with_max_concurrent_renders(3);
        assert_eq!(config.server_url, "https://grid.example");
        assert_eq!(config.api_key, "secret");
        assert_eq!(config.batch_window, Duration::from_millis(50));
        assert_eq!(config.max_concurrent_renders, 3);
        assert_eq!(config.max_batch, MAX_BATCH_SIZE);
    }
}
