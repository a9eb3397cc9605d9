//! Shared test doubles: a scripted grid and a deterministic fetcher.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use gridshot_core::rpc::DeviceCatalog;
use gridshot_core::{
    BookedRenderer, ContentResource, GridClient, GridConfig, GridRpc, RenderResult,
    RenderStatus, RendererSettings, Resource, ResourceCache, ResourceFetcher, Result,
    StartedRender, WireRenderRequest, WireResource,
};

/// In-memory grid with scripted render statuses and call counters.
///
/// Render ids are the request URLs, so tests can script and assert per
/// snapshot.
#[derive(Default)]
pub struct MockGrid {
    pub book_calls: AtomicUsize,
    pub book_batch_sizes: Mutex<Vec<usize>>,
    booked_seq: AtomicUsize,

    pub start_calls: AtomicUsize,
    pub started_requests: Mutex<Vec<WireRenderRequest>>,
    pub need_more_resources_for: Mutex<HashSet<String>>,

    pub poll_batches: Mutex<Vec<Vec<String>>>,
    scripts: Mutex<HashMap<String, VecDeque<RenderResult>>>,
    always_rendering: Mutex<HashSet<String>>,

    pub upload_hashes: Mutex<Vec<String>>,
    pub check_calls: AtomicUsize,
    pub checked_hashes: Mutex<Vec<String>>,
    present: Mutex<HashSet<String>>,

    pub device_calls: AtomicUsize,
}

impl MockGrid {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script the poll results for the render whose snapshot URL is
    /// `url`. When the script runs out the render reports `rendered`.
    pub fn script(&self, url: &str, statuses: Vec<RenderResult>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), statuses.into());
    }

    /// Make the render for `url` report `rendering` forever.
    pub fn never_finish(&self, url: &str) {
        self.always_rendering.lock().unwrap().insert(url.to_string());
    }

    /// Pretend the grid store already holds `hash`.
    pub fn mark_present(&self, hash: &str) {
        self.present.lock().unwrap().insert(hash.to_string());
    }

    /// Reject the submission for `url` with `need-more-resources`.
    pub fn starve(&self, url: &str) {
        self.need_more_resources_for
            .lock()
            .unwrap()
            .insert(url.to_string());
    }

    /// Poll cycles observed for one render id.
    pub fn polls_for(&self, url: &str) -> usize {
        self.poll_batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .filter(|id| id.as_str() == url)
            .count()
    }

    pub fn uploads(&self) -> Vec<String> {
        self.upload_hashes.lock().unwrap().clone()
    }
}

pub fn rendered() -> RenderResult {
    RenderResult {
        status: RenderStatus::Rendered,
        error: None,
        image_location: Some("https://grid.test/images/1".to_string()),
        dom_location: None,
        selector_regions: None,
        image_position_in_active_frame: None,
        device_size: None,
        visible_viewport: None,
    }
}

pub fn rendering() -> RenderResult {
    RenderResult {
        status: RenderStatus::Rendering,
        ..rendered()
    }
}

pub fn render_error(message: &str) -> RenderResult {
    RenderResult {
        status: RenderStatus::Error,
        error: Some(message.to_string()),
        ..rendered()
    }
}

#[async_trait]
impl GridRpc for MockGrid {
    async fn book_renderers(
        &self,
        settings: Vec<RendererSettings>,
    ) -> Result<Vec<BookedRenderer>> {
        self.book_calls.fetch_add(1, Ordering::SeqCst);
        self.book_batch_sizes.lock().unwrap().push(settings.len());
        Ok(settings
            .into_iter()
            .map(|_| {
                let n = self.booked_seq.fetch_add(1, Ordering::SeqCst);
                BookedRenderer {
                    renderer_id: format!("env-{n}"),
                    raw_environment: serde_json::json!({ "slot": n }),
                }
            })
            .collect())
    }

    async fn start_renders(
        &self,
        requests: Vec<WireRenderRequest>,
    ) -> Result<Vec<StartedRender>> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let starved = self.need_more_resources_for.lock().unwrap();
        let started = requests
            .iter()
            .enumerate()
            .map(|(n, request)| StartedRender {
                job_id: format!("job-{n}"),
                render_id: request.url.clone(),
                status: if starved.contains(&request.url) {
                    RenderStatus::NeedMoreResources
                } else {
                    RenderStatus::Rendering
                },
            })
            .collect();
        drop(starved);
        self.started_requests.lock().unwrap().extend(requests);
        Ok(started)
    }

    async fn check_render_results(&self, render_ids: Vec<String>) -> Result<Vec<RenderResult>> {
        self.poll_batches.lock().unwrap().push(render_ids.clone());
        let always = self.always_rendering.lock().unwrap();
        let mut scripts = self.scripts.lock().unwrap();
        Ok(render_ids
            .into_iter()
            .map(|id| {
                if always.contains(&id) {
                    return rendering();
                }
                scripts
                    .get_mut(&id)
                    .and_then(|script| script.pop_front())
                    .unwrap_or_else(rendered)
            })
            .collect())
    }

    async fn upload_resource(&self, resource: &ContentResource) -> Result<()> {
        let hash = resource.hash.to_hex();
        self.present.lock().unwrap().insert(hash.clone());
        self.upload_hashes.lock().unwrap().push(hash);
        Ok(())
    }

    async fn check_resources(&self, resources: Vec<WireResource>) -> Result<Vec<Option<bool>>> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        let present = self.present.lock().unwrap();
        let mut checked = self.checked_hashes.lock().unwrap();
        Ok(resources
            .iter()
            .map(|r| match r.hash() {
                Some(hash) => {
                    let hex = hash.to_hex();
                    checked.push(hex.clone());
                    Some(present.contains(&hex))
                }
                None => Some(false),
            })
            .collect())
    }

    async fn chrome_emulation_devices(&self) -> Result<DeviceCatalog> {
        self.device_calls.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::json!({ "Pixel 5": { "width": 393, "height": 851 } }))
    }

    async fn ios_devices(&self) -> Result<DeviceCatalog> {
        self.device_calls.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::json!({ "iPhone 14": { "width": 390, "height": 844 } }))
    }

    async fn android_devices(&self) -> Result<DeviceCatalog> {
        self.device_calls.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::json!({ "Galaxy S22": { "width": 360, "height": 780 } }))
    }
}

/// Fetcher that derives deterministic bytes from the URL and counts
/// network requests.
#[derive(Default)]
pub struct StaticFetcher {
    pub calls: AtomicUsize,
    failing: Mutex<HashMap<String, u16>>,
}

impl StaticFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_with(&self, url: &str, status: u16) {
        self.failing.lock().unwrap().insert(url.to_string(), status);
    }
}

#[async_trait]
impl ResourceFetcher for StaticFetcher {
    async fn fetch(&self, url: &str, _renderer: Option<&str>) -> Resource {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.failing.lock().unwrap().get(url) {
            return Resource::failed(url, *status);
        }
        Resource::from_content("image/png", url.as_bytes().to_vec())
    }
}

/// Client wired to the mock grid with an isolated cache.
pub fn test_client(grid: Arc<MockGrid>, fetcher: Arc<StaticFetcher>) -> GridClient {
    GridClient::with_components(
        GridConfig::new("https://grid.test", "test-key"),
        grid,
        fetcher,
        ResourceCache::new(),
    )
    .unwrap()
}
