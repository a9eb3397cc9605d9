//! Collaborator boundary: the RPC surface the rendering grid exposes.
//!
//! The trait is the contract the orchestration engine programs against;
//! [`HttpGridRpc`] is the production implementation. Tests substitute
//! their own implementations with scripted responses.

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{
    BookedRenderer, ContentResource, RenderResult, RendererSettings, Result, StartedRender,
    WireRenderRequest, WireResource,
};

/// Device catalog payload; opaque to the client, cached per process.
pub type DeviceCatalog = serde_json::Value;

/// Remote rendering-grid operations.
#[async_trait]
pub trait GridRpc: Send + Sync {
    /// Reserve one rendering environment per settings entry.
    async fn book_renderers(
        &self,
        settings: Vec<RendererSettings>,
    ) -> Result<Vec<BookedRenderer>>;

    /// Submit render jobs; one started render per request.
    async fn start_renders(
        &self,
        requests: Vec<WireRenderRequest>,
    ) -> Result<Vec<StartedRender>>;

    /// Poll job status; one result per render id.
    async fn check_render_results(&self, render_ids: Vec<String>) -> Result<Vec<RenderResult>>;

    /// Push one resource body to the grid store.
    async fn upload_resource(&self, resource: &ContentResource) -> Result<()>;

    /// Ask which resources the store already has. `None` means unknown,
    /// treated as absent.
    async fn check_resources(&self, resources: Vec<WireResource>) -> Result<Vec<Option<bool>>>;

    async fn chrome_emulation_devices(&self) -> Result<DeviceCatalog>;
    async fn ios_devices(&self) -> Result<DeviceCatalog>;
    async fn android_devices(&self) -> Result<DeviceCatalog>;
}

/// HTTP implementation of [`GridRpc`] against the grid's REST surface.
pub struct HttpGridRpc {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpGridRpc {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("gridshot/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_json<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.url(path))
            .header("x-auth-token", &self.api_key)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .header("x-auth-token", &self.api_key)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl GridRpc for HttpGridRpc {
    async fn book_renderers(
        &self,
        settings: Vec<RendererSettings>,
    ) -> Result<Vec<BookedRenderer>> {
        debug!(count = settings.len(), "booking renderers");
        self.post_json("/renderers", &settings).await
    }

    async fn start_renders(
        &self,
        requests: Vec<WireRenderRequest>,
    ) -> Result<Vec<StartedRender>> {
        debug!(count = requests.len(), "starting renders");
        self.post_json("/render", &requests).await
    }

    async fn check_render_results(&self, render_ids: Vec<String>) -> Result<Vec<RenderResult>> {
        self.post_json("/render/status", &render_ids).await
    }

    async fn upload_resource(&self, resource: &ContentResource) -> Result<()> {
        let path = format!("/resources/sha256/{}", resource.hash.to_hex());
        self.client
            .put(self.url(&path))
            .header("x-auth-token", &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, &resource.content_type)
            .body(resource.value.clone())
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn check_resources(&self, resources: Vec<WireResource>) -> Result<Vec<Option<bool>>> {
        self.post_json("/resources/query", &resources).await
    }

    async fn chrome_emulation_devices(&self) -> Result<DeviceCatalog> {
        self.get_json("/devices/chrome-emulation").await
    }

    async fn ios_devices(&self) -> Result<DeviceCatalog> {
        self.get_json("/devices/ios").await
    }

    async fn android_devices(&self) -> Result<DeviceCatalog> {
        self.get_json("/devices/android").await
    }
}
