//! Render-job value objects and the wire shapes they serialize to.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::resource::{ContentResource, ResourceMapping, WireResource};

/// What part of the page the renderer captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderTargetKind {
    Viewport,
    FullPage,
    Region,
    Selector,
    FullSelector,
}

/// Renderer environment request: engine, viewport, optional device
/// emulation. Its canonical JSON is the booking fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RendererSettings {
    /// Rendering engine name, e.g. `chrome`, `firefox`, `safari`.
    pub name: String,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

/// Capture settings for one render: region selection plus renderer flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderSettings {
    pub renderer: RendererSettings,
    pub target: RenderTargetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Selectors whose regions the grid reports back, page-relative.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selectors_to_find: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            name: "chrome".to_string(),
            width: 1024,
            height: 768,
            platform: None,
            device: None,
        }
    }
}

impl Default for RenderTargetKind {
    fn default() -> Self {
        RenderTargetKind::Viewport
    }
}

/// A rectangle. On the wire, selector regions arrive page-relative and
/// are translated image-relative before reaching the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i64,
    pub y: i64,
    pub width: u64,
    pub height: u64,
}

impl Region {
    /// Translate from page coordinates into image coordinates by removing
    /// the image's own offset within the frame, clamping at zero.
    pub fn relative_to(&self, offset: Offset) -> Region {
        Region {
            x: (self.x - offset.x).max(0),
            y: (self.y - offset.y).max(0),
            width: self.width,
            height: self.height,
        }
    }
}

/// A 2D offset, e.g. the rendered image's position in its frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offset {
    pub x: i64,
    pub y: i64,
}

/// Native-target metadata carried alongside the mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vhs_type: Option<String>,
}

/// The fully resource-resolved, hashed representation of one snapshot,
/// ready for submission. Immutable once built.
#[derive(Debug, Clone)]
pub struct RenderTarget {
    /// The hashed top-level document (or VHS) resource.
    pub document: Arc<ContentResource>,
    /// Flattened mapping for the whole snapshot, frames included.
    pub resources: ResourceMapping,
    pub source_url: String,
    pub native: Option<NativeMeta>,
}

/// One render to submit: a target plus capture settings.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub target: RenderTarget,
    pub settings: RenderSettings,
}

/// Render request as submitted to the grid.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRenderRequest {
    pub url: String,
    /// Booked environment this render runs in.
    pub renderer_id: String,
    /// Content stub of the document resource.
    pub snapshot: WireResource,
    pub resources: ResourceMapping,
    pub render_info: WireRenderInfo,
    pub renderer: RendererSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native: Option<NativeMeta>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRenderInfo {
    pub target: RenderTargetKind,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selectors_to_find: Vec<String>,
}

impl WireRenderRequest {
    pub fn new(request: &RenderRequest, renderer_id: impl Into<String>) -> Self {
        let target = &request.target;
        let settings = &request.settings;
        WireRenderRequest {
            url: target.source_url.clone(),
            renderer_id: renderer_id.into(),
            snapshot: WireResource::content(&target.document),
            resources: target.resources.clone(),
            render_info: WireRenderInfo {
                target: settings.target,
                width: settings.renderer.width,
                height: settings.renderer.height,
                region: settings.region,
                selector: settings.selector.clone(),
                selectors_to_find: settings.selectors_to_find.clone(),
            },
            renderer: settings.renderer.clone(),
            native: target.native.clone(),
            options: settings.options.clone(),
        }
    }
}

/// Render status reported by the grid.
///
/// The grid may grow statuses this client version does not know; those
/// deserialize as [`RenderStatus::Unknown`] and the render keeps
/// polling, rather than failing the whole poll batch on an unknown
/// variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderStatus {
    Rendering,
    Rendered,
    Error,
    NeedMoreResources,
    #[serde(other)]
    Unknown,
}

/// Accepted submission; consumed only by the polling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedRender {
    pub job_id: String,
    pub render_id: String,
    pub status: RenderStatus,
}

/// Result of one poll cycle; terminal when status is `rendered` or
/// `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderResult {
    pub status: RenderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_location: Option<String>,
    /// Page-relative on the wire; image-relative once returned to the
    /// caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector_regions: Option<Vec<Region>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_position_in_active_frame: Option<Offset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_size: Option<Size>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_viewport: Option<Size>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u64,
    pub height: u64,
}

/// A reserved rendering environment on the grid, cached per settings
/// fingerprint for the life of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookedRenderer {
    pub renderer_id: String,
    /// Raw environment descriptor, opaque to the client.
    #[serde(default)]
    pub raw_environment: serde_json::Value,
}

/// Cooperative cancellation for one render, checked every poll cycle.
///
/// Aborting settles the caller and removes the render from the next poll
/// batch; the job itself keeps running on the grid (fire-and-forget
/// limitation, the grid exposes no cancel endpoint).
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_kind_wire_names() {
        let kinds = [
            (RenderTargetKind::Viewport, "viewport"),
            (RenderTargetKind::FullPage, "full-page"),
            (RenderTargetKind::Region, "region"),
            (RenderTargetKind::Selector, "selector"),
            (RenderTargetKind::FullSelector, "full-selector"),
        ];
        for (kind, name) in kinds {
            assert_eq!(serde_json::to_value(kind).unwrap(), name);
        }
    }

    #[test]
    fn region_translation_subtracts_offset() {
        let page = Region { x: 100, y: 80, width: 50, height: 40 };
        let image = page.relative_to(Offset { x: 30, y: 20 });
        assert_eq!(image, Region { x: 70, y: 60, width: 50, height: 40 });
    }

    #[test]
    fn region_translation_clamps_at_zero() {
        let page = Region { x: 10, y: 5, width: 50, height: 40 };
        let image = page.relative_to(Offset { x: 30, y: 20 });
        assert_eq!(image.x, 0);
        assert_eq!(image.y, 0);
        assert_eq!(image.width, 50);
    }

    #[test]
    fn render_status_need_more_resources_name() {
        let status: RenderStatus = serde_json::from_str("\"need-more-resources\"").unwrap();
        assert_eq!(status, RenderStatus::NeedMoreResources);
    }

    #[test]
    fn unrecognized_render_status_deserializes_as_unknown() {
        let status: RenderStatus = serde_json::from_str("\"queued\"").unwrap();
        assert_eq!(status, RenderStatus::Unknown);

        // A whole poll result with a novel status still deserializes.
        let result: RenderResult = serde_json::from_str(r#"{"status":"queued"}"#).unwrap();
        assert_eq!(result.status, RenderStatus::Unknown);
    }

    #[test]
    fn cancel_signal_is_shared_across_clones() {
        let signal = CancelSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_cancelled());
        signal.cancel();
        assert!(clone.is_cancelled());
    }
}
