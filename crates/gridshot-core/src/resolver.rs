//! Resource graph resolver: flattens a snapshot and its nested frames
//! into one resource mapping plus a hashed top-level document resource.
//!
//! Each level resolves its declared resources in parallel, recurses into
//! every frame in parallel, merges the child mappings, and serializes its
//! document over the sorted mapping. Sorted keys make the document hash a
//! pure function of the snapshot: identical snapshot, identical hash.

use std::sync::Arc;

use futures::future::{join_all, BoxFuture, FutureExt};
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::cache::ResourceCache;
use crate::domain::{
    GridError, NativeMeta, RenderTarget, Resource, ResourceHandle, ResourceMapping, Result,
    Snapshot,
};
use crate::fetch::ResourceFetcher;
use crate::upload::Uploader;

/// Content type of serialized document resources.
pub const DOCUMENT_CONTENT_TYPE: &str = "x-gridshot/document";

/// Content-type prefix for serialized native view hierarchies.
pub const VHS_CONTENT_TYPE_PREFIX: &str = "x-gridshot/vhs";

/// Synthetic mapping key for the native view-hierarchy resource.
pub const VHS_KEY: &str = "vhs";

struct Level {
    document: ResourceHandle,
    mapping: ResourceMapping,
    uploads: Vec<JoinHandle<Result<()>>>,
}

/// Turns snapshots into submittable render targets.
pub struct GraphResolver {
    cache: ResourceCache,
    fetcher: Arc<dyn ResourceFetcher>,
    uploader: Arc<Uploader>,
}

impl GraphResolver {
    pub fn new(
        cache: ResourceCache,
        fetcher: Arc<dyn ResourceFetcher>,
        uploader: Arc<Uploader>,
    ) -> Self {
        Self {
            cache,
            fetcher,
            uploader,
        }
    }

    /// Resolve `snapshot` into a render target. Returns once every
    /// dependency is fetched, hashed and confirmed on the grid store.
    /// Uploads start as soon as each resource settles, overlapping the
    /// remaining fetches.
    #[instrument(skip_all, fields(url = %snapshot.url))]
    pub async fn resolve(&self, snapshot: &Snapshot, renderer: Option<&str>) -> Result<RenderTarget> {
        let mut level = self.resolve_level(snapshot, renderer).await?;

        if snapshot.is_native() {
            if let Some(wire) = level.document.to_wire() {
                level.mapping.insert(VHS_KEY.to_string(), wire);
            }
        }

        for task in level.uploads {
            task.await
                .map_err(|err| GridError::Protocol(format!("upload task failed: {err}")))??;
        }

        let document = match &*level.document {
            Resource::Resolved(content) => Arc::new(content.clone()),
            other => {
                return Err(GridError::Protocol(format!(
                    "document resource did not resolve: {}",
                    other.id()
                )))
            }
        };

        debug!(
            resources = level.mapping.len(),
            document = %document.hash,
            "snapshot resolved"
        );

        Ok(RenderTarget {
            document,
            resources: level.mapping,
            source_url: snapshot.url.clone(),
            native: snapshot.is_native().then(|| NativeMeta {
                platform_name: snapshot.platform_name.clone(),
                vhs_type: snapshot.vhs_type.clone(),
            }),
        })
    }

    fn resolve_level<'a>(
        &'a self,
        snapshot: &'a Snapshot,
        renderer: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Level>> {
        async move {
            let mut mapping = ResourceMapping::new();
            let mut uploads = Vec::new();

            // Declared URLs, fetched in parallel through the shared cache
            // so concurrent targets share one request per URL.
            let fetches = snapshot.resource_urls.iter().map(|url| {
                let fetcher = self.fetcher.clone();
                async move {
                    let handle = self
                        .cache
                        .resolve_with(url, || async move {
                            fetcher.fetch(url, renderer).await
                        })
                        .await;
                    (url.clone(), handle)
                }
            });

            // Frames recurse independently and in parallel.
            let frames = snapshot
                .frames
                .iter()
                .map(|frame| self.resolve_level(frame, renderer));

            let (fetched, children) =
                futures::join!(join_all(fetches), join_all(frames));

            for (url, handle) in fetched {
                if let Some(wire) = handle.to_wire() {
                    mapping.insert(url, wire);
                }
                uploads.push(self.spawn_upload(handle));
            }

            // Inline declarations: pre-failed entries pass straight
            // through; contentful ones are hashed here, no network needed.
            for (url, declared) in &snapshot.resource_contents {
                let resource = match declared.error_status_code {
                    Some(status) => Resource::failed(url.clone(), status),
                    None => {
                        let resource = Resource::with_dependencies(
                            declared
                                .content_type
                                .clone()
                                .unwrap_or_else(|| "application/octet-stream".to_string()),
                            declared.value.clone().unwrap_or_default(),
                            declared.dependencies.clone(),
                        );
                        let handle = self.cache.insert(resource.clone());
                        uploads.push(self.spawn_upload(handle));
                        resource
                    }
                };
                if let Some(wire) = resource.to_wire() {
                    mapping.insert(url.clone(), wire);
                }
            }

            // Merge children: parent entries win everywhere except the
            // frame's own key, which takes the child's document.
            for (frame, child) in snapshot.frames.iter().zip(children) {
                let child = child?;
                uploads.extend(child.uploads);
                for (key, value) in child.mapping {
                    mapping.entry(key).or_insert(value);
                }
                if let Some(wire) = child.document.to_wire() {
                    mapping.insert(frame.url.clone(), wire);
                }
            }

            let document = self.document_resource(snapshot, &mapping)?;
            let handle = self.cache.insert(document);
            uploads.push(self.spawn_upload(handle.clone()));

            Ok(Level {
                document: handle,
                mapping,
                uploads,
            })
        }
        .boxed()
    }

    /// Serialize this level's document (or VHS payload) over the sorted
    /// mapping.
    fn document_resource(&self, snapshot: &Snapshot, mapping: &ResourceMapping) -> Result<Resource> {
        if let Some(vhs_hash) = &snapshot.vhs_hash {
            let payload = serde_json::json!({
                "vhsHash": vhs_hash,
                "resources": mapping,
                "vhsType": snapshot.vhs_type,
                "platformName": snapshot.platform_name,
            });
            let kind = snapshot.vhs_type.as_deref().unwrap_or("generic");
            return Ok(Resource::from_content(
                format!("{VHS_CONTENT_TYPE_PREFIX}/{kind}"),
                serde_json::to_vec(&payload)?,
            ));
        }

        let payload = serde_json::json!({
            "domNodes": snapshot.document_tree,
            "resources": mapping,
        });
        Ok(Resource::from_content(
            DOCUMENT_CONTENT_TYPE,
            serde_json::to_vec(&payload)?,
        ))
    }

    fn spawn_upload(&self, handle: ResourceHandle) -> JoinHandle<Result<()>> {
        let uploader = self.uploader.clone();
        tokio::spawn(async move {
            match &*handle {
                Resource::Resolved(content) => uploader.ensure_uploaded(content).await,
                _ => Ok(()),
            }
        })
    }
}
