//! Upload pipeline: guarantees every contentful resource exists on the
//! grid's store before a render is submitted.
//!
//! Existence checks are batched through the combinator; uploads for
//! absent blobs run under a bounded worker pool. Per hash the pipeline
//! does at most one existence-check entry and at most one transfer,
//! shared across every concurrently-active render target.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{OnceCell, Semaphore};
use tracing::debug;

use crate::batch::{BatchHandler, Batcher};
use crate::domain::{ContentResource, Digest, GridError, Result, WireResource};
use crate::rpc::GridRpc;

/// Worst-case parallel transfers, independent of the render gate.
pub const MAX_CONCURRENT_UPLOADS: usize = 16;

type UploadSlot = Arc<OnceCell<()>>;

struct ExistenceChecks {
    rpc: Arc<dyn GridRpc>,
}

#[async_trait]
impl BatchHandler<WireResource, Option<bool>> for ExistenceChecks {
    async fn flush(&self, resources: Vec<WireResource>) -> Result<Vec<Option<bool>>> {
        self.rpc.check_resources(resources).await
    }
}

/// Deduplicating uploader in front of the grid's resource store.
pub struct Uploader {
    rpc: Arc<dyn GridRpc>,
    confirmed: Mutex<HashSet<Digest>>,
    in_flight: Mutex<HashMap<Digest, UploadSlot>>,
    checks: Batcher<WireResource, Option<bool>>,
    permits: Arc<Semaphore>,
}

impl Uploader {
    pub fn new(rpc: Arc<dyn GridRpc>, window: Duration, max_batch: usize) -> Self {
        let checks = Batcher::new(
            Arc::new(ExistenceChecks { rpc: rpc.clone() }),
            window,
            max_batch,
        );
        Self {
            rpc,
            confirmed: Mutex::new(HashSet::new()),
            in_flight: Mutex::new(HashMap::new()),
            checks,
            permits: Arc::new(Semaphore::new(MAX_CONCURRENT_UPLOADS)),
        }
    }

    /// Resolve once the resource is known to exist on the grid store.
    ///
    /// Already-confirmed hashes resolve immediately; hashes with an
    /// upload in flight share that settlement; everything else goes
    /// through a batched existence check and, if absent, one transfer.
    pub async fn ensure_uploaded(&self, resource: &ContentResource) -> Result<()> {
        let hash = resource.hash;
        if self.confirmed.lock().expect("uploader poisoned").contains(&hash) {
            return Ok(());
        }

        let slot = {
            let mut in_flight = self.in_flight.lock().expect("uploader poisoned");
            in_flight.entry(hash).or_default().clone()
        };

        let outcome = slot
            .get_or_try_init(|| self.check_and_upload(resource))
            .await
            .map(|_| ());

        let mut in_flight = self.in_flight.lock().expect("uploader poisoned");
        match outcome {
            Ok(()) => {
                self.confirmed.lock().expect("uploader poisoned").insert(hash);
                in_flight.remove(&hash);
                Ok(())
            }
            Err(err) => {
                // Leave the hash retryable for a later render.
                in_flight.remove(&hash);
                Err(err)
            }
        }
    }

    /// Whether `hash` is already confirmed on the grid store.
    pub fn is_confirmed(&self, hash: &Digest) -> bool {
        self.confirmed.lock().expect("uploader poisoned").contains(hash)
    }

    async fn check_and_upload(&self, resource: &ContentResource) -> Result<()> {
        let known = self.checks.call(WireResource::content(resource)).await?;
        if known == Some(true) {
            debug!(hash = %resource.hash, "grid already has resource");
            return Ok(());
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| GridError::Protocol("upload pool closed".to_string()))?;
        debug!(
            hash = %resource.hash,
            bytes = resource.value.len(),
            content_type = %resource.content_type,
            "uploading resource"
        );
        self.rpc.upload_resource(resource).await
    }
}
