//! Renderer booking: reserves rendering environments, batched and cached
//! per settings fingerprint.
//!
//! Concurrent bookings coalesce through the combinator into one grid
//! call; once a booking resolves it is memoized for the life of the
//! broker (normally the process), so repeated checks under the same
//! renderer configuration never re-request the grid.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::batch::{BatchHandler, Batcher};
use crate::domain::{BookedRenderer, Digest, RendererSettings, Result};
use crate::rpc::GridRpc;

struct Bookings {
    rpc: Arc<dyn GridRpc>,
}

#[async_trait]
impl BatchHandler<RendererSettings, BookedRenderer> for Bookings {
    async fn flush(&self, settings: Vec<RendererSettings>) -> Result<Vec<BookedRenderer>> {
        self.rpc.book_renderers(settings).await
    }
}

/// Books renderer environments through the batching combinator.
pub struct RendererBroker {
    batcher: Batcher<RendererSettings, BookedRenderer>,
    booked: Mutex<HashMap<Digest, BookedRenderer>>,
}

impl RendererBroker {
    pub fn new(rpc: Arc<dyn GridRpc>, window: Duration, max_batch: usize) -> Self {
        Self {
            batcher: Batcher::new(Arc::new(Bookings { rpc }), window, max_batch),
            booked: Mutex::new(HashMap::new()),
        }
    }

    /// Stable fingerprint of a renderer configuration: the digest of its
    /// canonical JSON form.
    pub fn fingerprint(settings: &RendererSettings) -> Result<Digest> {
        Ok(Digest::compute(&serde_json::to_vec(settings)?))
    }

    /// Reserve an environment for `settings`, reusing a resolved booking
    /// for the same fingerprint when one exists.
    pub async fn book(&self, settings: &RendererSettings) -> Result<BookedRenderer> {
        let key = Self::fingerprint(settings)?;
        if let Some(booking) = self
            .booked
            .lock()
            .expect("booking cache poisoned")
            .get(&key)
        {
            return Ok(booking.clone());
        }

        let booking = self.batcher.call(settings.clone()).await?;
        debug!(renderer = %settings.name, id = %booking.renderer_id, "renderer booked");
        self.booked
            .lock()
            .expect("booking cache poisoned")
            .insert(key, booking.clone());
        Ok(booking)
    }
}
