//! Generic call-batching combinator.
//!
//! Turns N independent calls arriving within a debounce window into one
//! aggregate call and fans the results back to the individual callers.
//! The first call after an idle period starts the window timer; every
//! call arriving before the timer fires joins the same batch. The batch
//! is also flushed early when it reaches `max_batch` entries.
//!
//! A handler error (or a result count that does not match the input
//! count) rejects every caller in that batch; no finer attribution is
//! possible at this layer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::domain::{GridError, Result};

/// Aggregate call a [`Batcher`] flushes accumulated inputs to.
///
/// Must return exactly one output per input, in input order.
#[async_trait]
pub trait BatchHandler<I, O>: Send + Sync + 'static {
    async fn flush(&self, inputs: Vec<I>) -> Result<Vec<O>>;
}

struct Item<I, O> {
    input: I,
    done: oneshot::Sender<Result<O>>,
}

/// Per-item async entry point in front of a [`BatchHandler`].
pub struct Batcher<I, O> {
    tx: mpsc::UnboundedSender<Item<I, O>>,
}

impl<I, O> Clone for Batcher<I, O> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<I, O> Batcher<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Spawn the collector task. `window` is the debounce interval,
    /// `max_batch` flushes a batch early once it holds that many items.
    pub fn new(handler: Arc<dyn BatchHandler<I, O>>, window: Duration, max_batch: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(collect(rx, handler, window, max_batch.max(1)));
        Self { tx }
    }

    /// Enqueue one input and await its individual settlement.
    pub async fn call(&self, input: I) -> Result<O> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(Item { input, done })
            .map_err(|_| GridError::BatchClosed)?;
        rx.await.map_err(|_| GridError::BatchClosed)?
    }
}

async fn collect<I, O>(
    mut rx: mpsc::UnboundedReceiver<Item<I, O>>,
    handler: Arc<dyn BatchHandler<I, O>>,
    window: Duration,
    max_batch: usize,
) where
    I: Send + 'static,
    O: Send + 'static,
{
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];

        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);
        loop {
            if batch.len() >= max_batch {
                break;
            }
            tokio::select! {
                _ = &mut deadline => break,
                next = rx.recv() => match next {
                    Some(item) => batch.push(item),
                    None => break,
                },
            }
        }

        trace!(size = batch.len(), "flushing batch");
        // Flush off the collector so a slow aggregate call does not
        // stretch the next batch's window.
        let handler = handler.clone();
        tokio::spawn(async move {
            let (inputs, settlements): (Vec<I>, Vec<oneshot::Sender<Result<O>>>) =
                batch.into_iter().map(|item| (item.input, item.done)).unzip();
            let count = inputs.len();

            match handler.flush(inputs).await {
                Ok(outputs) if outputs.len() == count => {
                    for (done, output) in settlements.into_iter().zip(outputs) {
                        let _ = done.send(Ok(output));
                    }
                }
                Ok(outputs) => {
                    let err = GridError::Protocol(format!(
                        "batch returned {} results for {} inputs",
                        outputs.len(),
                        count
                    ));
                    debug!(%err, "rejecting batch");
                    for done in settlements {
                        let _ = done.send(Err(err.clone()));
                    }
                }
                Err(err) => {
                    debug!(%err, count, "batch call failed, rejecting all callers");
                    for done in settlements {
                        let _ = done.send(Err(err.clone()));
                    }
                }
            }
        });
    }
}
