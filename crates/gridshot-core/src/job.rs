//! Render job state machine: batched submission, then an iterative poll
//! loop until the job reaches a terminal state.
//!
//! States: Submitted -> Polling -> {Rendered, Error, TimedOut, Aborted}.
//! Each cycle checks the caller's cancellation signal and wall-clock
//! deadline before consulting the grid; a render that drops out simply
//! stops calling the poll batcher, so it is absent from the next batch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::batch::{BatchHandler, Batcher};
use crate::domain::{
    CancelSignal, GridError, RenderResult, RenderStatus, Result, StartedRender, WireRenderRequest,
};
use crate::rpc::GridRpc;

/// Delay between poll cycles for one render.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default client-side wall-clock budget per render, fixed at submission.
pub const RENDER_DEADLINE: Duration = Duration::from_secs(3600);

struct Submissions {
    rpc: Arc<dyn GridRpc>,
}

#[async_trait]
impl BatchHandler<WireRenderRequest, StartedRender> for Submissions {
    async fn flush(&self, requests: Vec<WireRenderRequest>) -> Result<Vec<StartedRender>> {
        self.rpc.start_renders(requests).await
    }
}

struct Polls {
    rpc: Arc<dyn GridRpc>,
}

#[async_trait]
impl BatchHandler<String, RenderResult> for Polls {
    async fn flush(&self, render_ids: Vec<String>) -> Result<Vec<RenderResult>> {
        self.rpc.check_render_results(render_ids).await
    }
}

/// Drives render jobs from submission to a terminal state.
pub struct RenderRunner {
    submit: Batcher<WireRenderRequest, StartedRender>,
    poll: Batcher<String, RenderResult>,
    poll_interval: Duration,
    deadline: Duration,
}

impl RenderRunner {
    pub fn new(
        rpc: Arc<dyn GridRpc>,
        window: Duration,
        max_batch: usize,
        poll_interval: Duration,
        deadline: Duration,
    ) -> Self {
        Self {
            submit: Batcher::new(Arc::new(Submissions { rpc: rpc.clone() }), window, max_batch),
            poll: Batcher::new(Arc::new(Polls { rpc }), window, max_batch),
            poll_interval,
            deadline,
        }
    }

    /// Submit one render and poll it to a terminal state.
    ///
    /// The upload pipeline has already confirmed every resource, so a
    /// `need-more-resources` answer is a protocol violation and fatal
    /// for this render.
    #[instrument(skip_all, fields(correlation = %uuid::Uuid::new_v4(), url = %request.url))]
    pub async fn run(
        &self,
        request: WireRenderRequest,
        cancel: CancelSignal,
    ) -> Result<RenderResult> {
        let started = self.submit.call(request).await?;
        if started.status == RenderStatus::NeedMoreResources {
            warn!(render_id = %started.render_id, "grid asked for resources after upload");
            return Err(GridError::NeedMoreResources(started.render_id));
        }
        debug!(render_id = %started.render_id, job_id = %started.job_id, "render submitted");

        let deadline_at = Instant::now() + self.deadline;
        loop {
            tokio::time::sleep(self.poll_interval).await;

            if cancel.is_cancelled() {
                debug!(render_id = %started.render_id, "render aborted");
                return Err(GridError::RenderAborted);
            }
            if Instant::now() >= deadline_at {
                warn!(render_id = %started.render_id, "render deadline elapsed");
                return Err(GridError::RenderTimedOut(self.deadline));
            }

            let result = self.poll.call(started.render_id.clone()).await?;
            match result.status {
                RenderStatus::Error => {
                    return Err(GridError::RenderFailed(
                        result
                            .error
                            .unwrap_or_else(|| "unspecified render error".to_string()),
                    ));
                }
                RenderStatus::Rendered => {
                    debug!(render_id = %started.render_id, "render finished");
                    return Ok(finalize(result));
                }
                _ => {}
            }
        }
    }
}

/// Translate selector regions from page coordinates to image
/// coordinates before the result reaches the caller.
fn finalize(mut result: RenderResult) -> RenderResult {
    if let (Some(regions), Some(offset)) = (
        result.selector_regions.as_mut(),
        result.image_position_in_active_frame,
    ) {
        for region in regions.iter_mut() {
            *region = region.relative_to(offset);
        }
    }
    result
}
