// src/engine/runtime.rs

//! Engine lifecycle and the background poll loop.
//!
//! The engine is idle (no primitive, no loop) until the first token is
//! created, and returns to idle when the last token is destroyed.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{debug, info};

use crate::engine::core::{EngineInner, State};
use crate::errors::Result;
use crate::watch::native::NativeReceiver;

impl EngineInner {
    /// Open a fresh primitive and spawn its poll loop.
    pub(crate) fn start(self: &Arc<Self>, state: &mut State) -> Result<()> {
        let (service, events) = self.backend.open()?;
        let poll_timeout = self.config.poll_timeout();

        let task = self
            .runtime
            .spawn(poll_loop(Arc::downgrade(self), events, poll_timeout));

        state.service = Some(service);
        state.poll_task = Some(task);
        info!(root = %self.root, "watch engine started");
        Ok(())
    }

    /// Cancel the poll loop, close the primitive and forget every
    /// registration.
    pub(crate) fn stop(&self, state: &mut State) {
        if let Some(task) = state.poll_task.take() {
            task.abort();
        }
        state.registry.clear();
        state.vanished.clear();
        if state.service.take().is_some() {
            info!(root = %self.root, "watch engine stopped");
        }
    }
}

/// Wait for native batches and hand each to its own task.
///
/// The wait is bounded so the loop notices when the engine itself is gone,
/// even if the primitive never closes its stream.
pub(crate) async fn poll_loop(
    engine: Weak<EngineInner>,
    mut events: NativeReceiver,
    poll_timeout: Duration,
) {
    debug!("poll loop started");

    loop {
        let mut batch = match tokio::time::timeout(poll_timeout, events.recv()).await {
            Ok(Some(batch)) => batch,
            Ok(None) => {
                debug!("native event stream closed");
                break;
            }
            Err(_elapsed) => {
                if engine.strong_count() == 0 {
                    break;
                }
                continue;
            }
        };

        // Everything already queued belongs to the same wake-up.
        while let Ok(more) = events.try_recv() {
            batch.extend(more);
        }

        let Some(strong) = engine.upgrade() else {
            break;
        };
        debug!(count = batch.len(), "dispatching native batch");
        tokio::spawn(async move { strong.handle_batch(batch) });
    }

    debug!("poll loop finished");
}
