//! Applies engine push events to the item store.
//!
//! Progress is always forwarded; the store only accepts it for items in
//! `processing`. Terminal statuses carried by events are applied only when
//! the scheduler does not own the item. Anything arriving after the item
//! reached a terminal state is dropped by the status state machine.

use crate::engine::EngineEvent;
use crate::queue::ItemStore;
use crate::scheduler::ConversionScheduler;
use aether_common::ProcessStatus;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

pub struct EventApplier {
    store: Arc<ItemStore>,
    scheduler: Arc<ConversionScheduler>,
}

impl EventApplier {
    pub fn new(store: Arc<ItemStore>, scheduler: Arc<ConversionScheduler>) -> Self {
        Self { store, scheduler }
    }

    pub fn apply(&self, event: EngineEvent) {
        match event {
            EngineEvent::Progress(p) => {
                if p.status == ProcessStatus::Processing {
                    self.store.update_progress(p.id, p.progress);
                } else if self.scheduler.current_item() == Some(p.id) {
                    tracing::trace!(item_id = %p.id, status = %p.status, "Scheduler owns item; event status ignored");
                } else {
                    self.store.update_status(p.id, p.status, p.message);
                }
            }
            EngineEvent::Complete(result) => {
                if self.scheduler.current_item() == Some(result.id) {
                    return;
                }
                match (result.success, result.output_path) {
                    (true, Some(path)) => {
                        if self.store.update_status(result.id, ProcessStatus::Completed, None) {
                            self.store.set_output_path(result.id, path);
                        }
                    }
                    _ => {
                        let message = result
                            .error_message
                            .unwrap_or_else(|| "Conversion failed".to_string());
                        self.store.update_status(result.id, ProcessStatus::Error, Some(message));
                    }
                }
            }
        }
    }

    /// Consume `rx` until `cancel` fires or the engine goes away.
    pub async fn run(self, mut rx: broadcast::Receiver<EngineEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Ok(event) => self.apply(event),
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!("Engine event receiver lagged by {} events", n);
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = cancel.cancelled() => break,
            }
        }
        tracing::debug!("Engine event applier stopped");
    }
}
