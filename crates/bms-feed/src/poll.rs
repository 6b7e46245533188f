use crate::backend::FeedBackend;
use crate::controller::FeedInput;
use bms_core::Scope;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Periodic authoritative snapshot fetch. The first fetch fires on `start`.
#[derive(Default)]
pub struct PollFallback {
    task: Option<JoinHandle<()>>,
}

impl PollFallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn start(
        &mut self,
        backend: Arc<dyn FeedBackend>,
        scope: Scope,
        interval: Duration,
        generation: u64,
        inbox: mpsc::Sender<FeedInput>,
    ) {
        self.stop();
        info!(
            event = "poll_start",
            scope = %scope,
            generation,
            interval_ms = interval.as_millis() as u64
        );
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let result = backend.snapshot(&scope).await;
                let input = FeedInput::Snapshot {
                    generation,
                    scope: scope.clone(),
                    result,
                };
                if inbox.send(input).await.is_err() {
                    break;
                }
            }
        }));
    }

    /// Safe to call repeatedly and before any `start`.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!(event = "poll_stop");
        }
    }
}

impl Drop for PollFallback {
    fn drop(&mut self) {
        self.stop();
    }
}
