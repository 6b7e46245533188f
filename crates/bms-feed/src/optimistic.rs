use crate::backend::{BackendError, FeedBackend};
use crate::controller::FeedInput;
use crate::merge::{MergeEngine, MergeOutcome};
use bms_core::feed_contracts::{shape_event, Event, Origin, Payload};
use bms_core::Scope;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("nothing to send")]
    EmptyPayload,
    #[error("no active scope")]
    NoActiveScope,
    #[error("payload does not belong to {0}")]
    WrongFeed(Scope),
    #[error("feed runtime is closed")]
    Closed,
}

/// How a finished write was folded back into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResolution {
    /// The backend acknowledged the write; `echo` is the shaped ack row if it sent one.
    Acknowledged {
        echo: Option<Event>,
        outcome: Option<MergeOutcome>,
    },
    /// The provisional entry is now flagged failed.
    Failed(BackendError),
}

/// Inserts provisional events ahead of their network write and tracks the
/// writes still in flight.
#[derive(Default)]
pub struct OptimisticEchoTracker {
    in_flight: HashMap<Uuid, JoinHandle<()>>,
}

impl OptimisticEchoTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// The provisional event is merged before this returns; the write runs on its own task
    /// and reports back as [`FeedInput::WriteCompleted`].
    pub fn submit(
        &mut self,
        engine: &mut MergeEngine,
        backend: Arc<dyn FeedBackend>,
        payload: Payload,
        generation: u64,
        now: DateTime<Utc>,
        inbox: mpsc::Sender<FeedInput>,
    ) -> Result<Event, SubmitError> {
        if payload.is_blank() {
            return Err(SubmitError::EmptyPayload);
        }
        let scope = engine
            .active_scope()
            .cloned()
            .ok_or(SubmitError::NoActiveScope)?;
        let fits = matches!(
            (&scope, &payload),
            (Scope::Department(_), Payload::Chat { .. })
                | (Scope::Notifications, Payload::Notification { .. })
        );
        if !fits {
            return Err(SubmitError::WrongFeed(scope));
        }

        let event = Event::provisional(scope.clone(), payload.clone(), now);
        let Some(provisional) = event.id.provisional() else {
            return Err(SubmitError::NoActiveScope);
        };
        engine.merge(event.clone());
        info!(event = "submit_provisional", scope = %scope, id = %event.id);

        let task = tokio::spawn(async move {
            let result = backend.create(&scope, &payload).await;
            let _ = inbox
                .send(FeedInput::WriteCompleted {
                    generation,
                    provisional,
                    scope,
                    result,
                })
                .await;
        });
        self.in_flight.insert(provisional, task);
        Ok(event)
    }

    /// Drops tracking for a write whose scope is no longer displayed.
    pub fn forget(&mut self, provisional: Uuid) {
        self.in_flight.remove(&provisional);
    }

    pub fn resolve(
        &mut self,
        engine: &mut MergeEngine,
        provisional: Uuid,
        scope: &Scope,
        result: Result<Option<serde_json::Value>, BackendError>,
        now: DateTime<Utc>,
    ) -> WriteResolution {
        self.in_flight.remove(&provisional);
        match result {
            Ok(None) => WriteResolution::Acknowledged {
                echo: None,
                outcome: None,
            },
            Ok(Some(row)) => match shape_event(scope, &row, Origin::Poll, now) {
                Ok(mut echo) => {
                    echo.echo_of = Some(provisional);
                    let outcome = engine.merge(echo.clone());
                    debug!(event = "submit_acknowledged", id = %echo.id, outcome = outcome.as_str());
                    WriteResolution::Acknowledged {
                        echo: Some(echo),
                        outcome: Some(outcome),
                    }
                }
                Err(err) => {
                    // The write landed; push or the next poll will carry the row.
                    warn!(event = "submit_ack_malformed", error = %err);
                    WriteResolution::Acknowledged {
                        echo: None,
                        outcome: None,
                    }
                }
            },
            Err(err) => {
                warn!(event = "submit_failed", scope = %scope, provisional = %provisional, error = %err);
                engine.mark_failed(provisional);
                WriteResolution::Failed(err)
            }
        }
    }

    /// Abandons outstanding writes; their provisional entries are left as they are.
    pub fn dispose(&mut self) {
        for (_, task) in self.in_flight.drain() {
            task.abort();
        }
    }
}

impl Drop for OptimisticEchoTracker {
    fn drop(&mut self) {
        self.dispose();
    }
}
