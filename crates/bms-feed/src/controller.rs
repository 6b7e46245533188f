use crate::backend::{BackendError, FeedBackend};
use crate::config::FeedConfig;
use crate::merge::MergeEngine;
use crate::optimistic::{OptimisticEchoTracker, SubmitError, WriteResolution};
use crate::poll::PollFallback;
use crate::push::PushSubscription;
use crate::relay::{BroadcastPrimitive, CrossTabRelay};
use crate::transport::PushTransport;
use bms_core::feed_contracts::{
    shape_event, ConnectionState, Delivery, Event, EventId, Origin, Payload,
};
use bms_core::{FeedKind, Scope};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const MAX_ALERTS: usize = 20;

/// Everything a producer task can hand to the runtime loop. Scoped inputs carry
/// the generation they were created under.
#[derive(Debug)]
pub enum FeedInput {
    Push {
        generation: u64,
        payload: Value,
    },
    Connection {
        generation: u64,
        state: ConnectionState,
    },
    Snapshot {
        generation: u64,
        scope: Scope,
        result: Result<Vec<Value>, BackendError>,
    },
    Relay(Event),
    WriteCompleted {
        generation: u64,
        provisional: Uuid,
        scope: Scope,
        result: Result<Option<Value>, BackendError>,
    },
}

#[derive(Clone)]
pub struct FeedCollaborators {
    pub backend: Arc<dyn FeedBackend>,
    pub transport: Arc<dyn PushTransport>,
    pub broadcast: Arc<dyn BroadcastPrimitive>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Ready,
    /// The first load of the scope failed; nothing authoritative is shown yet.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub at: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub id: EventId,
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
    pub confirmed: bool,
    pub failed: bool,
}

impl From<&Event> for FeedEntry {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id.clone(),
            payload: event.payload.clone(),
            created_at: event.created_at,
            confirmed: event.confirmed,
            failed: event.delivery == Delivery::Failed,
        }
    }
}

/// Immutable render snapshot handed to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedView {
    pub kind: FeedKind,
    pub scope: Option<Scope>,
    pub entries: Vec<FeedEntry>,
    pub connection: ConnectionState,
    pub load: LoadState,
    pub alerts: Vec<Alert>,
    pub session_invalidated: bool,
    pub revision: u64,
}

impl FeedView {
    pub fn empty(kind: FeedKind) -> Self {
        Self {
            kind,
            scope: None,
            entries: Vec::new(),
            connection: ConnectionState::Idle,
            load: LoadState::Idle,
            alerts: Vec::new(),
            session_invalidated: false,
            revision: 0,
        }
    }

    /// Badge count for the notification bell.
    pub fn unread(&self) -> usize {
        self.entries.iter().filter(|entry| entry.confirmed).count()
    }
}

/// Owns every per-scope resource of one feed. Only ever driven from the runtime loop.
pub struct ScopeController {
    kind: FeedKind,
    config: FeedConfig,
    collaborators: FeedCollaborators,
    inbox: mpsc::Sender<FeedInput>,
    engine: MergeEngine,
    push: Option<PushSubscription>,
    poll: PollFallback,
    relay: CrossTabRelay,
    tracker: OptimisticEchoTracker,
    generation: u64,
    connection: ConnectionState,
    load: LoadState,
    alerts: VecDeque<Alert>,
    session_invalidated: bool,
    status_revision: u64,
    disposed: bool,
}

impl ScopeController {
    pub fn new(
        kind: FeedKind,
        config: FeedConfig,
        collaborators: FeedCollaborators,
        inbox: mpsc::Sender<FeedInput>,
    ) -> Self {
        let tab_id = Uuid::new_v4();
        let relay = if config.relay_enabled {
            CrossTabRelay::open(
                collaborators.broadcast.as_ref(),
                kind.relay_topic(),
                tab_id,
                inbox.clone(),
            )
        } else {
            CrossTabRelay::disabled(kind.relay_topic(), tab_id)
        };
        Self {
            kind,
            engine: MergeEngine::new(config.echo_tolerance_ms()),
            config,
            collaborators,
            inbox,
            push: None,
            poll: PollFallback::new(),
            relay,
            tracker: OptimisticEchoTracker::new(),
            generation: 0,
            connection: ConnectionState::Idle,
            load: LoadState::Idle,
            alerts: VecDeque::new(),
            session_invalidated: false,
            status_revision: 0,
            disposed: false,
        }
    }

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.engine.active_scope()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn relay_active(&self) -> bool {
        self.relay.is_active()
    }

    /// Returns whether the scope changed. The old push subscription and poll timer are
    /// torn down before anything for the new scope is created.
    pub fn set_scope(&mut self, scope: Scope) -> bool {
        if self.disposed {
            warn!(event = "scope_change_after_dispose", scope = %scope);
            return false;
        }
        if scope.kind() != self.kind {
            warn!(event = "scope_kind_mismatch", feed = self.kind.as_str(), scope = %scope);
            return false;
        }
        if self.engine.active_scope() == Some(&scope) {
            return false;
        }

        if let Some(mut push) = self.push.take() {
            push.dispose();
        }
        self.poll.stop();

        let previous = self.engine.active_scope().cloned();
        self.engine.activate(scope.clone());
        self.generation += 1;
        self.connection = ConnectionState::Idle;
        self.load = LoadState::Loading;
        self.bump_status();
        info!(
            event = "scope_change",
            feed = self.kind.as_str(),
            from = %previous.as_ref().map(ToString::to_string).unwrap_or_default(),
            to = %scope,
            generation = self.generation
        );

        self.poll.start(
            Arc::clone(&self.collaborators.backend),
            scope.clone(),
            self.config.poll_interval(self.kind),
            self.generation,
            self.inbox.clone(),
        );
        self.push = Some(PushSubscription::open(
            Arc::clone(&self.collaborators.transport),
            &scope,
            self.generation,
            self.config.push_retry,
            self.inbox.clone(),
        ));
        true
    }

    /// Reopens push from `Failed`. Any other state is left alone.
    pub fn retry_push(&mut self) -> bool {
        if self.disposed || self.connection != ConnectionState::Failed {
            return false;
        }
        let Some(scope) = self.engine.active_scope().cloned() else {
            return false;
        };
        if let Some(mut push) = self.push.take() {
            push.dispose();
        }
        info!(event = "push_manual_retry", scope = %scope, generation = self.generation);
        self.push = Some(PushSubscription::open(
            Arc::clone(&self.collaborators.transport),
            &scope,
            self.generation,
            self.config.push_retry,
            self.inbox.clone(),
        ));
        true
    }

    pub fn submit(&mut self, payload: Payload) -> Result<Event, SubmitError> {
        if self.disposed {
            return Err(SubmitError::Closed);
        }
        let event = self.tracker.submit(
            &mut self.engine,
            Arc::clone(&self.collaborators.backend),
            payload,
            self.generation,
            Utc::now(),
            self.inbox.clone(),
        )?;
        self.relay.publish(&event);
        Ok(event)
    }

    /// Applies one producer input; returns whether the view changed.
    pub fn handle(&mut self, input: FeedInput) -> bool {
        if self.disposed {
            return false;
        }
        let before = self.fingerprint();
        match input {
            FeedInput::Push {
                generation,
                payload,
            } => {
                if self.is_current(generation, "push") {
                    self.apply_push(payload);
                }
            }
            FeedInput::Connection { generation, state } => {
                if self.is_current(generation, "connection") && self.connection != state {
                    info!(
                        event = "connection_state",
                        feed = self.kind.as_str(),
                        state = %state
                    );
                    self.connection = state;
                    self.bump_status();
                }
            }
            FeedInput::Snapshot {
                generation,
                scope,
                result,
            } => {
                if self.is_current(generation, "snapshot") {
                    self.apply_snapshot(scope, result);
                }
            }
            // Relay frames carry no generation. The engine rejects other scopes, and a
            // sibling's event for this scope may show while the first load is pending.
            FeedInput::Relay(event) => {
                let outcome = self.engine.merge(event);
                debug!(event = "relay_received", outcome = outcome.as_str());
            }
            FeedInput::WriteCompleted {
                generation,
                provisional,
                scope,
                result,
            } => {
                if self.is_current(generation, "write_completed") {
                    self.apply_write(provisional, scope, result);
                } else {
                    self.tracker.forget(provisional);
                    if let Err(err) = &result {
                        self.note_backend_error(err);
                    }
                }
            }
        }
        self.fingerprint() != before
    }

    pub fn view(&self) -> FeedView {
        FeedView {
            kind: self.kind,
            scope: self.engine.active_scope().cloned(),
            entries: self.engine.events().map(FeedEntry::from).collect(),
            connection: self.connection,
            load: self.load.clone(),
            alerts: self.alerts.iter().cloned().collect(),
            session_invalidated: self.session_invalidated,
            revision: self.engine.revision() + self.status_revision,
        }
    }

    /// Releases push, poll, relay and in-flight writes. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Some(mut push) = self.push.take() {
            push.dispose();
        }
        self.poll.stop();
        self.relay.dispose();
        self.tracker.dispose();
        self.engine.deactivate();
        self.connection = ConnectionState::Idle;
        self.load = LoadState::Idle;
        self.bump_status();
        info!(event = "feed_dispose", feed = self.kind.as_str());
    }

    fn is_current(&self, generation: u64, input: &'static str) -> bool {
        if generation == self.generation {
            return true;
        }
        debug!(
            event = "stale_input_dropped",
            input,
            generation,
            current = self.generation
        );
        false
    }

    fn apply_push(&mut self, payload: Value) {
        let Some(scope) = self.engine.active_scope().cloned() else {
            return;
        };
        let event = match shape_event(&scope, &payload, Origin::Push, Utc::now()) {
            Ok(event) => event,
            Err(err) => {
                warn!(event = "push_malformed_event", scope = %scope, error = %err);
                return;
            }
        };
        let id = event.id.clone();
        if self.engine.merge(event).is_accepted() {
            self.republish(&id);
        }
    }

    fn apply_snapshot(&mut self, scope: Scope, result: Result<Vec<Value>, BackendError>) {
        let rows = match result {
            Ok(rows) => rows,
            Err(err) => {
                self.note_backend_error(&err);
                if self.load == LoadState::Loading {
                    warn!(event = "initial_load_failed", scope = %scope, error = %err);
                    self.load = LoadState::Failed(err.to_string());
                    self.bump_status();
                } else {
                    warn!(event = "poll_failed", scope = %scope, error = %err);
                }
                return;
            }
        };

        let received_at = Utc::now();
        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            match shape_event(&scope, row, Origin::Poll, received_at) {
                Ok(event) => events.push(event),
                Err(err) => warn!(event = "poll_malformed_event", scope = %scope, error = %err),
            }
        }
        self.engine.merge_snapshot(&scope, events);
        if self.load != LoadState::Ready {
            self.load = LoadState::Ready;
            self.bump_status();
        }
    }

    fn apply_write(
        &mut self,
        provisional: Uuid,
        scope: Scope,
        result: Result<Option<Value>, BackendError>,
    ) {
        match self
            .tracker
            .resolve(&mut self.engine, provisional, &scope, result, Utc::now())
        {
            WriteResolution::Acknowledged {
                echo: Some(echo),
                outcome: Some(outcome),
            } if outcome.is_accepted() => self.republish(&echo.id),
            WriteResolution::Acknowledged { .. } => {}
            WriteResolution::Failed(err) => {
                self.republish(&EventId::Provisional(provisional));
                self.note_backend_error(&err);
                self.raise_alert(format!("could not send to {scope}: {err}"));
            }
        }
    }

    fn republish(&self, id: &EventId) {
        if let Some(event) = self.engine.get(id) {
            self.relay.publish(event);
        }
    }

    fn note_backend_error(&mut self, err: &BackendError) {
        if err.is_unauthorized() && !self.session_invalidated {
            warn!(event = "session_invalidated", feed = self.kind.as_str());
            self.session_invalidated = true;
            self.bump_status();
        }
    }

    fn raise_alert(&mut self, message: String) {
        if self.alerts.len() == MAX_ALERTS {
            self.alerts.pop_front();
        }
        self.alerts.push_back(Alert {
            at: Utc::now(),
            message,
        });
        self.bump_status();
    }

    fn bump_status(&mut self) {
        self.status_revision += 1;
    }

    fn fingerprint(&self) -> (u64, u64) {
        (self.engine.revision(), self.status_revision)
    }
}

impl Drop for ScopeController {
    fn drop(&mut self) {
        self.dispose();
    }
}
