use crate::config::FeedConfig;
use crate::controller::{FeedCollaborators, FeedInput, FeedView, ScopeController};
use crate::optimistic::SubmitError;
use bms_core::feed_contracts::{Event, Payload};
use bms_core::{FeedKind, Scope};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

const COMMAND_QUEUE_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("feed runtime is closed")]
pub struct FeedClosed;

#[derive(Debug)]
pub enum FeedCommand {
    SetScope(Scope),
    Submit {
        payload: Payload,
        reply: oneshot::Sender<Result<Event, SubmitError>>,
    },
    RetryPush,
    Dispose,
}

/// UI-side handle. Cheap to clone; every clone drives the same feed.
#[derive(Clone)]
pub struct FeedHandle {
    kind: FeedKind,
    commands: mpsc::Sender<FeedCommand>,
    view: watch::Receiver<FeedView>,
}

impl FeedHandle {
    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    pub fn view(&self) -> FeedView {
        self.view.borrow().clone()
    }

    /// Resolves once a newer view is published; `false` once the runtime has stopped.
    pub async fn changed(&mut self) -> bool {
        self.view.changed().await.is_ok()
    }

    pub fn watch(&self) -> watch::Receiver<FeedView> {
        self.view.clone()
    }

    pub async fn set_scope(&self, scope: Scope) -> Result<(), FeedClosed> {
        self.send(FeedCommand::SetScope(scope)).await
    }

    /// Returns the provisional event once it is in the store; the write itself is still pending.
    pub async fn submit(&self, payload: Payload) -> Result<Event, SubmitError> {
        let (reply, response) = oneshot::channel();
        self.send(FeedCommand::Submit { payload, reply })
            .await
            .map_err(|_| SubmitError::Closed)?;
        response.await.map_err(|_| SubmitError::Closed)?
    }

    pub async fn retry_push(&self) -> Result<(), FeedClosed> {
        self.send(FeedCommand::RetryPush).await
    }

    pub async fn dispose(&self) -> Result<(), FeedClosed> {
        self.send(FeedCommand::Dispose).await
    }

    async fn send(&self, command: FeedCommand) -> Result<(), FeedClosed> {
        self.commands.send(command).await.map_err(|_| FeedClosed)
    }
}

/// Starts the runtime task that owns the scope controller of one feed.
pub fn spawn_feed(
    kind: FeedKind,
    config: FeedConfig,
    collaborators: FeedCollaborators,
) -> (FeedHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let (inbox_tx, inbox_rx) = mpsc::channel(config.inbox_capacity.max(1));
    let (view_tx, view_rx) = watch::channel(FeedView::empty(kind));

    let controller = ScopeController::new(kind, config, collaborators, inbox_tx);
    let task = tokio::spawn(run(controller, command_rx, inbox_rx, view_tx));
    let handle = FeedHandle {
        kind,
        commands: command_tx,
        view: view_rx,
    };
    (handle, task)
}

async fn run(
    mut controller: ScopeController,
    mut commands: mpsc::Receiver<FeedCommand>,
    mut inbox: mpsc::Receiver<FeedInput>,
    view: watch::Sender<FeedView>,
) {
    info!(event = "feed_runtime_start", feed = controller.kind().as_str());
    loop {
        let changed = tokio::select! {
            biased;
            command = commands.recv() => match command {
                Some(FeedCommand::Dispose) | None => break,
                Some(command) => apply(&mut controller, command),
            },
            Some(input) = inbox.recv() => controller.handle(input),
        };
        if changed {
            let next = controller.view();
            debug!(event = "feed_view_publish", revision = next.revision, entries = next.entries.len());
            view.send_replace(next);
        }
    }

    controller.dispose();
    view.send_replace(controller.view());
    info!(event = "feed_runtime_stop", feed = controller.kind().as_str());
}

fn apply(controller: &mut ScopeController, command: FeedCommand) -> bool {
    match command {
        FeedCommand::SetScope(scope) => controller.set_scope(scope),
        FeedCommand::Submit { payload, reply } => {
            let result = controller.submit(payload);
            let changed = result.is_ok();
            let _ = reply.send(result);
            changed
        }
        FeedCommand::RetryPush => controller.retry_push(),
        FeedCommand::Dispose => false,
    }
}
