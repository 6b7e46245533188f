use crate::config::RetryPolicy;
use crate::controller::FeedInput;
use crate::transport::{PushChannel, PushSignal, PushTransport, SubscriptionId};
use bms_core::feed_contracts::ConnectionState;
use bms_core::Scope;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { attempt: u32, delay: Duration },
    GiveUp,
}

/// Connection lifecycle of one push subscription.
///
/// `idle -> connecting -> connected -> disconnected -> reconnecting -> connected | failed`.
/// The attempt counter resets on every successful connect.
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    policy: RetryPolicy,
    attempt: u32,
}

impl ConnectionMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: ConnectionState::Idle,
            policy,
            attempt: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn open(&mut self) -> ConnectionState {
        self.attempt = 0;
        self.state = ConnectionState::Connecting;
        self.state
    }

    pub fn on_ready(&mut self) -> bool {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. } => {
                self.state = ConnectionState::Connected;
                self.attempt = 0;
                true
            }
            _ => false,
        }
    }

    pub fn on_closed(&mut self) -> bool {
        match self.state {
            ConnectionState::Connecting
            | ConnectionState::Connected
            | ConnectionState::Reconnecting { .. } => {
                self.state = ConnectionState::Disconnected;
                true
            }
            _ => false,
        }
    }

    pub fn next_retry(&mut self) -> RetryDecision {
        if self.state != ConnectionState::Disconnected {
            return RetryDecision::GiveUp;
        }
        if self.attempt >= self.policy.max_attempts {
            self.state = ConnectionState::Failed;
            return RetryDecision::GiveUp;
        }
        self.attempt += 1;
        self.state = ConnectionState::Reconnecting {
            attempt: self.attempt,
        };
        RetryDecision::Retry {
            attempt: self.attempt,
            delay: self.policy.delay,
        }
    }

    /// Only a connected subscription hands events to the merge path.
    pub fn accepts_events(&self) -> bool {
        self.state.is_connected()
    }
}

/// Live push binding for one scope. Owned by the scope controller.
pub struct PushSubscription {
    topic: String,
    transport: Arc<dyn PushTransport>,
    current: Arc<Mutex<Option<SubscriptionId>>>,
    task: Option<JoinHandle<()>>,
}

impl PushSubscription {
    /// Issues the transport subscribe immediately, then drives the lifecycle on a task.
    pub fn open(
        transport: Arc<dyn PushTransport>,
        scope: &Scope,
        generation: u64,
        policy: RetryPolicy,
        inbox: mpsc::Sender<FeedInput>,
    ) -> Self {
        let topic = scope.push_topic();
        let first = transport.subscribe(&topic);
        let current = Arc::new(Mutex::new(Some(first.id)));
        info!(event = "push_open", topic = %topic, generation, subscription = first.id);

        let worker = PushLoop {
            transport: Arc::clone(&transport),
            topic: topic.clone(),
            generation,
            inbox,
            current: Arc::clone(&current),
        };
        let task = tokio::spawn(worker.run(policy, first));

        Self {
            topic,
            transport,
            current,
            task: Some(task),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Cancels pending retries and releases the transport handle. Idempotent.
    pub fn dispose(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!(event = "push_dispose", topic = %self.topic);
        }
        release(&self.current, self.transport.as_ref());
    }
}

impl Drop for PushSubscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn release(slot: &Mutex<Option<SubscriptionId>>, transport: &dyn PushTransport) {
    let id = match slot.lock() {
        Ok(mut slot) => slot.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };
    if let Some(id) = id {
        transport.unsubscribe(id);
    }
}

struct PushLoop {
    transport: Arc<dyn PushTransport>,
    topic: String,
    generation: u64,
    inbox: mpsc::Sender<FeedInput>,
    current: Arc<Mutex<Option<SubscriptionId>>>,
}

impl PushLoop {
    async fn run(self, policy: RetryPolicy, first: PushChannel) {
        let mut machine = ConnectionMachine::new(policy);
        if !self.report(machine.open()).await {
            return;
        }

        let mut next = Some(first);
        loop {
            let channel = match next.take() {
                Some(channel) => channel,
                None => self.resubscribe(),
            };
            let mut signals = channel.signals;

            let reason = loop {
                match signals.recv().await {
                    Some(PushSignal::Ready) => {
                        if machine.on_ready() {
                            info!(event = "push_connected", topic = %self.topic);
                            if !self.report(machine.state()).await {
                                return;
                            }
                        }
                    }
                    Some(PushSignal::Payload(payload)) => {
                        if !machine.accepts_events() {
                            debug!(
                                event = "push_event_unobserved",
                                topic = %self.topic,
                                state = machine.state().as_str()
                            );
                            continue;
                        }
                        let input = FeedInput::Push {
                            generation: self.generation,
                            payload,
                        };
                        if self.inbox.send(input).await.is_err() {
                            return;
                        }
                    }
                    Some(PushSignal::Closed(reason)) => break reason,
                    None => break "transport dropped the channel".to_string(),
                }
            };

            release(&self.current, self.transport.as_ref());
            machine.on_closed();
            warn!(event = "push_disconnected", topic = %self.topic, reason = %reason);
            if !self.report(machine.state()).await {
                return;
            }

            match machine.next_retry() {
                RetryDecision::Retry { attempt, delay } => {
                    info!(
                        event = "push_reconnect_scheduled",
                        topic = %self.topic,
                        attempt,
                        delay_ms = delay.as_millis() as u64
                    );
                    if !self.report(machine.state()).await {
                        return;
                    }
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    warn!(event = "push_failed", topic = %self.topic);
                    let _ = self.report(machine.state()).await;
                    return;
                }
            }
        }
    }

    fn resubscribe(&self) -> PushChannel {
        let channel = self.transport.subscribe(&self.topic);
        match self.current.lock() {
            Ok(mut slot) => *slot = Some(channel.id),
            Err(poisoned) => *poisoned.into_inner() = Some(channel.id),
        }
        channel
    }

    async fn report(&self, state: ConnectionState) -> bool {
        self.inbox
            .send(FeedInput::Connection {
                generation: self.generation,
                state,
            })
            .await
            .is_ok()
    }
}
