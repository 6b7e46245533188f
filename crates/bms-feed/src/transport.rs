use bms_core::hub_ipc::FrameError;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

pub type SubscriptionId = u64;

const SIGNAL_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("push hub connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("push hub i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("push frame: {0}")]
    Frame(#[from] FrameError),
}

/// Raw signals a transport hands to a push subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum PushSignal {
    Ready,
    Payload(Value),
    Closed(String),
}

pub struct PushChannel {
    pub id: SubscriptionId,
    pub signals: mpsc::Receiver<PushSignal>,
}

impl PushChannel {
    pub fn new(id: SubscriptionId) -> (mpsc::Sender<PushSignal>, Self) {
        let (tx, rx) = mpsc::channel(SIGNAL_QUEUE_CAPACITY);
        (tx, Self { id, signals: rx })
    }
}

/// Server-push channel collaborator. `subscribe` must not block; connection
/// progress is reported through the returned channel's signals.
pub trait PushTransport: Send + Sync {
    fn subscribe(&self, topic: &str) -> PushChannel;
    fn unsubscribe(&self, id: SubscriptionId);
}

#[derive(Debug, Clone)]
pub struct UnixPushConfig {
    pub socket_path: PathBuf,
    pub client_id: String,
    pub auth_token: Option<String>,
    pub connect_timeout: Duration,
}

impl UnixPushConfig {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            client_id: format!("bms-feed-{}", std::process::id()),
            auth_token: None,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(unix)]
pub use unix::UnixPushTransport;

#[cfg(not(unix))]
pub struct UnixPushTransport {
    config: UnixPushConfig,
    next_id: std::sync::atomic::AtomicU64,
}

#[cfg(not(unix))]
impl UnixPushTransport {
    pub fn new(config: UnixPushConfig) -> Self {
        Self {
            config,
            next_id: std::sync::atomic::AtomicU64::new(1),
        }
    }
}

#[cfg(not(unix))]
impl PushTransport for UnixPushTransport {
    fn subscribe(&self, _topic: &str) -> PushChannel {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let (tx, channel) = PushChannel::new(id);
        let _ = tx.try_send(PushSignal::Closed(format!(
            "unix sockets unavailable for {}",
            self.config.socket_path.display()
        )));
        channel
    }

    fn unsubscribe(&self, _id: SubscriptionId) {}
}

#[cfg(unix)]
mod unix {
    use super::{
        PushChannel, PushSignal, PushTransport, SubscriptionId, TransportError, UnixPushConfig,
    };
    use bms_core::hub_ipc::{
        FrameError, HelloPayload, HubEnvelope, HubMsg, LineSplitter, TopicPayload,
        DEFAULT_MAX_FRAME_BYTES,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::unix::OwnedWriteHalf;
    use tokio::net::UnixStream;
    use tokio::sync::{mpsc, oneshot};
    use tokio::task::JoinHandle;
    use tracing::{debug, warn};

    struct ActiveSubscription {
        stop: Option<oneshot::Sender<()>>,
        task: JoinHandle<()>,
    }

    /// One hub connection per subscription; the hub speaks [`HubEnvelope`] NDJSON.
    pub struct UnixPushTransport {
        config: UnixPushConfig,
        next_id: AtomicU64,
        active: Arc<Mutex<HashMap<SubscriptionId, ActiveSubscription>>>,
    }

    impl UnixPushTransport {
        pub fn new(config: UnixPushConfig) -> Self {
            Self {
                config,
                next_id: AtomicU64::new(1),
                active: Arc::new(Mutex::new(HashMap::new())),
            }
        }
    }

    impl PushTransport for UnixPushTransport {
        fn subscribe(&self, topic: &str) -> PushChannel {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let (tx, channel) = PushChannel::new(id);
            let (stop_tx, stop_rx) = oneshot::channel();
            let config = self.config.clone();
            let topic = topic.to_string();
            let active = Arc::clone(&self.active);
            // Held across the spawn so a fast-failing task cannot remove itself before insertion.
            let mut registry = match self.active.lock() {
                Ok(registry) => registry,
                Err(poisoned) => poisoned.into_inner(),
            };
            let task = tokio::spawn(async move {
                let reason = match run_subscription(&config, &topic, &tx, stop_rx).await {
                    Ok(Some(reason)) => reason,
                    Ok(None) => return,
                    Err(err) => err.to_string(),
                };
                let _ = tx.send(PushSignal::Closed(reason)).await;
                if let Ok(mut active) = active.lock() {
                    active.remove(&id);
                }
            });
            registry.insert(
                id,
                ActiveSubscription {
                    stop: Some(stop_tx),
                    task,
                },
            );
            drop(registry);
            channel
        }

        fn unsubscribe(&self, id: SubscriptionId) {
            let entry = match self.active.lock() {
                Ok(mut active) => active.remove(&id),
                Err(_) => None,
            };
            let Some(mut entry) = entry else {
                return;
            };
            let stopped = entry
                .stop
                .take()
                .map(|stop| stop.send(()).is_ok())
                .unwrap_or(false);
            if !stopped {
                entry.task.abort();
            }
            debug!(event = "push_transport_unsubscribe", subscription = id);
        }
    }

    /// Returns `Ok(None)` when stopped by `unsubscribe`, otherwise the close reason.
    async fn run_subscription(
        config: &UnixPushConfig,
        topic: &str,
        tx: &mpsc::Sender<PushSignal>,
        mut stop: oneshot::Receiver<()>,
    ) -> Result<Option<String>, TransportError> {
        let stream = tokio::time::timeout(
            config.connect_timeout,
            UnixStream::connect(&config.socket_path),
        )
        .await
        .map_err(|_| TransportError::ConnectTimeout(config.connect_timeout))??;

        let (mut reader, mut writer) = stream.into_split();
        send_envelope(
            &mut writer,
            &envelope(
                config,
                HubMsg::Hello(HelloPayload {
                    client_id: config.client_id.clone(),
                    capabilities: vec!["event".to_string(), "ready".to_string()],
                    auth_token: config.auth_token.clone(),
                }),
            ),
        )
        .await?;
        send_envelope(
            &mut writer,
            &envelope(
                config,
                HubMsg::Subscribe(TopicPayload {
                    topic: topic.to_string(),
                }),
            ),
        )
        .await?;

        let mut lines = LineSplitter::new(DEFAULT_MAX_FRAME_BYTES);
        let mut read_buf = [0u8; 8192];
        loop {
            tokio::select! {
                _ = &mut stop => {
                    let unsubscribe = envelope(
                        config,
                        HubMsg::Unsubscribe(TopicPayload { topic: topic.to_string() }),
                    );
                    let _ = send_envelope(&mut writer, &unsubscribe).await;
                    return Ok(None);
                }
                read = reader.read(&mut read_buf) => {
                    let read = read?;
                    if read == 0 {
                        return Ok(Some("push hub closed the connection".to_string()));
                    }
                    if let Err(err) = lines.feed(&read_buf[..read]) {
                        warn!(event = "push_decode_error", topic, error = %err);
                    }
                    while let Some(line) = lines.next_line() {
                        let frame = match HubEnvelope::decode(&line, DEFAULT_MAX_FRAME_BYTES) {
                            Ok(frame) => frame,
                            Err(FrameError::UnsupportedVersion(version)) => {
                                return Ok(Some(format!(
                                    "push hub speaks unsupported protocol version {version}"
                                )));
                            }
                            Err(err) => {
                                warn!(event = "push_decode_error", topic, error = %err);
                                continue;
                            }
                        };
                        let signal = match frame.msg {
                            HubMsg::Ready(payload) if payload.topic == topic => PushSignal::Ready,
                            HubMsg::Event(payload) if payload.topic == topic => {
                                PushSignal::Payload(payload.data)
                            }
                            HubMsg::Error(payload)
                                if payload.topic.as_deref().map_or(true, |t| t == topic) =>
                            {
                                return Ok(Some(format!("{}: {}", payload.code, payload.message)));
                            }
                            _ => continue,
                        };
                        if tx.send(signal).await.is_err() {
                            return Ok(None);
                        }
                    }
                }
            }
        }
    }

    fn envelope(config: &UnixPushConfig, msg: HubMsg) -> HubEnvelope {
        HubEnvelope::new(config.client_id.as_str(), msg)
    }

    async fn send_envelope(
        writer: &mut OwnedWriteHalf,
        envelope: &HubEnvelope,
    ) -> Result<(), TransportError> {
        let frame = envelope.encode(DEFAULT_MAX_FRAME_BYTES)?;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }
}
