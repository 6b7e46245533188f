use crate::controller::FeedInput;
use bms_core::feed_contracts::{Event, Origin};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

const BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("broadcast channel unavailable: {0}")]
pub struct RelayUnavailable(pub String);

/// What travels between sibling instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayFrame {
    pub tab_id: Uuid,
    pub event: Event,
}

pub trait BroadcastPort: Send + Sync {
    fn post(&self, message: String) -> Result<(), RelayUnavailable>;
    fn subscribe(&self) -> broadcast::Receiver<String>;
    fn close(&self);
}

/// Same-origin broadcast facility, opened once per topic.
pub trait BroadcastPrimitive: Send + Sync {
    fn open(&self, topic: &str) -> Result<Box<dyn BroadcastPort>, RelayUnavailable>;
}

/// In-process bus shared by every feed instance holding a clone.
#[derive(Clone, Default)]
pub struct LocalBroadcastBus {
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<String>>>>,
}

impl LocalBroadcastBus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BroadcastPrimitive for LocalBroadcastBus {
    fn open(&self, topic: &str) -> Result<Box<dyn BroadcastPort>, RelayUnavailable> {
        let mut topics = self
            .topics
            .lock()
            .map_err(|_| RelayUnavailable("broadcast registry poisoned".to_string()))?;
        let sender = topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(BUS_CAPACITY).0)
            .clone();
        Ok(Box::new(LocalPort {
            sender,
            closed: Mutex::new(false),
        }))
    }
}

struct LocalPort {
    sender: broadcast::Sender<String>,
    closed: Mutex<bool>,
}

impl BroadcastPort for LocalPort {
    fn post(&self, message: String) -> Result<(), RelayUnavailable> {
        if self.closed.lock().map(|closed| *closed).unwrap_or(true) {
            return Err(RelayUnavailable("port closed".to_string()));
        }
        // No receivers is not an error; nobody else is listening yet.
        let _ = self.sender.send(message);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    fn close(&self) {
        if let Ok(mut closed) = self.closed.lock() {
            *closed = true;
        }
    }
}

/// Primitive for hosts with no broadcast facility; every open fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableBroadcast;

impl BroadcastPrimitive for UnavailableBroadcast {
    fn open(&self, _topic: &str) -> Result<Box<dyn BroadcastPort>, RelayUnavailable> {
        Err(RelayUnavailable("no broadcast facility on this host".to_string()))
    }
}

/// Host-wide bus shared by separate processes through a directory of datagram
/// sockets, one per open port, named `<topic>.<id>.sock`.
#[derive(Debug, Clone)]
pub struct UnixDatagramBus {
    dir: PathBuf,
}

impl UnixDatagramBus {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(not(unix))]
impl BroadcastPrimitive for UnixDatagramBus {
    fn open(&self, _topic: &str) -> Result<Box<dyn BroadcastPort>, RelayUnavailable> {
        Err(RelayUnavailable(format!(
            "unix sockets unavailable for {}",
            self.dir.display()
        )))
    }
}

#[cfg(unix)]
mod unix {
    use super::{BroadcastPort, BroadcastPrimitive, RelayUnavailable, UnixDatagramBus, BUS_CAPACITY};
    use std::fs;
    use std::io::ErrorKind;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use tokio::net::UnixDatagram;
    use tokio::sync::broadcast;
    use tokio::task::JoinHandle;
    use tracing::{debug, warn};
    use uuid::Uuid;

    pub(super) const MAX_DATAGRAM_BYTES: usize = 64 * 1024;

    impl BroadcastPrimitive for UnixDatagramBus {
        fn open(&self, topic: &str) -> Result<Box<dyn BroadcastPort>, RelayUnavailable> {
            fs::create_dir_all(&self.dir).map_err(|err| unavailable(&self.dir, err))?;
            let _ = fs::set_permissions(&self.dir, fs::Permissions::from_mode(0o700));
            let path = self
                .dir
                .join(format!("{topic}.{}.sock", Uuid::new_v4().simple()));
            let socket = Arc::new(UnixDatagram::bind(&path).map_err(|err| unavailable(&path, err))?);
            let _ = fs::set_permissions(&path, fs::Permissions::from_mode(0o600));
            let (sender, _) = broadcast::channel(BUS_CAPACITY);
            let receiver = tokio::spawn(receive(Arc::clone(&socket), sender.clone()));
            debug!(event = "relay_socket_bound", path = %path.display());
            Ok(Box::new(DatagramPort {
                dir: self.dir.clone(),
                prefix: format!("{topic}."),
                path,
                socket,
                sender,
                receiver: Mutex::new(Some(receiver)),
            }))
        }
    }

    fn unavailable(path: &Path, err: std::io::Error) -> RelayUnavailable {
        RelayUnavailable(format!("{}: {err}", path.display()))
    }

    struct DatagramPort {
        dir: PathBuf,
        prefix: String,
        path: PathBuf,
        socket: Arc<UnixDatagram>,
        sender: broadcast::Sender<String>,
        receiver: Mutex<Option<JoinHandle<()>>>,
    }

    impl DatagramPort {
        fn is_open(&self) -> bool {
            self.receiver
                .lock()
                .map(|receiver| receiver.is_some())
                .unwrap_or(false)
        }

        /// Another port's socket on the same topic.
        fn is_sibling(&self, path: &Path) -> bool {
            if path == self.path {
                return false;
            }
            path.file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix(self.prefix.as_str()))
                .and_then(|rest| rest.strip_suffix(".sock"))
                .is_some_and(|id| !id.is_empty() && !id.contains('.'))
        }
    }

    impl BroadcastPort for DatagramPort {
        fn post(&self, message: String) -> Result<(), RelayUnavailable> {
            if !self.is_open() {
                return Err(RelayUnavailable("port closed".to_string()));
            }
            if message.len() > MAX_DATAGRAM_BYTES {
                return Err(RelayUnavailable(format!(
                    "frame of {} bytes exceeds the {MAX_DATAGRAM_BYTES} byte datagram limit",
                    message.len()
                )));
            }
            let entries = fs::read_dir(&self.dir).map_err(|err| unavailable(&self.dir, err))?;
            for path in entries.flatten().map(|entry| entry.path()) {
                if !self.is_sibling(&path) {
                    continue;
                }
                match self.socket.try_send_to(message.as_bytes(), &path) {
                    Ok(_) => {}
                    Err(err)
                        if matches!(err.kind(), ErrorKind::ConnectionRefused | ErrorKind::NotFound) =>
                    {
                        // Left behind by an instance that exited without closing.
                        debug!(event = "relay_stale_socket_removed", path = %path.display());
                        let _ = fs::remove_file(&path);
                    }
                    Err(err) => {
                        warn!(event = "relay_send_failed", path = %path.display(), error = %err)
                    }
                }
            }
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<String> {
            self.sender.subscribe()
        }

        fn close(&self) {
            let receiver = match self.receiver.lock() {
                Ok(mut receiver) => receiver.take(),
                Err(_) => None,
            };
            if let Some(receiver) = receiver {
                receiver.abort();
                let _ = fs::remove_file(&self.path);
            }
        }
    }

    impl Drop for DatagramPort {
        fn drop(&mut self) {
            self.close();
        }
    }

    async fn receive(socket: Arc<UnixDatagram>, sender: broadcast::Sender<String>) {
        let mut buf = vec![0u8; MAX_DATAGRAM_BYTES];
        loop {
            let len = match socket.recv(&mut buf).await {
                Ok(len) => len,
                Err(err) => {
                    warn!(event = "relay_socket_error", error = %err);
                    return;
                }
            };
            match std::str::from_utf8(&buf[..len]) {
                Ok(text) => {
                    let _ = sender.send(text.to_string());
                }
                Err(err) => warn!(event = "relay_malformed_datagram", error = %err),
            }
        }
    }
}

pub struct CrossTabRelay {
    topic: String,
    tab_id: Uuid,
    port: Option<Box<dyn BroadcastPort>>,
    listener: Option<JoinHandle<()>>,
}

impl CrossTabRelay {
    /// Degrades to a no-op relay when the primitive cannot open the topic.
    pub fn open(
        primitive: &dyn BroadcastPrimitive,
        topic: &str,
        tab_id: Uuid,
        inbox: mpsc::Sender<FeedInput>,
    ) -> Self {
        let port = match primitive.open(topic) {
            Ok(port) => port,
            Err(err) => {
                warn!(event = "relay_unavailable", topic, error = %err);
                return Self::disabled(topic, tab_id);
            }
        };
        let receiver = port.subscribe();
        let listener = tokio::spawn(listen(topic.to_string(), tab_id, receiver, inbox));
        info!(event = "relay_open", topic, tab_id = %tab_id);
        Self {
            topic: topic.to_string(),
            tab_id,
            port: Some(port),
            listener: Some(listener),
        }
    }

    pub fn disabled(topic: &str, tab_id: Uuid) -> Self {
        Self {
            topic: topic.to_string(),
            tab_id,
            port: None,
            listener: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.port.is_some()
    }

    pub fn tab_id(&self) -> Uuid {
        self.tab_id
    }

    /// Best-effort; delivery failures are logged and swallowed.
    pub fn publish(&self, event: &Event) {
        let Some(port) = &self.port else {
            return;
        };
        let frame = RelayFrame {
            tab_id: self.tab_id,
            event: event.clone(),
        };
        let message = match serde_json::to_string(&frame) {
            Ok(message) => message,
            Err(err) => {
                warn!(event = "relay_encode_error", topic = %self.topic, error = %err);
                return;
            }
        };
        match port.post(message) {
            Ok(()) => debug!(event = "relay_publish", topic = %self.topic, id = %event.id),
            Err(err) => warn!(event = "relay_publish_failed", topic = %self.topic, error = %err),
        }
    }

    pub fn dispose(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        if let Some(port) = self.port.take() {
            port.close();
            info!(event = "relay_close", topic = %self.topic);
        }
    }
}

impl Drop for CrossTabRelay {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn listen(
    topic: String,
    tab_id: Uuid,
    mut receiver: broadcast::Receiver<String>,
    inbox: mpsc::Sender<FeedInput>,
) {
    loop {
        let message = match receiver.recv().await {
            Ok(message) => message,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(event = "relay_lagged", topic = %topic, skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };
        let frame: RelayFrame = match serde_json::from_str(&message) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(event = "relay_malformed_frame", topic = %topic, error = %err);
                continue;
            }
        };
        if frame.tab_id == tab_id {
            continue;
        }
        let mut event = frame.event;
        event.origin = Origin::CrossTab;
        if inbox.send(FeedInput::Relay(event)).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bms_core::feed_contracts::Payload;
    use bms_core::Scope;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn chat_event() -> Event {
        Event::provisional(
            Scope::department("Admin"),
            Payload::chat("ana", "hola"),
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("ts"),
        )
    }

    async fn next_relay(rx: &mut mpsc::Receiver<FeedInput>) -> Option<Event> {
        match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
            Ok(Some(FeedInput::Relay(event))) => Some(event),
            _ => None,
        }
    }

    #[tokio::test]
    async fn siblings_receive_frames_but_not_their_own() {
        let bus = LocalBroadcastBus::new();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let relay_a = CrossTabRelay::open(&bus, "chat", Uuid::new_v4(), tx_a);
        let _relay_b = CrossTabRelay::open(&bus, "chat", Uuid::new_v4(), tx_b);
        assert!(relay_a.is_active());

        let event = chat_event();
        relay_a.publish(&event);

        let received = next_relay(&mut rx_b).await.expect("sibling frame");
        assert_eq!(received.id, event.id);
        assert_eq!(received.origin, Origin::CrossTab);
        assert!(next_relay(&mut rx_a).await.is_none());
    }

    #[tokio::test]
    async fn topics_are_isolated_and_garbage_is_skipped() {
        let bus = LocalBroadcastBus::new();
        let (tx, mut rx) = mpsc::channel(8);
        let _listener = CrossTabRelay::open(&bus, "notifications", Uuid::new_v4(), tx);
        let (unused, _) = mpsc::channel(1);
        let chat = CrossTabRelay::open(&bus, "chat", Uuid::new_v4(), unused);
        chat.publish(&chat_event());

        let raw = bus.open("notifications").expect("port");
        raw.post("not json".to_string()).expect("post");
        assert!(next_relay(&mut rx).await.is_none());
    }

    #[tokio::test]
    async fn unavailable_primitive_degrades_to_no_op() {
        let (tx, _rx) = mpsc::channel(8);
        let mut relay = CrossTabRelay::open(&UnavailableBroadcast, "chat", Uuid::new_v4(), tx);
        assert!(!relay.is_active());
        relay.publish(&chat_event());
        relay.dispose();
        relay.dispose();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn datagram_bus_reaches_instances_that_share_only_the_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let (tx_other, mut rx_other) = mpsc::channel(8);
        let relay_a = CrossTabRelay::open(&UnixDatagramBus::new(dir.path()), "chat", Uuid::new_v4(), tx_a);
        let _relay_b = CrossTabRelay::open(&UnixDatagramBus::new(dir.path()), "chat", Uuid::new_v4(), tx_b);
        let _other_topic = CrossTabRelay::open(
            &UnixDatagramBus::new(dir.path()),
            "notifications",
            Uuid::new_v4(),
            tx_other,
        );
        assert!(relay_a.is_active());

        let event = chat_event();
        relay_a.publish(&event);

        let received = next_relay(&mut rx_b).await.expect("sibling frame");
        assert_eq!(received.id, event.id);
        assert_eq!(received.origin, Origin::CrossTab);
        assert!(next_relay(&mut rx_a).await.is_none());
        assert!(next_relay(&mut rx_other).await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn datagram_bus_cleans_up_sockets_of_gone_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stale = dir.path().join("chat.0badc0ffee.sock");
        drop(std::os::unix::net::UnixDatagram::bind(&stale).expect("bind stale"));
        assert!(stale.exists());

        let bus = UnixDatagramBus::new(dir.path());
        let port = bus.open("chat").expect("port");
        let sockets = || std::fs::read_dir(dir.path()).expect("read dir").count();
        assert_eq!(sockets(), 2);

        port.post("{}".to_string()).expect("post");
        assert!(!stale.exists());
        assert!(port.post("x".repeat(unix::MAX_DATAGRAM_BYTES + 1)).is_err());

        port.close();
        assert_eq!(sockets(), 0);
        assert!(port.post("{}".to_string()).is_err());
    }

    #[tokio::test]
    async fn closed_port_rejects_posts() {
        let bus = LocalBroadcastBus::new();
        let port = bus.open("chat").expect("port");
        port.close();
        assert!(port.post("{}".to_string()).is_err());
    }
}
