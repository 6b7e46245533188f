#![allow(dead_code)]

use async_trait::async_trait;
use bms_core::feed_contracts::Payload;
use bms_core::Scope;
use bms_feed::{
    BackendError, BroadcastPrimitive, FeedBackend, FeedCollaborators, FeedHandle, FeedView,
    PushChannel, PushSignal, PushTransport,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const WAIT: Duration = Duration::from_secs(30);

pub fn chat_row(id: u64, department: &str, author: &str, text: &str) -> Value {
    json!({
        "id": id,
        "user_name": author,
        "department_id": department,
        "message": text,
        "created_at": Utc::now().to_rfc3339(),
    })
}

pub fn notification_row(id: u64, kind: &str, message: &str) -> Value {
    json!({
        "id": id,
        "type": kind,
        "message": message,
        "created_at": Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Clone)]
pub enum CreateReply {
    Ack,
    /// Echo the payload back as a new row and add it to later snapshots.
    Echo,
    Fail(BackendError),
    Hang,
}

/// In-memory backend with a call log.
pub struct ScriptedBackend {
    rows: Mutex<HashMap<Scope, Vec<Value>>>,
    snapshot_error: Mutex<Option<BackendError>>,
    create_reply: Mutex<CreateReply>,
    next_id: AtomicU64,
    log: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(HashMap::new()),
            snapshot_error: Mutex::new(None),
            create_reply: Mutex::new(CreateReply::Ack),
            next_id: AtomicU64::new(1_000),
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn push_row(&self, scope: &Scope, row: Value) {
        self.rows
            .lock()
            .expect("rows")
            .entry(scope.clone())
            .or_default()
            .push(row);
    }

    pub fn fail_snapshots(&self, error: Option<BackendError>) {
        *self.snapshot_error.lock().expect("snapshot error") = error;
    }

    pub fn reply_to_creates(&self, reply: CreateReply) {
        *self.create_reply.lock().expect("create reply") = reply;
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().expect("log").clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.log().iter().filter(|line| line.starts_with(prefix)).count()
    }
}

#[async_trait]
impl FeedBackend for ScriptedBackend {
    async fn snapshot(&self, scope: &Scope) -> Result<Vec<Value>, BackendError> {
        self.log.lock().expect("log").push(format!("snapshot:{scope}"));
        if let Some(error) = self.snapshot_error.lock().expect("snapshot error").clone() {
            return Err(error);
        }
        Ok(self
            .rows
            .lock()
            .expect("rows")
            .get(scope)
            .cloned()
            .unwrap_or_default())
    }

    async fn create(&self, scope: &Scope, payload: &Payload) -> Result<Option<Value>, BackendError> {
        self.log.lock().expect("log").push(format!("create:{scope}"));
        let reply = self.create_reply.lock().expect("create reply").clone();
        match reply {
            CreateReply::Ack => Ok(None),
            CreateReply::Fail(error) => Err(error),
            CreateReply::Hang => std::future::pending().await,
            CreateReply::Echo => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                let row = match (scope, payload) {
                    (Scope::Department(department), Payload::Chat { author, text }) => {
                        chat_row(id, department, author, text)
                    }
                    (_, Payload::Notification { kind, message }) => {
                        notification_row(id, kind.as_str(), message)
                    }
                    _ => return Err(BackendError::Request("mismatched payload".to_string())),
                };
                self.push_row(scope, row.clone());
                Ok(Some(row))
            }
        }
    }
}

/// Push transport whose connections are driven by the test.
pub struct ScriptedTransport {
    accept: Mutex<bool>,
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, (String, mpsc::Sender<PushSignal>)>>,
    log: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn accepting() -> Arc<Self> {
        Self::with_accept(true)
    }

    pub fn refusing() -> Arc<Self> {
        Self::with_accept(false)
    }

    fn with_accept(accept: bool) -> Arc<Self> {
        Arc::new(Self {
            accept: Mutex::new(accept),
            next_id: AtomicU64::new(1),
            live: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn set_accept(&self, accept: bool) {
        *self.accept.lock().expect("accept") = accept;
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().expect("log").clone()
    }

    pub fn subscribe_count(&self) -> usize {
        self.log()
            .iter()
            .filter(|line| line.starts_with("subscribe:"))
            .count()
    }

    /// Delivers `payload` on every live subscription for `topic`; returns how many got it.
    pub async fn emit(&self, topic: &str, payload: Value) -> usize {
        let senders: Vec<_> = self
            .live
            .lock()
            .expect("live")
            .values()
            .filter(|(live_topic, _)| live_topic == topic)
            .map(|(_, sender)| sender.clone())
            .collect();
        let mut delivered = 0;
        for sender in senders {
            if sender.send(PushSignal::Payload(payload.clone())).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

impl PushTransport for ScriptedTransport {
    fn subscribe(&self, topic: &str) -> PushChannel {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, channel) = PushChannel::new(id);
        self.log
            .lock()
            .expect("log")
            .push(format!("subscribe:{topic}:{id}"));
        if *self.accept.lock().expect("accept") {
            let _ = tx.try_send(PushSignal::Ready);
            self.live
                .lock()
                .expect("live")
                .insert(id, (topic.to_string(), tx));
        } else {
            let _ = tx.try_send(PushSignal::Closed("connection refused".to_string()));
        }
        channel
    }

    fn unsubscribe(&self, id: u64) {
        self.live.lock().expect("live").remove(&id);
        self.log.lock().expect("log").push(format!("unsubscribe:{id}"));
    }
}

pub fn collaborators(
    backend: Arc<ScriptedBackend>,
    transport: Arc<ScriptedTransport>,
    broadcast: Arc<dyn BroadcastPrimitive>,
) -> FeedCollaborators {
    FeedCollaborators {
        backend,
        transport,
        broadcast,
    }
}

pub async fn wait_for(
    handle: &mut FeedHandle,
    within: Duration,
    predicate: impl Fn(&FeedView) -> bool,
) -> FeedView {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        let view = handle.view();
        if predicate(&view) {
            return view;
        }
        match tokio::time::timeout_at(deadline, handle.changed()).await {
            Ok(true) => continue,
            Ok(false) => panic!("feed runtime stopped; last view: {view:?}"),
            Err(_) => panic!("condition not reached; last view: {view:?}"),
        }
    }
}
