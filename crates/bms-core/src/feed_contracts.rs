use crate::{id_from_value, NotificationKind, Scope};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Server ids and locally minted ids never share a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventId {
    Server(String),
    Provisional(Uuid),
}

impl EventId {
    pub fn is_server(&self) -> bool {
        matches!(self, EventId::Server(_))
    }

    pub fn provisional(&self) -> Option<Uuid> {
        match self {
            EventId::Provisional(id) => Some(*id),
            EventId::Server(_) => None,
        }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventId::Server(id) => f.write_str(id),
            EventId::Provisional(id) => write!(f, "tmp-{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Optimistic,
    Push,
    Poll,
    CrossTab,
}

impl Origin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Optimistic => "optimistic",
            Self::Push => "push",
            Self::Poll => "poll",
            Self::CrossTab => "cross_tab",
        }
    }
}

/// Write status of a provisional event. Authoritative events are always `Pending`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    #[default]
    Pending,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Chat {
        author: String,
        text: String,
    },
    Notification {
        kind: NotificationKind,
        message: String,
    },
}

impl Payload {
    pub fn chat(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Chat {
            author: author.into(),
            text: text.into(),
        }
    }

    pub fn notification(kind: impl Into<NotificationKind>, message: impl Into<String>) -> Self {
        Self::Notification {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn author(&self) -> Option<&str> {
        match self {
            Payload::Chat { author, .. } => Some(author.as_str()),
            Payload::Notification { .. } => None,
        }
    }

    pub fn body(&self) -> &str {
        match self {
            Payload::Chat { text, .. } => text.as_str(),
            Payload::Notification { message, .. } => message.as_str(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.body().trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub scope: Scope,
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
    pub origin: Origin,
    pub confirmed: bool,
    #[serde(default)]
    pub delivery: Delivery,
    /// Provisional id this authoritative event retired, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo_of: Option<Uuid>,
}

impl Event {
    pub fn provisional(scope: Scope, payload: Payload, now: DateTime<Utc>) -> Self {
        Self {
            id: EventId::Provisional(Uuid::new_v4()),
            scope,
            payload,
            created_at: now,
            origin: Origin::Optimistic,
            confirmed: false,
            delivery: Delivery::Pending,
            echo_of: None,
        }
    }

    pub fn authoritative(
        id: impl Into<String>,
        scope: Scope,
        payload: Payload,
        created_at: DateTime<Utc>,
        origin: Origin,
    ) -> Self {
        Self {
            id: EventId::Server(id.into()),
            scope,
            payload,
            created_at,
            origin,
            confirmed: true,
            delivery: Delivery::Pending,
            echo_of: None,
        }
    }

    pub fn is_authoritative(&self) -> bool {
        self.id.is_server()
    }

    pub fn is_pending_echo(&self) -> bool {
        !self.confirmed && !self.is_authoritative()
    }

    /// Best-effort echo match: same scope, equal payload, timestamps within tolerance.
    pub fn echoes(&self, other: &Event, tolerance_ms: i64) -> bool {
        self.scope == other.scope
            && self.payload == other.payload
            && (self.created_at - other.created_at).num_milliseconds().abs() <= tolerance_ms
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Reconnecting { attempt: u32 },
    Failed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Failed => "failed",
        }
    }

    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Idle
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedEvent {
    #[error("event payload is not an object")]
    NotAnObject,
    #[error("event has no id")]
    MissingId,
    #[error("event is missing field '{0}'")]
    MissingField(&'static str),
}

/// Shapes a raw backend or push payload into an authoritative event bound to `bound`.
///
/// Push payloads may wrap the row in `notification`/`data`/`message`; a chat row
/// carrying its own `department_id` keeps that scope so the merge engine can reject it.
pub fn shape_event(
    bound: &Scope,
    raw: &Value,
    origin: Origin,
    received_at: DateTime<Utc>,
) -> Result<Event, MalformedEvent> {
    let row = unwrap_row(bound, raw).ok_or(MalformedEvent::NotAnObject)?;
    let id = row
        .get("id")
        .and_then(id_from_value)
        .ok_or(MalformedEvent::MissingId)?;
    let created_at = row
        .get("created_at")
        .and_then(parse_timestamp)
        .unwrap_or(received_at);

    let (scope, payload) = match bound {
        Scope::Department(_) => {
            let text = string_field(row, &["message", "text"])
                .ok_or(MalformedEvent::MissingField("message"))?;
            let author = string_field(row, &["user_name", "author"])
                .ok_or(MalformedEvent::MissingField("user_name"))?;
            let scope = row
                .get("department_id")
                .and_then(id_from_value)
                .map(Scope::Department)
                .unwrap_or_else(|| bound.clone());
            (scope, Payload::Chat { author, text })
        }
        Scope::Notifications => {
            let message =
                string_field(row, &["message"]).ok_or(MalformedEvent::MissingField("message"))?;
            let kind = string_field(row, &["type", "kind"])
                .map(|raw| NotificationKind::from(raw.as_str()))
                .unwrap_or_default();
            (Scope::Notifications, Payload::Notification { kind, message })
        }
    };

    Ok(Event::authoritative(id, scope, payload, created_at, origin))
}

fn unwrap_row<'a>(bound: &Scope, raw: &'a Value) -> Option<&'a Map<String, Value>> {
    let outer = raw.as_object()?;
    let wrappers: &[&str] = match bound {
        Scope::Department(_) => &["message", "data"],
        Scope::Notifications => &["notification", "data"],
    };
    for key in wrappers {
        if let Some(inner) = outer.get(*key).and_then(Value::as_object) {
            return Some(inner);
        }
    }
    Some(outer)
}

fn string_field(row: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| row.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .find(|value| !value.trim().is_empty())
}

/// Accepts RFC 3339, the backend's `YYYY-MM-DD HH:MM:SS` (UTC) form, or epoch millis.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => {
            let raw = raw.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
                return Some(parsed.with_timezone(&Utc));
            }
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}
