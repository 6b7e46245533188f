use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub mod feed_contracts;
pub mod hub_ipc;

pub const NOTIFICATION_TOPIC: &str = "notifications";
pub const NOTIFICATION_EVENT_NAME: &str = ".notification.sent";
pub const CHAT_EVENT_NAME: &str = ".message.sent";
pub const CHAT_RELAY_TOPIC: &str = "chat";

/// Partition key for feed events: one chat department or the notification stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Department(String),
    Notifications,
}

impl Scope {
    pub fn department(name: impl Into<String>) -> Self {
        Self::Department(name.into())
    }

    pub fn kind(&self) -> FeedKind {
        match self {
            Scope::Department(_) => FeedKind::Chat,
            Scope::Notifications => FeedKind::Notifications,
        }
    }

    pub fn department_name(&self) -> Option<&str> {
        match self {
            Scope::Department(name) => Some(name.as_str()),
            Scope::Notifications => None,
        }
    }

    /// Push channel name the backend broadcasts this scope's events on.
    pub fn push_topic(&self) -> String {
        match self {
            Scope::Department(name) => format!("chat.{name}"),
            Scope::Notifications => NOTIFICATION_TOPIC.to_string(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Department(name) => write!(f, "department:{name}"),
            Scope::Notifications => f.write_str(NOTIFICATION_TOPIC),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    Chat,
    Notifications,
}

impl FeedKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Notifications => "notifications",
        }
    }

    /// One relay topic per feed; scope filtering happens at the receiving merge engine.
    pub fn relay_topic(self) -> &'static str {
        match self {
            Self::Chat => CHAT_RELAY_TOPIC,
            Self::Notifications => NOTIFICATION_TOPIC,
        }
    }

    pub fn push_event_name(self) -> &'static str {
        match self {
            Self::Chat => CHAT_EVENT_NAME,
            Self::Notifications => NOTIFICATION_EVENT_NAME,
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedKind {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "chat" | "messages" => Ok(FeedKind::Chat),
            "notifications" | "notification" => Ok(FeedKind::Notifications),
            other => Err(format!("Unknown feed: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Mensaje,
    Multa,
    Asamblea,
    PagoAtraso,
    Pago,
    Alerta,
    Advertencia,
    Informacion,
    Exito,
    Other(String),
}

impl NotificationKind {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationKind::Mensaje => "mensaje",
            NotificationKind::Multa => "multa",
            NotificationKind::Asamblea => "asamblea",
            NotificationKind::PagoAtraso => "pago-atraso",
            NotificationKind::Pago => "pago",
            NotificationKind::Alerta => "alerta",
            NotificationKind::Advertencia => "advertencia",
            NotificationKind::Informacion => "información",
            NotificationKind::Exito => "éxito",
            NotificationKind::Other(raw) => raw.as_str(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NotificationKind::Mensaje => "message",
            NotificationKind::Multa => "fine",
            NotificationKind::Asamblea => "assembly",
            NotificationKind::PagoAtraso => "late payment",
            NotificationKind::Pago => "payment",
            NotificationKind::Alerta => "alert",
            NotificationKind::Advertencia => "warning",
            NotificationKind::Informacion => "info",
            NotificationKind::Exito => "success",
            NotificationKind::Other(_) => "notification",
        }
    }
}

impl Default for NotificationKind {
    fn default() -> Self {
        Self::Other("notificación".to_string())
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for NotificationKind {
    fn from(input: &str) -> Self {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "mensaje" => NotificationKind::Mensaje,
            "multa" => NotificationKind::Multa,
            "asamblea" => NotificationKind::Asamblea,
            "pago-atraso" | "pago_atraso" => NotificationKind::PagoAtraso,
            "pago" => NotificationKind::Pago,
            "alerta" => NotificationKind::Alerta,
            "advertencia" => NotificationKind::Advertencia,
            "información" | "informacion" => NotificationKind::Informacion,
            "éxito" | "exito" => NotificationKind::Exito,
            _ => NotificationKind::Other(input.trim().to_string()),
        }
    }
}

impl Serialize for NotificationKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NotificationKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(NotificationKind::from(raw.as_str()))
    }
}

/// Server ids arrive as strings or numbers depending on the endpoint.
pub fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
