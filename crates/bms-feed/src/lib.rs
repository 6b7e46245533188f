//! Synchronization engine for the chat and notification feeds.
//!
//! One runtime task per feed owns a [`ScopeController`]; push, poll, relay and
//! write-completion tasks only ever talk to it through its inbox.

pub mod backend;
pub mod config;
pub mod controller;
pub mod merge;
pub mod optimistic;
pub mod poll;
pub mod push;
pub mod relay;
pub mod runtime;
pub mod store;
pub mod transport;

pub use backend::{BackendError, FeedBackend, HttpFeedBackend};
pub use config::{parse_bool_flag, ConfigError, FeedConfig, RetryPolicy, DEFAULT_DEPARTMENTS};
pub use controller::{
    Alert, FeedCollaborators, FeedEntry, FeedInput, FeedView, LoadState, ScopeController,
};
pub use merge::{MergeEngine, MergeOutcome, SnapshotOutcome};
pub use optimistic::{OptimisticEchoTracker, SubmitError};
pub use relay::{
    BroadcastPort, BroadcastPrimitive, CrossTabRelay, LocalBroadcastBus, RelayFrame,
    RelayUnavailable, UnavailableBroadcast, UnixDatagramBus,
};
pub use runtime::{spawn_feed, FeedClosed, FeedCommand, FeedHandle};
pub use store::EventStore;
pub use transport::{
    PushChannel, PushSignal, PushTransport, TransportError, UnixPushConfig, UnixPushTransport,
};
