//! Error taxonomy for the relay layer.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RelayError {
    /// The pool already holds a subscriber under this key.
    #[error("subscriber {key} already attached")]
    DuplicateSubscriberKey { key: Uuid },
    /// Non-blocking enqueue found the subscriber's queue full.
    #[error("subscriber {key} queue is full")]
    QueueFull { key: Uuid },
    /// The subscriber's connection task is gone.
    #[error("subscriber {key} is closed")]
    SubscriberClosed { key: Uuid },
    /// Another relay server already claimed this port, path, or key.
    #[error("relay {what} `{value}` already in use")]
    DuplicateServer { what: &'static str, value: String },
    /// Relay servers must be mounted under a non-empty path.
    #[error("relay mount path cannot be empty")]
    EmptyPath,
    #[error("failed to bind relay listener: {0}")]
    Bind(#[source] std::io::Error),
}
