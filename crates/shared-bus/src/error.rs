//! Bus error taxonomy.
//!
//! Two families with very different blast radii:
//!
//! - [`BusError`] is the publisher-facing family. `Unavailable` is the only
//!   variant a healthy deployment ever sees at runtime; the others are
//!   topology mistakes caught during bootstrap.
//! - [`HandlerError`] is what a consumer's handler returns to decline a
//!   delivery. It drives a nack and nothing else: the consumer loop never
//!   stops because of it.

use std::error::Error as StdError;
use thiserror::Error;

use crate::topic::TopicPatternError;

/// Errors surfaced by broker and connection operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// The broker cannot be reached right now. Callers retry with backoff;
    /// nothing is queued on their behalf.
    #[error("bus unavailable: {reason}")]
    Unavailable { reason: String },

    /// Publishing to a topic nobody declared.
    #[error("topic `{0}` has not been declared")]
    UnknownTopic(String),

    /// Re-declaring a topic with a different durability flag.
    #[error("topic `{name}` is already declared with durable={existing}")]
    TopicRedeclared { name: String, existing: bool },

    /// Re-binding an existing queue to a different pattern.
    #[error("queue `{name}` is already bound to `{existing}`")]
    QueueRebound { name: String, existing: String },

    /// A malformed topic name or binding pattern.
    #[error(transparent)]
    Pattern(#[from] TopicPatternError),
}

impl BusError {
    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// A consumer's reason for declining one delivery.
///
/// Carries a human-readable reason plus an optional source for logs. The
/// broker reacts identically to every value: negative acknowledgement,
/// then redelivery per policy.
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct HandlerError {
    reason: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl HandlerError {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(
        reason: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<shared_types::EventDecodeError> for HandlerError {
    fn from(source: shared_types::EventDecodeError) -> Self {
        Self::with_source("event decode failed", source)
    }
}
