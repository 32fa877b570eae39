//! Errors produced while delivering a value to a subscriber. None of them
//! ever reaches the caller of `set`, they are handed to a `FailureSink`.

use thiserror::Error;

use crate::subscriber::SubscriberId;

/// What a fallible subscriber callback may return
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The cell held a value the presence policy does not admit
    #[error("subscriber {subscriber}: nothing to deliver, cell holds {value}")]
    AbsentValue {
        subscriber: SubscriberId,
        /// Debug rendering of the rejected value
        value: String,
    },

    /// The callback returned an error
    #[error("subscriber {subscriber}: callback failed: {source}")]
    Callback {
        subscriber: SubscriberId,
        #[source]
        source: CallbackError,
    },

    /// The callback panicked
    #[error("subscriber {subscriber}: callback panicked: {message}")]
    Panicked {
        subscriber: SubscriberId,
        message: String,
    },
}

impl DeliveryError {
    /// Subscriber the failed delivery was addressed to
    pub fn subscriber(&self) -> SubscriberId {
        match self {
            DeliveryError::AbsentValue { subscriber, .. }
            | DeliveryError::Callback { subscriber, .. }
            | DeliveryError::Panicked { subscriber, .. } => *subscriber,
        }
    }
}
