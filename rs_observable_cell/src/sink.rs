use log::warn;

use crate::error::DeliveryError;

/// Non-fatal side channel for failed deliveries
pub trait FailureSink: Send + Sync {
    fn report(&self, error: &DeliveryError);
}

/// Default sink, forwards every failure to the `log` facade as a warning
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl FailureSink for LogSink {
    fn report(&self, error: &DeliveryError) {
        warn!("delivery failed: {}", error);
    }
}

impl<F> FailureSink for F
where
    F: Fn(&DeliveryError) + Send + Sync,
{
    fn report(&self, error: &DeliveryError) {
        self(error)
    }
}
