//! Alert Delivery Port (Driven Port)
//!
//! Best-effort push of one alert over one live connection. There is no
//! acknowledgement, retry or queue: a failed push is reported and dropped.

use async_trait::async_trait;

use crate::domain::alerts::AlertPayload;

/// Push failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryFailure {
    /// Connection is already closed.
    #[error("connection {connection} is closed")]
    Disconnected {
        /// Connection description.
        connection: String,
    },

    /// Connection cannot take another message right now.
    #[error("connection {connection} is not writable")]
    NotWritable {
        /// Connection description.
        connection: String,
    },

    /// Payload could not be encoded.
    #[error("alert encoding failed: {message}")]
    Encoding {
        /// Error details.
        message: String,
    },
}

/// Port for pushing alerts to live connections.
#[async_trait]
pub trait AlertDeliveryPort: Send + Sync {
    /// Handle identifying a live connection in the registry.
    type Handle: Clone + PartialEq + Send + Sync + 'static;

    /// Push `payload` to the connection behind `handle`.
    async fn deliver(
        &self,
        handle: &Self::Handle,
        payload: &AlertPayload,
    ) -> Result<(), DeliveryFailure>;
}
