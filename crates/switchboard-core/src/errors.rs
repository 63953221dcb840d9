use crate::endpoint::ServiceIdentity;

/// Synchronous failure while asking the transport to establish or tear
/// down a binding. Asynchronous failures arrive as transport events, not
/// as errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("service not found: {0}")]
    ServiceNotFound(ServiceIdentity),

    #[error("binding refused by {0}")]
    Refused(ServiceIdentity),

    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Failure to deliver a notification to an already-connected endpoint.
/// Callers swallow and log these; a dead channel is cleaned up by the
/// eventual unbound callback, never by a delivery failure.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("endpoint channel closed")]
    Closed,

    #[error("send failed: {0}")]
    Send(String),
}
