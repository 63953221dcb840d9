use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::call::CallInfo;
use crate::display::CallDisplay;
use crate::endpoint::ServiceEndpoint;
use crate::errors::TransportError;
use crate::ids::CallId;

/// Launch context passed along with a bind request. Populated only for
/// outgoing, non-external calls so the service can render the in-progress
/// dial immediately.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BindHint {
    pub outgoing_call: Option<CallId>,
}

impl BindHint {
    pub fn for_call(call: Option<&CallInfo>) -> Self {
        let outgoing_call = call
            .filter(|c| !c.is_incoming && !c.is_external)
            .map(|c| c.id.clone());
        Self { outgoing_call }
    }
}

/// Establishes and tears down bindings against display services.
///
/// `bind` is fire-and-forget: `Ok(())` means the attempt was launched, and
/// the outcome arrives later as a [`TransportEvent`]. Only failures the
/// transport can detect synchronously are returned as errors. `unbind`
/// must tolerate being called for endpoints that are not currently bound.
pub trait Transport: Send + Sync {
    fn bind(&self, endpoint: &ServiceEndpoint, hint: BindHint) -> Result<(), TransportError>;
    fn unbind(&self, endpoint: &ServiceEndpoint);
}

/// Asynchronous transport callbacks, delivered through a single channel so
/// the broker processes them in arrival order under its own lock.
pub enum TransportEvent {
    /// The endpoint is bound and its outbound surface is usable.
    Bound {
        endpoint: ServiceEndpoint,
        display: Arc<dyn CallDisplay>,
    },
    /// The endpoint's binding died (or a requested unbind completed).
    Unbound { endpoint: ServiceEndpoint },
}

impl fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bound { endpoint, .. } => f
                .debug_struct("Bound")
                .field("endpoint", &endpoint.identity)
                .finish_non_exhaustive(),
            Self::Unbound { endpoint } => f
                .debug_struct("Unbound")
                .field("endpoint", &endpoint.identity)
                .finish(),
        }
    }
}

pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Creates the callback channel a transport reports into. Unbounded so a
/// transport thread can never block on a slow broker.
pub fn transport_event_channel() -> (TransportEventSender, TransportEventReceiver) {
    mpsc::unbounded_channel()
}
