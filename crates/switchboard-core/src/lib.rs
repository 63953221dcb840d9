pub mod call;
pub mod display;
pub mod endpoint;
pub mod errors;
pub mod ids;
pub mod transport;

pub use call::{AudioRoute, AudioState, CallInfo, CallSnapshot, CallState};
pub use display::CallDisplay;
pub use endpoint::{ServiceEndpoint, ServiceIdentity, ServiceRole};
pub use errors::{DeliveryError, TransportError};
pub use transport::{
    transport_event_channel, BindHint, Transport, TransportEvent, TransportEventReceiver,
    TransportEventSender,
};
