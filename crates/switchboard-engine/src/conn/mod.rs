//! The connection family: four composable connection kinds that together
//! implement the capability-aware binding state machine.
//!
//! [`DirectConnection`] binds one endpoint. [`EmergencyConnection`] proxies
//! to a preferred target until an emergency (or the target's death) forces
//! it to take control of the guaranteed fallback. [`ModeSwapConnection`]
//! keeps exactly one of two targets current, selected by an external mode
//! signal. [`FanOutConnection`] drives a fixed set of monitoring targets
//! that never fail over into each other.
//!
//! Nothing here is re-entered concurrently: all operations run under the
//! orchestrator's lock, and transport callbacks are routed in as explicit
//! events keyed by endpoint.

mod direct;
mod emergency;
mod fanout;
mod swap;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use switchboard_core::{CallInfo, ServiceEndpoint, Transport};

use crate::dump::UiConnDump;
use crate::grants::EmergencyAccess;

pub use direct::DirectConnection;
pub use emergency::EmergencyConnection;
pub use fanout::FanOutConnection;
pub use swap::ModeSwapConnection;

/// Outcome of asking a connection to connect.
///
/// `NotSupported` is a routing verdict, not a failure: the endpoint was
/// never attempted because its capabilities rule out the triggering call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionResult {
    Succeeded,
    Failed,
    NotSupported,
}

/// Fine-grained state of one binding, derived from the logical-connection
/// intent and the transport-level bound flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    NotConnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// What a bound callback meant to the connection that received it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundOutcome {
    /// The connection was waiting for this; the endpoint is now usable.
    Promote,
    /// A local disconnect raced ahead; the binding was re-unbound.
    Stale,
}

/// What an unbound callback meant to the connection that received it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnboundOutcome {
    /// A live connection was lost (recovery, if any, already ran).
    Dropped,
    /// The endpoint was not connected; nothing to do.
    Ignored,
}

/// Collaborator handles threaded through every connection operation, so
/// connection objects stay plain data owned by one orchestrator.
#[derive(Clone)]
pub struct BindContext {
    pub transport: Arc<dyn Transport>,
    pub grants: Arc<dyn EmergencyAccess>,
}

/// A slot inside a [`ModeSwapConnection`]: either a plain binding or an
/// emergency-override wrapper.
pub enum UiConn {
    Direct(DirectConnection),
    Emergency(EmergencyConnection),
}

impl UiConn {
    pub fn connect(&mut self, ctx: &BindContext, call: Option<&CallInfo>) -> ConnectionResult {
        match self {
            Self::Direct(conn) => conn.connect(ctx, call),
            Self::Emergency(conn) => conn.connect(ctx, call),
        }
    }

    pub fn disconnect(&mut self, ctx: &BindContext) {
        match self {
            Self::Direct(conn) => conn.disconnect(ctx),
            Self::Emergency(conn) => conn.disconnect(ctx),
        }
    }

    pub fn is_connected(&self) -> bool {
        match self {
            Self::Direct(conn) => conn.is_connected(),
            Self::Emergency(conn) => conn.is_connected(),
        }
    }

    pub fn set_emergency(&mut self, ctx: &BindContext, has_emergency: bool) {
        match self {
            // A plain binding has no override behavior.
            Self::Direct(_) => {}
            Self::Emergency(conn) => conn.set_emergency(ctx, has_emergency),
        }
    }

    /// The endpoint this slot would bind (or has bound) right now.
    pub fn effective_endpoint(&self) -> &ServiceEndpoint {
        match self {
            Self::Direct(conn) => conn.endpoint(),
            Self::Emergency(conn) => conn.effective_endpoint(),
        }
    }

    pub fn on_bound(
        &mut self,
        ctx: &BindContext,
        endpoint: &ServiceEndpoint,
    ) -> Option<BoundOutcome> {
        match self {
            Self::Direct(conn) => conn.on_bound_for(ctx, endpoint),
            Self::Emergency(conn) => conn.on_bound(ctx, endpoint),
        }
    }

    pub fn on_unbound(
        &mut self,
        ctx: &BindContext,
        endpoint: &ServiceEndpoint,
    ) -> Option<UnboundOutcome> {
        match self {
            Self::Direct(conn) => conn.on_unbound_for(ctx, endpoint),
            Self::Emergency(conn) => conn.on_unbound(ctx, endpoint),
        }
    }

    pub fn dump(&self) -> UiConnDump {
        match self {
            Self::Direct(conn) => UiConnDump::Direct(conn.dump()),
            Self::Emergency(conn) => UiConnDump::Emergency(conn.dump()),
        }
    }
}
