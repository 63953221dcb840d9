use tracing::{debug, info, warn};

use switchboard_core::{BindHint, CallInfo, ServiceEndpoint};

use super::{BindContext, BoundOutcome, ConnectionResult, ConnectionState, UnboundOutcome};
use crate::dump::DirectDump;

/// A binding to exactly one endpoint.
///
/// Two flags make up the state machine: `connected` is the logical intent
/// (a bind was launched and has not been disconnected), `bound` is what
/// the transport last reported. The four [`ConnectionState`]s fall out of
/// the combination.
pub struct DirectConnection {
    endpoint: ServiceEndpoint,
    connected: bool,
    bound: bool,
}

impl DirectConnection {
    pub fn new(endpoint: ServiceEndpoint) -> Self {
        Self {
            endpoint,
            connected: false,
            bound: false,
        }
    }

    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn state(&self) -> ConnectionState {
        match (self.connected, self.bound) {
            (false, false) => ConnectionState::NotConnected,
            (true, false) => ConnectionState::Connecting,
            (true, true) => ConnectionState::Connected,
            // Locally disconnected, waiting for the transport to confirm.
            (false, true) => ConnectionState::Disconnecting,
        }
    }

    pub fn connect(&mut self, ctx: &BindContext, call: Option<&CallInfo>) -> ConnectionResult {
        if self.connected {
            debug!(endpoint = %self.endpoint.identity, "already connected, ignoring request");
            return ConnectionResult::Succeeded;
        }

        if let Some(call) = call {
            if call.is_self_managed && !self.endpoint.supports_self_managed_calls {
                info!(
                    endpoint = %self.endpoint.identity,
                    call = %call.id,
                    "skipping bind, endpoint does not support self-managed calls"
                );
                self.connected = false;
                return ConnectionResult::NotSupported;
            }
        }

        info!(endpoint = %self.endpoint.identity, "binding");
        self.connected = true;
        if let Err(err) = ctx.transport.bind(&self.endpoint, BindHint::for_call(call)) {
            warn!(endpoint = %self.endpoint.identity, error = %err, "bind failed");
            self.connected = false;
        }

        if self.connected {
            ConnectionResult::Succeeded
        } else {
            ConnectionResult::Failed
        }
    }

    /// Unconditional: local disconnect is the source of truth, even if the
    /// transport reports a later callback for this binding.
    pub fn disconnect(&mut self, ctx: &BindContext) {
        if self.connected {
            ctx.transport.unbind(&self.endpoint);
            self.connected = false;
        } else {
            debug!(endpoint = %self.endpoint.identity, "already disconnected, ignoring request");
        }
    }

    /// The transport finished binding this endpoint.
    pub fn on_bound(&mut self, ctx: &BindContext) -> BoundOutcome {
        debug!(
            endpoint = %self.endpoint.identity,
            connected = self.connected,
            "bound callback"
        );
        if self.connected {
            self.bound = true;
            BoundOutcome::Promote
        } else {
            // A local disconnect raced ahead of this callback. Unbind again
            // rather than trusting the transport to have cancelled the
            // attempt.
            ctx.transport.unbind(&self.endpoint);
            self.bound = false;
            BoundOutcome::Stale
        }
    }

    /// The transport reports the binding gone.
    pub fn on_unbound(&mut self, ctx: &BindContext) -> UnboundOutcome {
        self.bound = false;
        if self.connected {
            info!(endpoint = %self.endpoint.identity, "unexpected disconnect");
            // Drop our half of the binding explicitly as well.
            self.disconnect(ctx);
            UnboundOutcome::Dropped
        } else {
            UnboundOutcome::Ignored
        }
    }

    /// Endpoint-keyed routing wrapper used by composite connections.
    pub fn on_bound_for(
        &mut self,
        ctx: &BindContext,
        endpoint: &ServiceEndpoint,
    ) -> Option<BoundOutcome> {
        (self.endpoint == *endpoint).then(|| self.on_bound(ctx))
    }

    pub fn on_unbound_for(
        &mut self,
        ctx: &BindContext,
        endpoint: &ServiceEndpoint,
    ) -> Option<UnboundOutcome> {
        (self.endpoint == *endpoint).then(|| self.on_unbound(ctx))
    }

    pub fn dump(&self) -> DirectDump {
        DirectDump {
            identity: self.endpoint.identity.clone(),
            role: self.endpoint.role,
            state: self.state(),
        }
    }
}
