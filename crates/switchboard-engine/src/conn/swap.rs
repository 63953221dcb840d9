use tracing::{debug, info};

use switchboard_core::{CallInfo, ServiceEndpoint};

use super::{BindContext, BoundOutcome, ConnectionResult, UiConn, UnboundOutcome};
use crate::dump::ModeSwapDump;

/// Holds two display connections and keeps exactly one current, selected
/// by an external mode signal. With no alternate configured the mode
/// signal is recorded but the effective target never changes.
pub struct ModeSwapConnection {
    normal: UiConn,
    alternate: Option<UiConn>,
    alternate_mode: bool,
    connected: bool,
}

impl ModeSwapConnection {
    pub fn new(normal: UiConn, alternate: Option<UiConn>) -> Self {
        Self {
            normal,
            alternate,
            alternate_mode: false,
            connected: false,
        }
    }

    fn current(&self) -> &UiConn {
        match (self.alternate_mode, self.alternate.as_ref()) {
            (true, Some(alt)) => alt,
            _ => &self.normal,
        }
    }

    fn current_mut(&mut self) -> &mut UiConn {
        match (self.alternate_mode, self.alternate.as_mut()) {
            (true, Some(alt)) => alt,
            _ => &mut self.normal,
        }
    }

    /// Applies the mode signal. If it changes the effective target while
    /// connected, the old side is fully disconnected before the new side
    /// is attempted, and connectivity reflects the new side's outcome.
    pub fn set_mode(&mut self, ctx: &BindContext, is_alternate: bool, call: Option<&CallInfo>) {
        info!(was = self.alternate_mode, now = is_alternate, "mode signal");
        if is_alternate == self.alternate_mode {
            return;
        }
        self.alternate_mode = is_alternate;
        if self.alternate.is_none() {
            // Effective target is the normal side either way.
            return;
        }
        if !self.connected {
            // Only changes which side the next connect uses.
            return;
        }

        let result = if is_alternate {
            self.normal.disconnect(ctx);
            self.alternate
                .as_mut()
                .map(|alt| alt.connect(ctx, call))
                .unwrap_or(ConnectionResult::Failed)
        } else {
            if let Some(alt) = self.alternate.as_mut() {
                alt.disconnect(ctx);
            }
            self.normal.connect(ctx, call)
        };
        self.connected = result == ConnectionResult::Succeeded;
    }

    pub fn connect(&mut self, ctx: &BindContext, call: Option<&CallInfo>) -> ConnectionResult {
        if self.connected {
            debug!("already connected");
            return ConnectionResult::Succeeded;
        }
        let result = self.current_mut().connect(ctx, call);
        if result != ConnectionResult::Failed {
            self.connected = result == ConnectionResult::Succeeded;
            return result;
        }
        ConnectionResult::Failed
    }

    pub fn disconnect(&mut self, ctx: &BindContext) {
        if self.connected {
            self.current_mut().disconnect(ctx);
            self.connected = false;
        } else {
            debug!("already disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Emergency state is forwarded to both sides so whichever becomes
    /// current behaves correctly.
    pub fn set_emergency(&mut self, ctx: &BindContext, has_emergency: bool) {
        self.normal.set_emergency(ctx, has_emergency);
        if let Some(alt) = self.alternate.as_mut() {
            alt.set_emergency(ctx, has_emergency);
        }
    }

    pub fn effective_endpoint(&self) -> &ServiceEndpoint {
        self.current().effective_endpoint()
    }

    pub fn on_bound(
        &mut self,
        ctx: &BindContext,
        endpoint: &ServiceEndpoint,
    ) -> Option<BoundOutcome> {
        if let Some(outcome) = self.normal.on_bound(ctx, endpoint) {
            return Some(outcome);
        }
        self.alternate
            .as_mut()
            .and_then(|alt| alt.on_bound(ctx, endpoint))
    }

    pub fn on_unbound(
        &mut self,
        ctx: &BindContext,
        endpoint: &ServiceEndpoint,
    ) -> Option<UnboundOutcome> {
        let outcome = match self.normal.on_unbound(ctx, endpoint) {
            Some(outcome) => outcome,
            None => self
                .alternate
                .as_mut()
                .and_then(|alt| alt.on_unbound(ctx, endpoint))?,
        };
        if outcome == UnboundOutcome::Dropped {
            // Whatever recovery the affected side attempted has settled;
            // adopt its view of connectivity.
            self.connected = self.current().is_connected();
        }
        Some(outcome)
    }

    pub fn dump(&self) -> ModeSwapDump {
        ModeSwapDump {
            connected: self.connected,
            alternate_mode: self.alternate_mode,
            normal: self.normal.dump(),
            alternate: self.alternate.as_ref().map(UiConn::dump),
        }
    }
}
