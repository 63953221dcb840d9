use tracing::{debug, info};

use switchboard_core::{CallInfo, ServiceEndpoint};

use super::{BindContext, BoundOutcome, ConnectionResult, DirectConnection, UnboundOutcome};
use crate::dump::EmergencyDump;

/// Proxies to a preferred display until an emergency call appears or the
/// preferred target misbehaves, then takes control of the guaranteed
/// system fallback.
///
/// Takeover is one-directional: once `proxying` flips to false it stays
/// false for the life of this object. A new session re-evaluates from
/// scratch. Emergency calls must never be left without a reachable
/// display surface, so a misbehaving or absent preferred target silently
/// migrates control here.
pub struct EmergencyConnection {
    fallback: DirectConnection,
    preferred: Option<DirectConnection>,
    proxying: bool,
    connected: bool,
}

impl EmergencyConnection {
    pub fn new(fallback: ServiceEndpoint, preferred: Option<DirectConnection>) -> Self {
        let proxying = preferred.is_some();
        Self {
            fallback: DirectConnection::new(fallback),
            preferred,
            proxying,
            connected: false,
        }
    }

    pub fn is_proxying(&self) -> bool {
        self.proxying
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// The endpoint currently responsible for the display surface.
    pub fn effective_endpoint(&self) -> &ServiceEndpoint {
        if self.proxying {
            if let Some(sub) = self.preferred.as_ref() {
                return sub.endpoint();
            }
        }
        self.fallback.endpoint()
    }

    pub fn connect(&mut self, ctx: &BindContext, call: Option<&CallInfo>) -> ConnectionResult {
        self.connected = true;
        if self.proxying {
            if let Some(sub) = self.preferred.as_mut() {
                let result = sub.connect(ctx, call);
                self.connected = result == ConnectionResult::Succeeded;
                if result != ConnectionResult::Failed {
                    return result;
                }
            }
            // The preferred target refused to bind. Stop proxying for the
            // rest of this session and bind the fallback ourselves.
            info!("preferred display failed to bind, taking over");
            self.proxying = false;
        }

        ctx.grants.grant_for(call);

        let result = self.fallback.connect(ctx, call);
        self.connected = result == ConnectionResult::Succeeded;
        result
    }

    pub fn disconnect(&mut self, ctx: &BindContext) {
        info!(proxying = self.proxying, "emergency connection disconnect");
        if self.proxying {
            if let Some(sub) = self.preferred.as_mut() {
                sub.disconnect(ctx);
            }
        } else {
            self.fallback.disconnect(ctx);
            ctx.grants.revoke();
        }
        self.connected = false;
    }

    /// An emergency call forces control away from the preferred target.
    /// Clearing the flag never hands control back.
    pub fn set_emergency(&mut self, ctx: &BindContext, has_emergency: bool) {
        if has_emergency {
            self.take_control(ctx);
        }
    }

    fn take_control(&mut self, ctx: &BindContext) {
        if !self.proxying {
            return;
        }
        info!("taking control from preferred display");
        self.proxying = false;
        if self.connected {
            if let Some(sub) = self.preferred.as_mut() {
                sub.disconnect(ctx);
            }
            self.fallback.connect(ctx, None);
        }
    }

    pub fn on_bound(
        &mut self,
        ctx: &BindContext,
        endpoint: &ServiceEndpoint,
    ) -> Option<BoundOutcome> {
        if let Some(sub) = self.preferred.as_mut() {
            if let Some(outcome) = sub.on_bound_for(ctx, endpoint) {
                return Some(outcome);
            }
        }
        self.fallback.on_bound_for(ctx, endpoint)
    }

    pub fn on_unbound(
        &mut self,
        ctx: &BindContext,
        endpoint: &ServiceEndpoint,
    ) -> Option<UnboundOutcome> {
        if let Some(sub) = self.preferred.as_mut() {
            if let Some(outcome) = sub.on_unbound_for(ctx, endpoint) {
                if outcome == UnboundOutcome::Dropped && self.connected && self.proxying {
                    // The preferred target died underneath us while we were
                    // relying on it. Stop proxying and bind the fallback.
                    info!("preferred display died, failing over");
                    self.proxying = false;
                    self.connect(ctx, None);
                }
                return Some(outcome);
            }
        }

        if let Some(outcome) = self.fallback.on_unbound_for(ctx, endpoint) {
            if outcome == UnboundOutcome::Dropped && self.connected && !self.proxying {
                // We are in control and expected to stay connected.
                debug!("fallback display died while in control, reconnecting");
                self.connect(ctx, None);
            }
            return Some(outcome);
        }
        None
    }

    pub fn dump(&self) -> EmergencyDump {
        EmergencyDump {
            proxying: self.proxying,
            connected: self.connected,
            fallback: self.fallback.dump(),
            preferred: self.preferred.as_ref().map(DirectConnection::dump),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{call, ctx_for, endpoint, MockTransport, RecordingGrants};
    use std::sync::Arc;
    use switchboard_core::ServiceRole;

    const PREFERRED: &str = "com.acme.dialer";
    const FALLBACK: &str = "switchboard.system";

    fn emergency(with_preferred: bool) -> EmergencyConnection {
        let preferred = with_preferred
            .then(|| DirectConnection::new(endpoint(PREFERRED, ServiceRole::UiPrimary)));
        EmergencyConnection::new(endpoint(FALLBACK, ServiceRole::SystemFallback), preferred)
    }

    #[test]
    fn starts_proxying_only_with_a_preferred_target() {
        assert!(emergency(true).is_proxying());
        assert!(!emergency(false).is_proxying());
    }

    #[test]
    fn proxies_successful_connects() {
        let transport = Arc::new(MockTransport::new());
        let grants = Arc::new(RecordingGrants::new());
        let ctx = ctx_for(&transport, &grants);
        let mut conn = emergency(true);

        assert_eq!(conn.connect(&ctx, None), ConnectionResult::Succeeded);
        assert!(conn.is_connected());
        assert!(conn.is_proxying());
        assert_eq!(transport.bind_count(PREFERRED), 1);
        assert_eq!(transport.bind_count(FALLBACK), 0);
        assert_eq!(grants.granted(), 0);
    }

    #[test]
    fn not_supported_passes_through_without_failover() {
        let transport = Arc::new(MockTransport::new());
        let grants = Arc::new(RecordingGrants::new());
        let ctx = ctx_for(&transport, &grants);
        let mut conn = emergency(true);
        let call = call("call_a").self_managed(true);

        assert_eq!(
            conn.connect(&ctx, Some(&call)),
            ConnectionResult::NotSupported
        );
        assert!(conn.is_proxying());
        assert!(!conn.is_connected());
        assert_eq!(transport.bind_count(FALLBACK), 0);
    }

    #[test]
    fn failed_preferred_falls_through_to_fallback() {
        let transport = Arc::new(MockTransport::new());
        transport.refuse(PREFERRED);
        let grants = Arc::new(RecordingGrants::new());
        let ctx = ctx_for(&transport, &grants);
        let mut conn = emergency(true);

        let result = conn.connect(&ctx, None);
        assert_eq!(result, ConnectionResult::Succeeded);
        assert!(!conn.is_proxying());
        assert!(conn.is_connected());
        assert_eq!(transport.bind_count(FALLBACK), 1);
        assert_eq!(grants.granted(), 1);
    }

    #[test]
    fn connect_result_matches_fallback_outcome() {
        let transport = Arc::new(MockTransport::new());
        transport.refuse(PREFERRED);
        transport.refuse(FALLBACK);
        let ctx = ctx_for(&transport, &Arc::new(RecordingGrants::new()));
        let mut conn = emergency(true);

        assert_eq!(conn.connect(&ctx, None), ConnectionResult::Failed);
        assert!(!conn.is_connected());
    }

    #[test]
    fn no_preferred_target_binds_fallback_directly() {
        let transport = Arc::new(MockTransport::new());
        let grants = Arc::new(RecordingGrants::new());
        let ctx = ctx_for(&transport, &grants);
        let mut conn = emergency(false);

        assert_eq!(conn.connect(&ctx, None), ConnectionResult::Succeeded);
        assert_eq!(transport.bind_count(FALLBACK), 1);
        assert_eq!(grants.granted(), 1);
    }

    #[test]
    fn emergency_takeover_swaps_bindings() {
        let transport = Arc::new(MockTransport::new());
        let ctx = ctx_for(&transport, &Arc::new(RecordingGrants::new()));
        let mut conn = emergency(true);

        conn.connect(&ctx, None);
        conn.set_emergency(&ctx, true);

        assert!(!conn.is_proxying());
        assert_eq!(transport.unbind_count(PREFERRED), 1);
        assert_eq!(transport.bind_count(FALLBACK), 1);
        assert_eq!(conn.effective_endpoint().identity.package, FALLBACK);
    }

    #[test]
    fn takeover_is_idempotent_and_one_directional() {
        let transport = Arc::new(MockTransport::new());
        let ctx = ctx_for(&transport, &Arc::new(RecordingGrants::new()));
        let mut conn = emergency(true);

        conn.connect(&ctx, None);
        conn.set_emergency(&ctx, true);
        let ops_after_first = transport.ops().len();

        conn.set_emergency(&ctx, true);
        assert_eq!(transport.ops().len(), ops_after_first);

        // Clearing the flag does not hand control back.
        conn.set_emergency(&ctx, false);
        assert!(!conn.is_proxying());
    }

    #[test]
    fn takeover_while_disconnected_only_flips_proxying() {
        let transport = Arc::new(MockTransport::new());
        let ctx = ctx_for(&transport, &Arc::new(RecordingGrants::new()));
        let mut conn = emergency(true);

        conn.set_emergency(&ctx, true);
        assert!(!conn.is_proxying());
        assert!(transport.ops().is_empty());
    }

    #[test]
    fn preferred_death_fails_over_to_fallback() {
        let transport = Arc::new(MockTransport::new());
        let grants = Arc::new(RecordingGrants::new());
        let ctx = ctx_for(&transport, &grants);
        let mut conn = emergency(true);

        conn.connect(&ctx, None);
        let preferred_ep = endpoint(PREFERRED, ServiceRole::UiPrimary);
        conn.on_bound(&ctx, &preferred_ep);

        let outcome = conn.on_unbound(&ctx, &preferred_ep);
        assert_eq!(outcome, Some(UnboundOutcome::Dropped));
        assert!(!conn.is_proxying());
        assert!(conn.is_connected());
        assert_eq!(transport.bind_count(FALLBACK), 1);
        assert_eq!(grants.granted(), 1);
    }

    #[test]
    fn fallback_death_while_in_control_reconnects() {
        let transport = Arc::new(MockTransport::new());
        let ctx = ctx_for(&transport, &Arc::new(RecordingGrants::new()));
        let mut conn = emergency(false);

        conn.connect(&ctx, None);
        let fallback_ep = endpoint(FALLBACK, ServiceRole::SystemFallback);
        conn.on_bound(&ctx, &fallback_ep);

        conn.on_unbound(&ctx, &fallback_ep);
        assert!(conn.is_connected());
        assert_eq!(transport.bind_count(FALLBACK), 2);
    }

    #[test]
    fn disconnect_in_control_revokes_grants() {
        let transport = Arc::new(MockTransport::new());
        let grants = Arc::new(RecordingGrants::new());
        let ctx = ctx_for(&transport, &grants);
        let mut conn = emergency(false);

        conn.connect(&ctx, None);
        conn.disconnect(&ctx);
        assert!(!conn.is_connected());
        assert_eq!(grants.revoked(), 1);

        // A dead connection stays dead: no reconnect on a late unbound.
        let fallback_ep = endpoint(FALLBACK, ServiceRole::SystemFallback);
        conn.on_unbound(&ctx, &fallback_ep);
        assert_eq!(transport.bind_count(FALLBACK), 1);
    }

    #[test]
    fn disconnect_while_proxying_leaves_grants_alone() {
        let transport = Arc::new(MockTransport::new());
        let grants = Arc::new(RecordingGrants::new());
        let ctx = ctx_for(&transport, &grants);
        let mut conn = emergency(true);

        conn.connect(&ctx, None);
        conn.disconnect(&ctx);
        assert_eq!(grants.revoked(), 0);
        assert_eq!(transport.unbind_count(PREFERRED), 1);
    }
}
