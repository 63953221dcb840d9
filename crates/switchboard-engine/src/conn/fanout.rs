use tracing::debug;

use switchboard_core::{CallInfo, ServiceEndpoint};

use super::{BindContext, BoundOutcome, ConnectionResult, DirectConnection, UnboundOutcome};
use crate::dump::DirectDump;

/// A fixed collection of independent monitoring bindings, connected and
/// disconnected together. Members never fail over into each other, and a
/// refusing member never blocks the others: the aggregate connect always
/// succeeds. Membership is fixed for one bind cycle; changing it means
/// tearing the collection down and rebuilding it.
pub struct FanOutConnection {
    members: Vec<DirectConnection>,
}

impl FanOutConnection {
    pub fn new(members: Vec<DirectConnection>) -> Self {
        Self { members }
    }

    pub fn connect(&mut self, ctx: &BindContext, call: Option<&CallInfo>) -> ConnectionResult {
        for member in &mut self.members {
            // Individual outcomes are independent and deliberately ignored.
            let result = member.connect(ctx, call);
            debug!(endpoint = %member.endpoint().identity, ?result, "monitor connect");
        }
        ConnectionResult::Succeeded
    }

    pub fn disconnect(&mut self, ctx: &BindContext) {
        for member in &mut self.members {
            if member.is_connected() {
                member.disconnect(ctx);
            }
        }
    }

    /// Coarse diagnostic only; never gates the primary path.
    pub fn is_connected(&self) -> bool {
        self.members.iter().any(DirectConnection::is_connected)
    }

    pub fn on_bound(
        &mut self,
        ctx: &BindContext,
        endpoint: &ServiceEndpoint,
    ) -> Option<BoundOutcome> {
        self.members
            .iter_mut()
            .find_map(|member| member.on_bound_for(ctx, endpoint))
    }

    pub fn on_unbound(
        &mut self,
        ctx: &BindContext,
        endpoint: &ServiceEndpoint,
    ) -> Option<UnboundOutcome> {
        self.members
            .iter_mut()
            .find_map(|member| member.on_unbound_for(ctx, endpoint))
    }

    pub fn dump(&self) -> Vec<DirectDump> {
        self.members.iter().map(DirectConnection::dump).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{call, ctx_for, endpoint, MockTransport, NullGrants};
    use std::sync::Arc;
    use switchboard_core::ServiceRole;

    fn fanout(names: &[&str]) -> FanOutConnection {
        FanOutConnection::new(
            names
                .iter()
                .map(|name| DirectConnection::new(endpoint(name, ServiceRole::NonUiMonitor)))
                .collect(),
        )
    }

    #[test]
    fn empty_collection_connects_successfully() {
        let transport = Arc::new(MockTransport::new());
        let ctx = ctx_for(&transport, &Arc::new(NullGrants));
        let mut conn = fanout(&[]);

        assert_eq!(conn.connect(&ctx, None), ConnectionResult::Succeeded);
        assert!(!conn.is_connected());
    }

    #[test]
    fn member_failures_do_not_affect_the_aggregate() {
        let transport = Arc::new(MockTransport::new());
        transport.refuse("com.mon.one");
        let ctx = ctx_for(&transport, &Arc::new(NullGrants));
        let mut conn = fanout(&["com.mon.one", "com.mon.two"]);

        assert_eq!(conn.connect(&ctx, None), ConnectionResult::Succeeded);
        // The refusal did not short-circuit the second member.
        assert_eq!(transport.bind_count("com.mon.two"), 1);
        assert!(conn.is_connected());
    }

    #[test]
    fn all_members_attempted_in_order() {
        let transport = Arc::new(MockTransport::new());
        let ctx = ctx_for(&transport, &Arc::new(NullGrants));
        let mut conn = fanout(&["com.mon.one", "com.mon.two", "com.mon.three"]);

        conn.connect(&ctx, None);
        let binds: Vec<_> = transport
            .ops()
            .into_iter()
            .map(|op| format!("{op:?}"))
            .collect();
        assert_eq!(binds.len(), 3);
        assert!(binds[0].contains("com.mon.one"));
        assert!(binds[2].contains("com.mon.three"));
    }

    #[test]
    fn disconnect_skips_unconnected_members() {
        let transport = Arc::new(MockTransport::new());
        transport.refuse("com.mon.one");
        let ctx = ctx_for(&transport, &Arc::new(NullGrants));
        let mut conn = fanout(&["com.mon.one", "com.mon.two"]);

        conn.connect(&ctx, None);
        conn.disconnect(&ctx);

        assert_eq!(transport.unbind_count("com.mon.one"), 0);
        assert_eq!(transport.unbind_count("com.mon.two"), 1);
        assert!(!conn.is_connected());
    }

    #[test]
    fn capability_mismatch_skips_only_that_member() {
        let transport = Arc::new(MockTransport::new());
        let ctx = ctx_for(&transport, &Arc::new(NullGrants));
        let mut members = fanout(&["com.mon.one"]);
        members.members.push(DirectConnection::new(
            endpoint("com.mon.caps", ServiceRole::NonUiMonitor).with_self_managed_calls(true),
        ));
        let self_managed = call("call_a").self_managed(true);

        assert_eq!(
            members.connect(&ctx, Some(&self_managed)),
            ConnectionResult::Succeeded
        );
        assert_eq!(transport.bind_count("com.mon.one"), 0);
        assert_eq!(transport.bind_count("com.mon.caps"), 1);
    }

    #[test]
    fn event_routing_finds_the_member() {
        let transport = Arc::new(MockTransport::new());
        let ctx = ctx_for(&transport, &Arc::new(NullGrants));
        let mut conn = fanout(&["com.mon.one", "com.mon.two"]);

        conn.connect(&ctx, None);
        let two = endpoint("com.mon.two", ServiceRole::NonUiMonitor);
        assert_eq!(conn.on_bound(&ctx, &two), Some(BoundOutcome::Promote));

        let unknown = endpoint("com.mon.unknown", ServiceRole::NonUiMonitor);
        assert_eq!(conn.on_bound(&ctx, &unknown), None);
        assert_eq!(
            conn.on_unbound(&ctx, &two),
            Some(UnboundOutcome::Dropped)
        );
    }
}
