use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use switchboard_core::ids::{CallId, SessionId};
use switchboard_core::{
    AudioState, CallDisplay, CallInfo, CallSnapshot, CallState, ServiceEndpoint, ServiceIdentity,
    ServiceRole, Transport, TransportEvent,
};

use crate::config::EngineConfig;
use crate::conn::{
    BindContext, BoundOutcome, ConnectionResult, DirectConnection, EmergencyConnection,
    FanOutConnection, ModeSwapConnection, UiConn, UnboundOutcome,
};
use crate::dump::EngineDump;
use crate::grants::EmergencyAccess;
use crate::locator::ServiceLocator;

/// Owns the connection tree and drives it from call-lifecycle events.
///
/// The state machine is over the call set, not a simple flag: with no
/// calls and no connections the orchestrator is idle; the first call
/// builds the tree from fresh endpoint discovery and attempts to connect,
/// and only once the primary display accepts are monitors attached and
/// call state fanned out. All methods assume the caller serializes access
/// (the [`Broker`](crate::service::Broker) wraps this in one mutex).
pub struct Orchestrator {
    config: EngineConfig,
    ctx: BindContext,
    locator: Arc<dyn ServiceLocator>,
    session: Option<SessionId>,
    ui: Option<ModeSwapConnection>,
    monitors: Option<FanOutConnection>,
    displays: HashMap<ServiceEndpoint, Arc<dyn CallDisplay>>,
    calls: HashMap<CallId, CallInfo>,
    announced: HashSet<CallId>,
    audio_state: AudioState,
    can_add_call: bool,
    car_mode: bool,
}

impl Orchestrator {
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        locator: Arc<dyn ServiceLocator>,
        grants: Arc<dyn EmergencyAccess>,
    ) -> Self {
        Self {
            config,
            ctx: BindContext { transport, grants },
            locator,
            session: None,
            ui: None,
            monitors: None,
            displays: HashMap::new(),
            calls: HashMap::new(),
            announced: HashSet::new(),
            audio_state: AudioState::default(),
            can_add_call: true,
            car_mode: false,
        }
    }

    /// Whether the primary display surface is currently usable.
    pub fn is_active(&self) -> bool {
        self.ui
            .as_ref()
            .map(ModeSwapConnection::is_connected)
            .unwrap_or(false)
    }

    pub fn has_calls(&self) -> bool {
        !self.calls.is_empty()
    }

    pub fn on_call_added(&mut self, call: CallInfo) {
        if !self.is_active() {
            info!(call = %call.id, "call added with no usable session, binding");
            self.calls.insert(call.id.clone(), call.clone());
            self.bind_to_services(Some(&call));
            return;
        }

        info!(call = %call.id, "call added to active session");
        self.calls.insert(call.id.clone(), call.clone());
        self.adjust_for_emergency();
        // An emergency arriving mid-session may still need grants even
        // though the session is already established.
        self.ctx.grants.grant_for(Some(&call));

        let primary = self.primary_endpoint();
        let mut delivered = 0;
        for (endpoint, display) in &self.displays {
            if !endpoint.accepts(&call) {
                continue;
            }
            let include_rtt = primary.as_ref() == Some(endpoint);
            let snapshot = CallSnapshot::of(&call, endpoint.supports_external_calls, include_rtt);
            if let Err(err) = display.add_call(&snapshot) {
                debug!(endpoint = %endpoint.identity, error = %err, "add_call dropped");
                continue;
            }
            delivered += 1;
        }
        if delivered > 0 {
            self.announced.insert(call.id.clone());
        }
        info!(call = %call.id, endpoints = delivered, "call announced");
    }

    /// Returns true when the call set just became empty, so the caller can
    /// start the teardown grace timer.
    pub fn on_call_removed(&mut self, id: &CallId) -> bool {
        let Some(call) = self.calls.remove(id) else {
            debug!(call = %id, "remove for untracked call");
            return self.calls.is_empty();
        };
        info!(call = %id, remaining = self.calls.len(), "call removed");

        if self.announced.remove(id) {
            for (endpoint, display) in &self.displays {
                if !endpoint.accepts(&call) {
                    continue;
                }
                if let Err(err) = display.remove_call(id) {
                    debug!(endpoint = %endpoint.identity, error = %err, "remove_call dropped");
                }
            }
        }
        self.calls.is_empty()
    }

    pub fn on_call_state_changed(&mut self, call: CallInfo) {
        self.fan_out_update(&call, None);
        self.calls.insert(call.id.clone(), call);
    }

    /// An external call crossed the boundary in either direction.
    /// Endpoints that cannot follow external calls either meet the call
    /// for the first time, or see it retracted as disconnected.
    pub fn on_call_became_external(&mut self, call: CallInfo, is_external: bool) {
        info!(call = %call.id, is_external, "external transition");
        let mut call = call;
        call.is_external = is_external;

        if is_external {
            for (endpoint, display) in &self.displays {
                if endpoint.supports_external_calls {
                    continue;
                }
                let snapshot =
                    CallSnapshot::of(&call, false, false).with_state(CallState::Disconnected);
                if let Err(err) = display.update_call(&snapshot) {
                    debug!(endpoint = %endpoint.identity, error = %err, "retraction dropped");
                }
            }
        } else {
            let primary = self.primary_endpoint();
            for (endpoint, display) in &self.displays {
                if endpoint.supports_external_calls {
                    // Already following the call; nothing to add.
                    continue;
                }
                if call.is_self_managed && !endpoint.supports_self_managed_calls {
                    continue;
                }
                let include_rtt = primary.as_ref() == Some(endpoint);
                let snapshot =
                    CallSnapshot::of(&call, endpoint.supports_external_calls, include_rtt);
                if let Err(err) = display.add_call(&snapshot) {
                    debug!(endpoint = %endpoint.identity, error = %err, "add_call dropped");
                }
            }
            self.announced.insert(call.id.clone());
        }
        self.calls.insert(call.id.clone(), call);
    }

    pub fn on_emergency_flag_changed(&mut self, has_emergency: bool) {
        let ctx = self.ctx.clone();
        if let Some(ui) = self.ui.as_mut() {
            ui.set_emergency(&ctx, has_emergency);
        }
    }

    pub fn on_mode_changed(&mut self, alternate: bool) {
        self.car_mode = alternate;
        let ctx = self.ctx.clone();
        if let Some(ui) = self.ui.as_mut() {
            ui.set_mode(&ctx, alternate, None);
        }
    }

    pub fn on_audio_state_changed(&mut self, audio: AudioState) {
        self.audio_state = audio;
        if self.displays.is_empty() {
            return;
        }
        info!(route = ?audio.route, muted = audio.muted, "audio state fanned out");
        for display in self.displays.values() {
            if let Err(err) = display.set_audio_state(&audio) {
                debug!(error = %err, "set_audio_state dropped");
            }
        }
    }

    pub fn on_can_add_call_changed(&mut self, can_add: bool) {
        self.can_add_call = can_add;
        for display in self.displays.values() {
            if let Err(err) = display.set_can_add_call(can_add) {
                debug!(error = %err, "set_can_add_call dropped");
            }
        }
    }

    pub fn on_post_dial_wait(&self, call: &CallId, remaining: &str) {
        for display in self.displays.values() {
            if let Err(err) = display.set_post_dial_wait(call, remaining) {
                debug!(error = %err, "post_dial_wait dropped");
            }
        }
    }

    pub fn bring_to_foreground(&self, show_dialpad: bool) {
        if self.displays.is_empty() {
            warn!("asked to bring an unbound display to the foreground");
            return;
        }
        for display in self.displays.values() {
            if let Err(err) = display.bring_to_foreground(show_dialpad) {
                debug!(error = %err, "bring_to_foreground dropped");
            }
        }
    }

    pub fn silence_ringer(&self) {
        for display in self.displays.values() {
            if let Err(err) = display.silence_ringer() {
                debug!(error = %err, "silence_ringer dropped");
            }
        }
    }

    pub fn notify_connection_event(
        &self,
        call: &CallId,
        event: &str,
        payload: Option<&serde_json::Value>,
    ) {
        for display in self.displays.values() {
            if let Err(err) = display.connection_event(call, event, payload) {
                debug!(error = %err, "connection_event dropped");
            }
        }
    }

    /// Secondary-channel notifications go only to the endpoint currently
    /// selected as the primary display.
    pub fn notify_rtt_initiation_failure(&self, call: &CallId, reason: i32) {
        let Some(primary) = self.primary_endpoint() else {
            return;
        };
        if let Some(display) = self.displays.get(&primary) {
            if let Err(err) = display.rtt_initiation_failure(call, reason) {
                debug!(error = %err, "rtt_initiation_failure dropped");
            }
        }
    }

    pub fn notify_remote_rtt_request(&self, call: &CallId, request_id: u32) {
        let Some(primary) = self.primary_endpoint() else {
            return;
        };
        if let Some(display) = self.displays.get(&primary) {
            if let Err(err) = display.remote_rtt_request(call, request_id) {
                debug!(error = %err, "remote_rtt_request dropped");
            }
        }
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Bound { endpoint, display } => {
                self.on_endpoint_bound(endpoint, display);
            }
            TransportEvent::Unbound { endpoint } => self.on_endpoint_unbound(&endpoint),
        }
    }

    /// Idempotent teardown, invoked by the grace timer. Re-checks the call
    /// set so a call that arrived inside the grace period keeps the
    /// session alive.
    pub fn teardown_if_idle(&mut self) {
        if !self.calls.is_empty() {
            debug!("teardown skipped, calls returned within the grace period");
            return;
        }
        if self.ui.is_none() && self.monitors.is_none() {
            return;
        }
        info!("tearing down display connections");
        self.unbind_all();
        self.ctx.grants.revoke();
    }

    /// Whether the display surface the user would currently see declares
    /// ringing support. Queried fresh, never cached.
    pub fn connected_ui_supports_ringing(&self) -> bool {
        let package = match self.primary_endpoint() {
            Some(ep) if self.is_active() => ep.identity.package,
            _ => match self.locator.preferred_ui_package() {
                Some(package) => package,
                None => return false,
            },
        };
        match self.locator.query(ServiceRole::UiPrimary, Some(&package)) {
            Ok(list) => list.first().map(|ep| ep.supports_ringing).unwrap_or(false),
            Err(err) => {
                debug!(error = %err, "ringing capability lookup failed");
                false
            }
        }
    }

    pub fn dump(&self) -> EngineDump {
        EngineDump {
            captured_at: Utc::now(),
            session: self.session.clone(),
            active: self.is_active(),
            car_mode: self.car_mode,
            ui: self.ui.as_ref().map(ModeSwapConnection::dump),
            monitors: self
                .monitors
                .as_ref()
                .map(FanOutConnection::dump)
                .unwrap_or_default(),
            displays: self.displays.keys().map(|ep| ep.identity.clone()).collect(),
            calls: self.calls.keys().cloned().collect(),
            announced: self.announced.iter().cloned().collect(),
        }
    }

    fn bind_to_services(&mut self, call: Option<&CallInfo>) {
        if self.ui.is_none() {
            let fallback = self.discover_system_fallback();
            let preferred = self.discover_preferred_ui(&fallback.identity);
            let mut emergency = EmergencyConnection::new(fallback, preferred);
            if self.has_emergency_call() {
                emergency.set_emergency(&self.ctx, true);
            }
            let alternate = self
                .discover_car_mode_ui()
                .map(|ep| UiConn::Direct(DirectConnection::new(ep)));

            let session = SessionId::new();
            info!(session = %session, "connection tree built");
            self.ui = Some(ModeSwapConnection::new(
                UiConn::Emergency(emergency),
                alternate,
            ));
            self.session = Some(session);
        }

        let ctx = self.ctx.clone();
        let car_mode = self.car_mode;
        let connected = {
            let Some(ui) = self.ui.as_mut() else {
                return;
            };
            ui.set_mode(&ctx, car_mode, None);
            ui.connect(&ctx, call) == ConnectionResult::Succeeded
        };

        if connected {
            self.connect_monitors(call);
        } else {
            info!("primary display did not accept the call, monitors not attempted");
        }
    }

    fn connect_monitors(&mut self, call: Option<&CallInfo>) {
        let endpoints = match self.locator.query(ServiceRole::NonUiMonitor, None) {
            Ok(list) => list,
            Err(err) => {
                warn!(error = %err, "monitor lookup failed");
                Vec::new()
            }
        };
        let members = endpoints
            .into_iter()
            .map(|mut ep| {
                // Monitors never receive self-managed calls, whatever the
                // registry claims.
                ep.supports_self_managed_calls = false;
                DirectConnection::new(ep)
            })
            .collect();

        let mut monitors = FanOutConnection::new(members);
        let ctx = self.ctx.clone();
        monitors.connect(&ctx, call);
        self.monitors = Some(monitors);
    }

    fn discover_system_fallback(&self) -> ServiceEndpoint {
        match self.locator.query(ServiceRole::SystemFallback, None) {
            Ok(mut list) if !list.is_empty() => list.remove(0),
            Ok(_) => {
                error!(
                    identity = %self.config.system_fallback,
                    "system fallback not registered, binding blind"
                );
                ServiceEndpoint::new(
                    self.config.system_fallback.clone(),
                    ServiceRole::SystemFallback,
                )
            }
            Err(err) => {
                error!(
                    error = %err,
                    identity = %self.config.system_fallback,
                    "fallback lookup failed, binding blind"
                );
                ServiceEndpoint::new(
                    self.config.system_fallback.clone(),
                    ServiceRole::SystemFallback,
                )
            }
        }
    }

    fn discover_preferred_ui(&self, fallback: &ServiceIdentity) -> Option<DirectConnection> {
        let package = self.locator.preferred_ui_package()?;
        match self.locator.query(ServiceRole::UiPrimary, Some(&package)) {
            Ok(list) => list
                .into_iter()
                .find(|ep| ep.identity != *fallback)
                .map(DirectConnection::new),
            Err(err) => {
                warn!(error = %err, package, "preferred display lookup failed");
                None
            }
        }
    }

    fn discover_car_mode_ui(&self) -> Option<ServiceEndpoint> {
        match self.locator.query(ServiceRole::CarModeUi, None) {
            Ok(list) => list
                .into_iter()
                .find(|ep| ep.identity != self.config.system_fallback),
            Err(err) => {
                warn!(error = %err, "car mode display lookup failed");
                None
            }
        }
    }

    fn adjust_for_emergency(&mut self) {
        if self.has_emergency_call() {
            let ctx = self.ctx.clone();
            if let Some(ui) = self.ui.as_mut() {
                ui.set_emergency(&ctx, true);
            }
        }
    }

    fn has_emergency_call(&self) -> bool {
        self.calls.values().any(|call| call.is_emergency)
    }

    fn primary_endpoint(&self) -> Option<ServiceEndpoint> {
        self.ui.as_ref().map(|ui| ui.effective_endpoint().clone())
    }

    fn on_endpoint_bound(&mut self, endpoint: ServiceEndpoint, display: Arc<dyn CallDisplay>) {
        let ctx = self.ctx.clone();
        let outcome = match self.ui.as_mut().and_then(|ui| ui.on_bound(&ctx, &endpoint)) {
            Some(outcome) => Some(outcome),
            None => self
                .monitors
                .as_mut()
                .and_then(|monitors| monitors.on_bound(&ctx, &endpoint)),
        };

        match outcome {
            Some(BoundOutcome::Promote) => {
                info!(endpoint = %endpoint.identity, "endpoint connected");
                self.displays.insert(endpoint.clone(), Arc::clone(&display));
                self.push_initial_state(&endpoint, &display);
                if self.calls.is_empty() {
                    // Every call ended while the bind was in flight.
                    self.teardown_if_idle();
                }
            }
            Some(BoundOutcome::Stale) => {
                debug!(endpoint = %endpoint.identity, "stale bound callback discarded");
            }
            None => {
                warn!(endpoint = %endpoint.identity, "bound callback for unknown endpoint, unbinding");
                ctx.transport.unbind(&endpoint);
            }
        }
    }

    fn on_endpoint_unbound(&mut self, endpoint: &ServiceEndpoint) {
        info!(endpoint = %endpoint.identity, "endpoint unbound");
        self.displays.remove(endpoint);

        let ctx = self.ctx.clone();
        let ui_outcome = self
            .ui
            .as_mut()
            .and_then(|ui| ui.on_unbound(&ctx, endpoint));
        if ui_outcome.is_none() {
            if let Some(monitors) = self.monitors.as_mut() {
                monitors.on_unbound(&ctx, endpoint);
            }
            return;
        }

        // The primary surface was affected. If no automatic recovery
        // restored it the session has failed; tear the tree down so a
        // later call event rebuilds from scratch.
        if ui_outcome == Some(UnboundOutcome::Dropped) && !self.is_active() {
            warn!("primary display lost without recovery, tearing down session");
            self.unbind_all();
        }
    }

    /// Sends the world to a freshly connected endpoint: the capability-
    /// filtered call set with children before their parents, then the
    /// ambient audio and dial-permission state.
    fn push_initial_state(&mut self, endpoint: &ServiceEndpoint, display: &Arc<dyn CallDisplay>) {
        let primary = self.primary_endpoint();
        let include_rtt = primary.as_ref() == Some(endpoint);

        let ordered = order_children_first(self.calls.values().collect());
        let mut pushed = Vec::new();
        for call in ordered {
            if !endpoint.accepts(call) {
                continue;
            }
            let snapshot = CallSnapshot::of(call, endpoint.supports_external_calls, include_rtt);
            match display.add_call(&snapshot) {
                Ok(()) => pushed.push(call.id.clone()),
                Err(err) => debug!(call = %call.id, error = %err, "initial add_call dropped"),
            }
        }
        info!(endpoint = %endpoint.identity, calls = pushed.len(), "initial call state pushed");
        self.announced.extend(pushed);

        if let Err(err) = display.set_audio_state(&self.audio_state) {
            debug!(error = %err, "initial audio state dropped");
        }
        if let Err(err) = display.set_can_add_call(self.can_add_call) {
            debug!(error = %err, "initial can-add-call dropped");
        }
    }

    fn fan_out_update(&self, call: &CallInfo, override_state: Option<CallState>) {
        if self.displays.is_empty() {
            return;
        }
        let primary = self.primary_endpoint();
        let mut updated = 0;
        for (endpoint, display) in &self.displays {
            if !endpoint.accepts(call) {
                continue;
            }
            let include_rtt = primary.as_ref() == Some(endpoint);
            let mut snapshot = CallSnapshot::of(call, endpoint.supports_external_calls, include_rtt);
            if let Some(state) = override_state {
                snapshot = snapshot.with_state(state);
            }
            if let Err(err) = display.update_call(&snapshot) {
                debug!(endpoint = %endpoint.identity, error = %err, "update_call dropped");
            }
            updated += 1;
        }
        debug!(call = %call.id, endpoints = updated, "call update fanned out");
    }

    fn unbind_all(&mut self) {
        let ctx = self.ctx.clone();
        if let Some(mut ui) = self.ui.take() {
            ui.disconnect(&ctx);
        }
        if let Some(mut monitors) = self.monitors.take() {
            monitors.disconnect(&ctx);
        }
        self.displays.clear();
        self.announced.clear();
        self.session = None;
    }
}

/// Childless calls first, then conference parents, so children exist
/// before a parent references them.
fn order_children_first(calls: Vec<&CallInfo>) -> Vec<&CallInfo> {
    let (parents, children): (Vec<_>, Vec<_>) =
        calls.into_iter().partition(|call| call.has_children());
    children.into_iter().chain(parents).collect()
}
