use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use switchboard_core::ids::CallId;
use switchboard_core::{
    transport_event_channel, AudioRoute, AudioState, BindHint, CallDisplay, CallInfo,
    CallSnapshot, CallState, DeliveryError, ServiceEndpoint, ServiceIdentity, ServiceRole,
    Transport, TransportError, TransportEvent, TransportEventSender,
};
use switchboard_engine::{Broker, EmergencyAccess, EngineConfig, LocatorError, ServiceLocator};

/// Scripted demo session against an in-process loopback transport.
#[derive(Parser, Debug)]
#[command(name = "switchboard")]
struct Args {
    /// Start with the car-mode display active.
    #[arg(long)]
    car_mode: bool,

    /// Escalate to an emergency call mid-session.
    #[arg(long)]
    emergency: bool,

    /// Number of demo calls to place.
    #[arg(long, default_value_t = 2)]
    calls: u8,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    tracing::info!(?args, "starting switchboard demo");

    let (event_tx, event_rx) = transport_event_channel();
    let transport = Arc::new(LoopbackTransport { events: event_tx });
    let locator = Arc::new(DemoLocator);
    let grants = Arc::new(LoggingGrants);

    let config = EngineConfig {
        teardown_delay: Duration::from_millis(500),
        ..EngineConfig::default()
    };
    let broker = Broker::new(config, transport, locator, grants, event_rx);

    if args.car_mode {
        broker.on_mode_changed(true);
    }

    let mut placed = Vec::new();
    for n in 0..args.calls.max(1) {
        let call = CallInfo::new(CallId::new())
            .incoming(n % 2 == 0)
            .state(CallState::Ringing);
        placed.push(call.id.clone());
        broker.on_call_added(call);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    if let Some(first) = placed.first() {
        let answered = CallInfo::new(first.clone()).incoming(true).state(CallState::Active);
        broker.on_call_state_changed(answered);
        broker.on_audio_state_changed(AudioState {
            route: AudioRoute::Speaker,
            muted: false,
        });
    }

    if args.emergency {
        let sos = CallInfo::new(CallId::new())
            .emergency(true)
            .state(CallState::Dialing);
        placed.push(sos.id.clone());
        broker.on_call_added(sos);
        broker.on_emergency_flag_changed(true);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    tracing::info!(
        active = broker.is_active(),
        ringing = broker.connected_ui_supports_ringing(),
        "session established"
    );
    print_dump(&broker, "mid-session");

    for id in &placed {
        broker.on_call_removed(id);
    }
    tokio::time::sleep(Duration::from_millis(700)).await;

    print_dump(&broker, "after teardown");
    broker.shutdown();
}

fn print_dump(broker: &Broker, label: &str) {
    match serde_json::to_string_pretty(&broker.dump()) {
        Ok(json) => println!("--- {label} ---\n{json}"),
        Err(err) => tracing::error!(error = %err, "dump serialization failed"),
    }
}

/// Transport that completes every bind immediately through the event
/// channel, handing back a display that logs everything it receives.
struct LoopbackTransport {
    events: TransportEventSender,
}

impl Transport for LoopbackTransport {
    fn bind(&self, endpoint: &ServiceEndpoint, hint: BindHint) -> Result<(), TransportError> {
        tracing::debug!(endpoint = %endpoint.identity, ?hint, "loopback bind");
        let display = Arc::new(ConsoleDisplay {
            identity: endpoint.identity.clone(),
        });
        self.events
            .send(TransportEvent::Bound {
                endpoint: endpoint.clone(),
                display,
            })
            .map_err(|_| TransportError::Unavailable("event channel closed".into()))
    }

    fn unbind(&self, endpoint: &ServiceEndpoint) {
        tracing::debug!(endpoint = %endpoint.identity, "loopback unbind");
        let _ = self.events.send(TransportEvent::Unbound {
            endpoint: endpoint.clone(),
        });
    }
}

/// Fixed registry: a preferred dialer, the system fallback, a car-mode
/// display and one monitor.
struct DemoLocator;

impl ServiceLocator for DemoLocator {
    fn query(
        &self,
        role: ServiceRole,
        package: Option<&str>,
    ) -> Result<Vec<ServiceEndpoint>, LocatorError> {
        let all = vec![
            ServiceEndpoint::new(
                ServiceIdentity::new("com.acme.dialer", "CallUi"),
                ServiceRole::UiPrimary,
            )
            .with_external_calls(true)
            .with_self_managed_calls(true)
            .with_ringing(true),
            ServiceEndpoint::new(
                ServiceIdentity::new("switchboard.system", "SystemCallUi"),
                ServiceRole::SystemFallback,
            ),
            ServiceEndpoint::new(
                ServiceIdentity::new("com.acme.car", "DashboardUi"),
                ServiceRole::CarModeUi,
            ),
            ServiceEndpoint::new(
                ServiceIdentity::new("com.acme.recorder", "CallMonitor"),
                ServiceRole::NonUiMonitor,
            )
            .with_external_calls(true),
        ];
        Ok(all
            .into_iter()
            .filter(|ep| ep.role == role)
            .filter(|ep| package.map_or(true, |p| ep.identity.package == p))
            .collect())
    }

    fn preferred_ui_package(&self) -> Option<String> {
        Some("com.acme.dialer".to_string())
    }
}

struct LoggingGrants;

impl EmergencyAccess for LoggingGrants {
    fn grant_for(&self, call: Option<&CallInfo>) {
        if call.map_or(true, |c| c.is_emergency) {
            tracing::info!("temporary location grant extended");
        }
    }

    fn revoke(&self) {
        tracing::info!("temporary location grant revoked");
    }
}

/// Display surface that prints every notification.
struct ConsoleDisplay {
    identity: ServiceIdentity,
}

impl CallDisplay for ConsoleDisplay {
    fn add_call(&self, snapshot: &CallSnapshot) -> Result<(), DeliveryError> {
        tracing::info!(
            display = %self.identity,
            call = %snapshot.id,
            state = ?snapshot.state,
            rtt = snapshot.include_rtt,
            "add_call"
        );
        Ok(())
    }

    fn update_call(&self, snapshot: &CallSnapshot) -> Result<(), DeliveryError> {
        tracing::info!(
            display = %self.identity,
            call = %snapshot.id,
            state = ?snapshot.state,
            "update_call"
        );
        Ok(())
    }

    fn remove_call(&self, call: &CallId) -> Result<(), DeliveryError> {
        tracing::info!(display = %self.identity, call = %call, "remove_call");
        Ok(())
    }

    fn set_audio_state(&self, audio: &AudioState) -> Result<(), DeliveryError> {
        tracing::info!(display = %self.identity, route = ?audio.route, muted = audio.muted, "set_audio_state");
        Ok(())
    }

    fn set_can_add_call(&self, can_add: bool) -> Result<(), DeliveryError> {
        tracing::info!(display = %self.identity, can_add, "set_can_add_call");
        Ok(())
    }

    fn set_post_dial_wait(&self, call: &CallId, remaining: &str) -> Result<(), DeliveryError> {
        tracing::info!(display = %self.identity, call = %call, remaining, "set_post_dial_wait");
        Ok(())
    }

    fn bring_to_foreground(&self, show_dialpad: bool) -> Result<(), DeliveryError> {
        tracing::info!(display = %self.identity, show_dialpad, "bring_to_foreground");
        Ok(())
    }

    fn silence_ringer(&self) -> Result<(), DeliveryError> {
        tracing::info!(display = %self.identity, "silence_ringer");
        Ok(())
    }

    fn connection_event(
        &self,
        call: &CallId,
        event: &str,
        _payload: Option<&serde_json::Value>,
    ) -> Result<(), DeliveryError> {
        tracing::info!(display = %self.identity, call = %call, event, "connection_event");
        Ok(())
    }

    fn rtt_initiation_failure(&self, call: &CallId, reason: i32) -> Result<(), DeliveryError> {
        tracing::info!(display = %self.identity, call = %call, reason, "rtt_initiation_failure");
        Ok(())
    }

    fn remote_rtt_request(&self, call: &CallId, request_id: u32) -> Result<(), DeliveryError> {
        tracing::info!(display = %self.identity, call = %call, request_id, "remote_rtt_request");
        Ok(())
    }
}
