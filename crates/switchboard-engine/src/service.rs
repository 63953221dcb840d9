use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use switchboard_core::ids::CallId;
use switchboard_core::{
    AudioState, CallInfo, Transport, TransportEventReceiver,
};

use crate::config::EngineConfig;
use crate::dump::EngineDump;
use crate::grants::EmergencyAccess;
use crate::locator::ServiceLocator;
use crate::orchestrator::Orchestrator;

/// Async wrapper around one [`Orchestrator`].
///
/// Owns the single lock that serializes every entry point, pumps the
/// transport's callback channel through it in arrival order, and runs the
/// teardown grace timer. Multiple brokers can coexist in one process;
/// nothing here is global.
pub struct Broker {
    orchestrator: Arc<Mutex<Orchestrator>>,
    config: EngineConfig,
    shutdown: CancellationToken,
    pump: JoinHandle<()>,
}

impl Broker {
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        locator: Arc<dyn ServiceLocator>,
        grants: Arc<dyn EmergencyAccess>,
        events: TransportEventReceiver,
    ) -> Self {
        let orchestrator = Arc::new(Mutex::new(Orchestrator::new(
            config.clone(),
            transport,
            locator,
            grants,
        )));
        let shutdown = CancellationToken::new();
        let pump = Self::spawn_pump(Arc::clone(&orchestrator), events, shutdown.clone());
        Self {
            orchestrator,
            config,
            shutdown,
            pump,
        }
    }

    fn spawn_pump(
        orchestrator: Arc<Mutex<Orchestrator>>,
        mut events: TransportEventReceiver,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => {
                            debug!(?event, "transport event");
                            orchestrator.lock().handle_transport_event(event);
                        }
                        None => {
                            info!("transport event channel closed");
                            break;
                        }
                    },
                }
            }
        })
    }

    pub fn on_call_added(&self, call: CallInfo) {
        self.orchestrator.lock().on_call_added(call);
    }

    pub fn on_call_removed(&self, id: &CallId) {
        let became_empty = self.orchestrator.lock().on_call_removed(id);
        if became_empty {
            self.schedule_teardown();
        }
    }

    pub fn on_call_state_changed(&self, call: CallInfo) {
        self.orchestrator.lock().on_call_state_changed(call);
    }

    pub fn on_call_became_external(&self, call: CallInfo, is_external: bool) {
        self.orchestrator
            .lock()
            .on_call_became_external(call, is_external);
    }

    pub fn on_emergency_flag_changed(&self, has_emergency: bool) {
        self.orchestrator
            .lock()
            .on_emergency_flag_changed(has_emergency);
    }

    pub fn on_mode_changed(&self, alternate: bool) {
        self.orchestrator.lock().on_mode_changed(alternate);
    }

    pub fn on_audio_state_changed(&self, audio: AudioState) {
        self.orchestrator.lock().on_audio_state_changed(audio);
    }

    pub fn on_can_add_call_changed(&self, can_add: bool) {
        self.orchestrator.lock().on_can_add_call_changed(can_add);
    }

    pub fn on_post_dial_wait(&self, call: &CallId, remaining: &str) {
        self.orchestrator.lock().on_post_dial_wait(call, remaining);
    }

    pub fn bring_to_foreground(&self, show_dialpad: bool) {
        self.orchestrator.lock().bring_to_foreground(show_dialpad);
    }

    pub fn silence_ringer(&self) {
        self.orchestrator.lock().silence_ringer();
    }

    pub fn notify_connection_event(
        &self,
        call: &CallId,
        event: &str,
        payload: Option<&serde_json::Value>,
    ) {
        self.orchestrator
            .lock()
            .notify_connection_event(call, event, payload);
    }

    pub fn notify_rtt_initiation_failure(&self, call: &CallId, reason: i32) {
        self.orchestrator
            .lock()
            .notify_rtt_initiation_failure(call, reason);
    }

    pub fn notify_remote_rtt_request(&self, call: &CallId, request_id: u32) {
        self.orchestrator
            .lock()
            .notify_remote_rtt_request(call, request_id);
    }

    pub fn is_active(&self) -> bool {
        self.orchestrator.lock().is_active()
    }

    pub fn connected_ui_supports_ringing(&self) -> bool {
        self.orchestrator.lock().connected_ui_supports_ringing()
    }

    pub fn dump(&self) -> EngineDump {
        self.orchestrator.lock().dump()
    }

    /// Stops the event pump and outstanding grace timers. Connections are
    /// left to the orchestrator's own teardown paths.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.pump.abort();
    }

    /// Starts the grace timer. The timer body re-checks the call set, so a
    /// call arriving inside the window keeps the session; firing twice is
    /// harmless because teardown is idempotent.
    fn schedule_teardown(&self) {
        let orchestrator = Arc::clone(&self.orchestrator);
        let delay = self.config.teardown_delay;
        let shutdown = self.shutdown.clone();
        debug!(?delay, "call set drained, scheduling teardown");
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    orchestrator.lock().teardown_if_idle();
                }
            }
        });
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{call, endpoint, MockTransport, RecordingDisplay, RecordingGrants, StaticLocator};
    use std::time::Duration;
    use switchboard_core::transport::transport_event_channel;
    use switchboard_core::{CallDisplay, ServiceEndpoint, ServiceRole, TransportEvent};

    const PREFERRED: &str = "com.acme.dialer";
    const FALLBACK: &str = "switchboard.system";

    fn endpoints() -> Vec<ServiceEndpoint> {
        vec![
            endpoint(PREFERRED, ServiceRole::UiPrimary),
            endpoint(FALLBACK, ServiceRole::SystemFallback),
        ]
    }

    fn broker(teardown_delay: Duration) -> (Broker, Arc<MockTransport>, switchboard_core::transport::TransportEventSender) {
        let transport = Arc::new(MockTransport::new());
        let (event_tx, event_rx) = transport_event_channel();
        let config = EngineConfig {
            teardown_delay,
            ..EngineConfig::default()
        };
        let broker = Broker::new(
            config,
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(StaticLocator::new(endpoints()).with_preferred(PREFERRED)),
            Arc::new(RecordingGrants::new()),
            event_rx,
        );
        (broker, transport, event_tx)
    }

    #[tokio::test]
    async fn pump_delivers_bound_events_to_the_orchestrator() {
        let (broker, _transport, event_tx) = broker(Duration::from_secs(2));

        broker.on_call_added(call("call_a"));
        assert!(broker.is_active());

        let display = Arc::new(RecordingDisplay::new());
        event_tx
            .send(TransportEvent::Bound {
                endpoint: endpoint(PREFERRED, ServiceRole::UiPrimary),
                display: Arc::clone(&display) as Arc<dyn CallDisplay>,
            })
            .unwrap();

        // Give the pump task time to process.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(display.added_calls().len(), 1);
        assert_eq!(broker.dump().displays.len(), 1);
        broker.shutdown();
    }

    #[tokio::test]
    async fn teardown_fires_after_the_grace_period() {
        let (broker, transport, _event_tx) = broker(Duration::from_millis(50));

        broker.on_call_added(call("call_a"));
        broker.on_call_removed(&CallId::from_raw("call_a"));
        assert!(broker.is_active());

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(!broker.is_active());
        assert_eq!(transport.unbind_count(PREFERRED), 1);
        broker.shutdown();
    }

    #[tokio::test]
    async fn call_returning_within_the_window_keeps_the_session() {
        let (broker, transport, _event_tx) = broker(Duration::from_millis(80));

        broker.on_call_added(call("call_a"));
        broker.on_call_removed(&CallId::from_raw("call_a"));
        // The set refills before the timer fires.
        broker.on_call_added(call("call_b"));

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(broker.is_active());
        assert_eq!(transport.unbind_count(PREFERRED), 0);
        broker.shutdown();
    }

    #[tokio::test]
    async fn shutdown_cancels_pending_teardown() {
        let (broker, transport, _event_tx) = broker(Duration::from_millis(50));

        broker.on_call_added(call("call_a"));
        broker.on_call_removed(&CallId::from_raw("call_a"));
        broker.shutdown();

        tokio::time::sleep(Duration::from_millis(150)).await;

        // The timer was cancelled, so nothing was unbound.
        assert_eq!(transport.unbind_count(PREFERRED), 0);
    }

    #[tokio::test]
    async fn pump_survives_unknown_endpoints() {
        let (broker, _transport, event_tx) = broker(Duration::from_secs(2));

        broker.on_call_added(call("call_a"));
        event_tx
            .send(TransportEvent::Unbound {
                endpoint: endpoint("com.stray.pkg", ServiceRole::NonUiMonitor),
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(broker.is_active());
        broker.shutdown();
    }
}
