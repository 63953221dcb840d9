//! Shared mocks for engine tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use switchboard_core::ids::CallId;
use switchboard_core::{
    AudioState, BindHint, CallDisplay, CallInfo, CallSnapshot, CallState, DeliveryError,
    ServiceEndpoint, ServiceIdentity, ServiceRole, Transport, TransportError,
};

use crate::conn::BindContext;
use crate::grants::EmergencyAccess;
use crate::locator::{LocatorError, ServiceLocator};

pub(crate) fn endpoint(package: &str, role: ServiceRole) -> ServiceEndpoint {
    ServiceEndpoint::new(ServiceIdentity::new(package, "CallUi"), role)
}

pub(crate) fn call(id: &str) -> CallInfo {
    CallInfo::new(CallId::from_raw(id))
}

pub(crate) fn ctx_for(
    transport: &Arc<MockTransport>,
    grants: &Arc<impl EmergencyAccess + 'static>,
) -> BindContext {
    BindContext {
        transport: Arc::clone(transport) as Arc<dyn Transport>,
        grants: Arc::clone(grants) as Arc<dyn EmergencyAccess>,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum TransportOp {
    Bind(String),
    Unbind(String),
}

/// Records bind/unbind requests; binds to packages in the refuse set fail
/// synchronously.
pub(crate) struct MockTransport {
    ops: Mutex<Vec<TransportOp>>,
    refused: Mutex<HashSet<String>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            refused: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn refuse(&self, package: &str) {
        self.refused.lock().insert(package.to_string());
    }

    pub(crate) fn ops(&self) -> Vec<TransportOp> {
        self.ops.lock().clone()
    }

    pub(crate) fn bind_count(&self, package: &str) -> usize {
        self.ops
            .lock()
            .iter()
            .filter(|op| matches!(op, TransportOp::Bind(p) if p == package))
            .count()
    }

    pub(crate) fn unbind_count(&self, package: &str) -> usize {
        self.ops
            .lock()
            .iter()
            .filter(|op| matches!(op, TransportOp::Unbind(p) if p == package))
            .count()
    }
}

impl Transport for MockTransport {
    fn bind(&self, endpoint: &ServiceEndpoint, _hint: BindHint) -> Result<(), TransportError> {
        let package = endpoint.identity.package.clone();
        if self.refused.lock().contains(&package) {
            return Err(TransportError::Refused(endpoint.identity.clone()));
        }
        self.ops.lock().push(TransportOp::Bind(package));
        Ok(())
    }

    fn unbind(&self, endpoint: &ServiceEndpoint) {
        self.ops
            .lock()
            .push(TransportOp::Unbind(endpoint.identity.package.clone()));
    }
}

/// Grants collaborator that counts grant/revoke calls.
pub(crate) struct RecordingGrants {
    granted: AtomicU32,
    revoked: AtomicU32,
}

impl RecordingGrants {
    pub(crate) fn new() -> Self {
        Self {
            granted: AtomicU32::new(0),
            revoked: AtomicU32::new(0),
        }
    }

    pub(crate) fn granted(&self) -> u32 {
        self.granted.load(Ordering::Relaxed)
    }

    pub(crate) fn revoked(&self) -> u32 {
        self.revoked.load(Ordering::Relaxed)
    }
}

impl EmergencyAccess for RecordingGrants {
    fn grant_for(&self, _call: Option<&CallInfo>) {
        self.granted.fetch_add(1, Ordering::Relaxed);
    }

    fn revoke(&self) {
        self.revoked.fetch_add(1, Ordering::Relaxed);
    }
}

/// Grants collaborator that does nothing.
pub(crate) struct NullGrants;

impl EmergencyAccess for NullGrants {
    fn grant_for(&self, _call: Option<&CallInfo>) {}
    fn revoke(&self) {}
}

/// Locator serving a fixed endpoint list.
pub(crate) struct StaticLocator {
    endpoints: Vec<ServiceEndpoint>,
    preferred: Option<String>,
}

impl StaticLocator {
    pub(crate) fn new(endpoints: Vec<ServiceEndpoint>) -> Self {
        Self {
            endpoints,
            preferred: None,
        }
    }

    pub(crate) fn with_preferred(mut self, package: &str) -> Self {
        self.preferred = Some(package.to_string());
        self
    }
}

impl ServiceLocator for StaticLocator {
    fn query(
        &self,
        role: ServiceRole,
        package: Option<&str>,
    ) -> Result<Vec<ServiceEndpoint>, LocatorError> {
        Ok(self
            .endpoints
            .iter()
            .filter(|ep| ep.role == role)
            .filter(|ep| package.map_or(true, |p| ep.identity.package == p))
            .cloned()
            .collect())
    }

    fn preferred_ui_package(&self) -> Option<String> {
        self.preferred.clone()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum DisplayOp {
    Add { call: CallId, include_rtt: bool },
    Update { call: CallId, state: CallState },
    Remove(CallId),
    Audio(AudioState),
    CanAddCall(bool),
    PostDialWait(CallId, String),
    Foreground(bool),
    SilenceRinger,
    ConnectionEvent(CallId, String),
    RttFailure(CallId),
    RttRequest(CallId),
}

/// Display handle that records every delivery; optionally fails them all.
pub(crate) struct RecordingDisplay {
    ops: Mutex<Vec<DisplayOp>>,
    failing: Mutex<bool>,
}

impl RecordingDisplay {
    pub(crate) fn new() -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            failing: Mutex::new(false),
        }
    }

    pub(crate) fn fail_deliveries(&self) {
        *self.failing.lock() = true;
    }

    pub(crate) fn ops(&self) -> Vec<DisplayOp> {
        self.ops.lock().clone()
    }

    pub(crate) fn added_calls(&self) -> Vec<CallId> {
        self.ops
            .lock()
            .iter()
            .filter_map(|op| match op {
                DisplayOp::Add { call, .. } => Some(call.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, op: DisplayOp) -> Result<(), DeliveryError> {
        if *self.failing.lock() {
            return Err(DeliveryError::Closed);
        }
        self.ops.lock().push(op);
        Ok(())
    }
}

impl CallDisplay for RecordingDisplay {
    fn add_call(&self, snapshot: &CallSnapshot) -> Result<(), DeliveryError> {
        self.record(DisplayOp::Add {
            call: snapshot.id.clone(),
            include_rtt: snapshot.include_rtt,
        })
    }

    fn update_call(&self, snapshot: &CallSnapshot) -> Result<(), DeliveryError> {
        self.record(DisplayOp::Update {
            call: snapshot.id.clone(),
            state: snapshot.state,
        })
    }

    fn remove_call(&self, call: &CallId) -> Result<(), DeliveryError> {
        self.record(DisplayOp::Remove(call.clone()))
    }

    fn set_audio_state(&self, audio: &AudioState) -> Result<(), DeliveryError> {
        self.record(DisplayOp::Audio(*audio))
    }

    fn set_can_add_call(&self, can_add: bool) -> Result<(), DeliveryError> {
        self.record(DisplayOp::CanAddCall(can_add))
    }

    fn set_post_dial_wait(&self, call: &CallId, remaining: &str) -> Result<(), DeliveryError> {
        self.record(DisplayOp::PostDialWait(call.clone(), remaining.to_string()))
    }

    fn bring_to_foreground(&self, show_dialpad: bool) -> Result<(), DeliveryError> {
        self.record(DisplayOp::Foreground(show_dialpad))
    }

    fn silence_ringer(&self) -> Result<(), DeliveryError> {
        self.record(DisplayOp::SilenceRinger)
    }

    fn connection_event(
        &self,
        call: &CallId,
        event: &str,
        _payload: Option<&serde_json::Value>,
    ) -> Result<(), DeliveryError> {
        self.record(DisplayOp::ConnectionEvent(call.clone(), event.to_string()))
    }

    fn rtt_initiation_failure(&self, call: &CallId, _reason: i32) -> Result<(), DeliveryError> {
        self.record(DisplayOp::RttFailure(call.clone()))
    }

    fn remote_rtt_request(&self, call: &CallId, _request_id: u32) -> Result<(), DeliveryError> {
        self.record(DisplayOp::RttRequest(call.clone()))
    }
}
