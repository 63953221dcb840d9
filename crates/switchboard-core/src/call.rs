use serde::{Deserialize, Serialize};

use crate::ids::CallId;

/// Lifecycle state of a call as reported by the routing authority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    New,
    Ringing,
    Dialing,
    Active,
    Holding,
    Disconnected,
}

/// A call as the broker sees it: an opaque id plus the minimal predicates
/// needed for routing decisions. The broker never interprets call content
/// beyond these.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallInfo {
    pub id: CallId,
    pub state: CallState,
    pub is_emergency: bool,
    pub is_self_managed: bool,
    pub is_external: bool,
    pub is_incoming: bool,
    /// Ids of conference children. A call with children is pushed to a
    /// freshly connected endpoint only after its children.
    pub children: Vec<CallId>,
}

impl CallInfo {
    pub fn new(id: CallId) -> Self {
        Self {
            id,
            state: CallState::New,
            is_emergency: false,
            is_self_managed: false,
            is_external: false,
            is_incoming: false,
            children: Vec::new(),
        }
    }

    pub fn emergency(mut self, flag: bool) -> Self {
        self.is_emergency = flag;
        self
    }

    pub fn self_managed(mut self, flag: bool) -> Self {
        self.is_self_managed = flag;
        self
    }

    pub fn external(mut self, flag: bool) -> Self {
        self.is_external = flag;
        self
    }

    pub fn incoming(mut self, flag: bool) -> Self {
        self.is_incoming = flag;
        self
    }

    pub fn state(mut self, state: CallState) -> Self {
        self.state = state;
        self
    }

    pub fn children(mut self, children: Vec<CallId>) -> Self {
        self.children = children;
        self
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Where call audio is routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioRoute {
    Earpiece,
    Speaker,
    Bluetooth,
    WiredHeadset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioState {
    pub route: AudioRoute,
    pub muted: bool,
}

impl Default for AudioState {
    fn default() -> Self {
        Self {
            route: AudioRoute::Earpiece,
            muted: false,
        }
    }
}

/// The projection of a call sent to one endpoint. Built fresh per
/// receiver: external-call details are masked for endpoints that do not
/// support them, and secondary-channel (RTT) payloads are included only
/// for the endpoint currently selected as the primary display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSnapshot {
    pub id: CallId,
    pub state: CallState,
    pub is_emergency: bool,
    pub is_self_managed: bool,
    pub is_external: bool,
    pub is_incoming: bool,
    pub children: Vec<CallId>,
    pub external_support: bool,
    pub include_rtt: bool,
}

impl CallSnapshot {
    pub fn of(call: &CallInfo, external_support: bool, include_rtt: bool) -> Self {
        Self {
            id: call.id.clone(),
            state: call.state,
            is_emergency: call.is_emergency,
            is_self_managed: call.is_self_managed,
            is_external: call.is_external,
            is_incoming: call.is_incoming,
            children: call.children.clone(),
            external_support,
            include_rtt,
        }
    }

    /// Overrides the projected state, e.g. to retract a newly external
    /// call from an endpoint that cannot follow it.
    pub fn with_state(mut self, state: CallState) -> Self {
        self.state = state;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_call_defaults() {
        let call = CallInfo::new(CallId::from_raw("call_a"));
        assert_eq!(call.state, CallState::New);
        assert!(!call.is_emergency);
        assert!(!call.has_children());
    }

    #[test]
    fn snapshot_copies_predicates() {
        let call = CallInfo::new(CallId::from_raw("call_a"))
            .emergency(true)
            .incoming(true)
            .state(CallState::Ringing);
        let snap = CallSnapshot::of(&call, true, false);
        assert_eq!(snap.id, call.id);
        assert_eq!(snap.state, CallState::Ringing);
        assert!(snap.is_emergency);
        assert!(snap.external_support);
        assert!(!snap.include_rtt);
    }

    #[test]
    fn snapshot_state_override() {
        let call = CallInfo::new(CallId::from_raw("call_a")).state(CallState::Active);
        let snap = CallSnapshot::of(&call, false, false).with_state(CallState::Disconnected);
        assert_eq!(snap.state, CallState::Disconnected);
    }

    #[test]
    fn snapshot_serde_roundtrip() {
        let call = CallInfo::new(CallId::from_raw("call_a"))
            .children(vec![CallId::from_raw("call_b")]);
        let snap = CallSnapshot::of(&call, false, true);
        let json = serde_json::to_string(&snap).unwrap();
        let parsed: CallSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snap, parsed);
    }

    #[test]
    fn audio_state_default_is_unmuted_earpiece() {
        let audio = AudioState::default();
        assert_eq!(audio.route, AudioRoute::Earpiece);
        assert!(!audio.muted);
    }
}
