use chrono::{DateTime, Utc};
use serde::Serialize;

use switchboard_core::ids::{CallId, SessionId};
use switchboard_core::{ServiceIdentity, ServiceRole};

use crate::conn::ConnectionState;

/// Read-only diagnostic snapshot of the whole engine. Building one never
/// mutates state.
#[derive(Clone, Debug, Serialize)]
pub struct EngineDump {
    pub captured_at: DateTime<Utc>,
    pub session: Option<SessionId>,
    pub active: bool,
    pub car_mode: bool,
    pub ui: Option<ModeSwapDump>,
    pub monitors: Vec<DirectDump>,
    pub displays: Vec<ServiceIdentity>,
    pub calls: Vec<CallId>,
    pub announced: Vec<CallId>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ModeSwapDump {
    pub connected: bool,
    pub alternate_mode: bool,
    pub normal: UiConnDump,
    pub alternate: Option<UiConnDump>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UiConnDump {
    Direct(DirectDump),
    Emergency(EmergencyDump),
}

#[derive(Clone, Debug, Serialize)]
pub struct EmergencyDump {
    pub proxying: bool,
    pub connected: bool,
    pub fallback: DirectDump,
    pub preferred: Option<DirectDump>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DirectDump {
    pub identity: ServiceIdentity,
    pub role: ServiceRole,
    pub state: ConnectionState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_serializes_to_json() {
        let dump = EngineDump {
            captured_at: Utc::now(),
            session: Some(SessionId::from_raw("sess_1")),
            active: true,
            car_mode: false,
            ui: Some(ModeSwapDump {
                connected: true,
                alternate_mode: false,
                normal: UiConnDump::Emergency(EmergencyDump {
                    proxying: true,
                    connected: true,
                    fallback: DirectDump {
                        identity: ServiceIdentity::new("switchboard.system", "SystemCallUi"),
                        role: ServiceRole::SystemFallback,
                        state: ConnectionState::NotConnected,
                    },
                    preferred: Some(DirectDump {
                        identity: ServiceIdentity::new("com.acme.dialer", "CallUi"),
                        role: ServiceRole::UiPrimary,
                        state: ConnectionState::Connected,
                    }),
                }),
                alternate: None,
            }),
            monitors: vec![],
            displays: vec![ServiceIdentity::new("com.acme.dialer", "CallUi")],
            calls: vec![CallId::from_raw("call_1")],
            announced: vec![CallId::from_raw("call_1")],
        };

        let json = serde_json::to_value(&dump).unwrap();
        assert_eq!(json["ui"]["normal"]["kind"], "emergency");
        assert_eq!(json["ui"]["normal"]["proxying"], true);
        assert_eq!(
            json["ui"]["normal"]["preferred"]["state"],
            "connected"
        );
    }
}
