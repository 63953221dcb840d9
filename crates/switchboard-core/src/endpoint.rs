use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::call::CallInfo;

/// Identifies an installed display service: the owning package plus the
/// service entry point inside it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub package: String,
    pub service: String,
}

impl ServiceIdentity {
    pub fn new(package: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            service: service.into(),
        }
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.service)
    }
}

/// The role a display service plays in the binding tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceRole {
    UiPrimary,
    SystemFallback,
    CarModeUi,
    NonUiMonitor,
}

/// A candidate display service and its declared capabilities.
///
/// Equality and hashing cover the identity and the two capability flags
/// only: the same service rediscovered with a different capability
/// snapshot is a distinct endpoint for caching purposes, while the role
/// and ringing metadata never participate in identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub identity: ServiceIdentity,
    pub supports_external_calls: bool,
    pub supports_self_managed_calls: bool,
    pub supports_ringing: bool,
    pub role: ServiceRole,
}

impl ServiceEndpoint {
    pub fn new(identity: ServiceIdentity, role: ServiceRole) -> Self {
        Self {
            identity,
            supports_external_calls: false,
            supports_self_managed_calls: false,
            supports_ringing: false,
            role,
        }
    }

    pub fn with_external_calls(mut self, supported: bool) -> Self {
        self.supports_external_calls = supported;
        self
    }

    pub fn with_self_managed_calls(mut self, supported: bool) -> Self {
        self.supports_self_managed_calls = supported;
        self
    }

    pub fn with_ringing(mut self, supported: bool) -> Self {
        self.supports_ringing = supported;
        self
    }

    /// The capability filter: whether this endpoint may be told about
    /// `call` at all. Applied uniformly to add, update and remove
    /// notifications.
    pub fn accepts(&self, call: &CallInfo) -> bool {
        (!call.is_external || self.supports_external_calls)
            && (!call.is_self_managed || self.supports_self_managed_calls)
    }
}

impl PartialEq for ServiceEndpoint {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
            && self.supports_external_calls == other.supports_external_calls
            && self.supports_self_managed_calls == other.supports_self_managed_calls
    }
}

impl Eq for ServiceEndpoint {}

impl Hash for ServiceEndpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
        self.supports_external_calls.hash(state);
        self.supports_self_managed_calls.hash(state);
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} external:{} self-managed:{}]",
            self.identity, self.supports_external_calls, self.supports_self_managed_calls
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::CallId;

    fn endpoint() -> ServiceEndpoint {
        ServiceEndpoint::new(
            ServiceIdentity::new("com.acme.dialer", "CallUi"),
            ServiceRole::UiPrimary,
        )
    }

    #[test]
    fn equality_ignores_role() {
        let a = endpoint();
        let mut b = endpoint();
        b.role = ServiceRole::NonUiMonitor;
        assert_eq!(a, b);
    }

    #[test]
    fn equality_tracks_capability_snapshot() {
        let a = endpoint();
        let b = endpoint().with_external_calls(true);
        assert_ne!(a, b);
    }

    #[test]
    fn equality_ignores_ringing_flag() {
        let a = endpoint();
        let b = endpoint().with_ringing(true);
        assert_eq!(a, b);
    }

    #[test]
    fn hash_matches_equality() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(endpoint());
        let mut relabeled = endpoint();
        relabeled.role = ServiceRole::SystemFallback;
        assert!(set.contains(&relabeled));
        assert!(!set.contains(&endpoint().with_self_managed_calls(true)));
    }

    #[test]
    fn accepts_applies_both_capability_gates() {
        let plain = endpoint();
        let capable = endpoint()
            .with_external_calls(true)
            .with_self_managed_calls(true);

        let ordinary = CallInfo::new(CallId::new());
        let external = CallInfo::new(CallId::new()).external(true);
        let self_managed = CallInfo::new(CallId::new()).self_managed(true);

        assert!(plain.accepts(&ordinary));
        assert!(!plain.accepts(&external));
        assert!(!plain.accepts(&self_managed));
        assert!(capable.accepts(&external));
        assert!(capable.accepts(&self_managed));
    }

    #[test]
    fn identity_displays_as_path() {
        let id = ServiceIdentity::new("com.acme.dialer", "CallUi");
        assert_eq!(id.to_string(), "com.acme.dialer/CallUi");
    }
}
