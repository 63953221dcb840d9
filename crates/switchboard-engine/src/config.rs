use std::time::Duration;

use switchboard_core::ServiceIdentity;

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// How long the call set must stay empty before connections are torn
    /// down. Debounces rapid last-call-removed / new-call-added flips into
    /// one continuous session.
    pub teardown_delay: Duration,
    /// Identity of the system-provided display UI. Used as the emergency
    /// fallback target, and bound blind if the locator cannot resolve it.
    pub system_fallback: ServiceIdentity,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            teardown_delay: Duration::from_secs(2),
            system_fallback: ServiceIdentity::new("switchboard.system", "SystemCallUi"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_debounce_is_two_seconds() {
        let config = EngineConfig::default();
        assert_eq!(config.teardown_delay, Duration::from_secs(2));
        assert_eq!(config.system_fallback.package, "switchboard.system");
    }
}
