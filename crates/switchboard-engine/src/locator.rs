use switchboard_core::{ServiceEndpoint, ServiceRole};

#[derive(Debug, thiserror::Error)]
pub enum LocatorError {
    #[error("service registry unavailable: {0}")]
    Unavailable(String),
}

/// The platform's service-discovery seam.
///
/// Queried fresh on every (re)bind attempt. Results are never cached
/// across sessions, since the installed-service population can change
/// between calls.
pub trait ServiceLocator: Send + Sync {
    /// Lists candidate endpoints for a role, optionally restricted to one
    /// package.
    fn query(
        &self,
        role: ServiceRole,
        package: Option<&str>,
    ) -> Result<Vec<ServiceEndpoint>, LocatorError>;

    /// Package the user has chosen as their preferred call UI, if any.
    fn preferred_ui_package(&self) -> Option<String>;
}
