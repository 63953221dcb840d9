use switchboard_core::CallInfo;

/// The permission-grant collaborator consulted around emergency sessions.
///
/// When the emergency connection binds the system fallback directly it
/// signals this seam so the platform can extend temporary grants (e.g.
/// location access) to the surface handling the emergency call; the grant
/// is retracted when that connection is dropped. Implementations decide
/// whether a given call actually warrants a grant.
pub trait EmergencyAccess: Send + Sync {
    fn grant_for(&self, call: Option<&CallInfo>);
    fn revoke(&self);
}
