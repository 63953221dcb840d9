use crate::call::{AudioState, CallSnapshot};
use crate::errors::DeliveryError;
use crate::ids::CallId;

/// The outbound surface of one connected display service.
///
/// Every operation is best-effort and fire-and-forget: implementations
/// enqueue and return, and a `DeliveryError` means the notification was
/// dropped, not that the connection is dead. The broker logs and swallows
/// delivery failures; teardown only ever comes from the transport's
/// unbound callback.
pub trait CallDisplay: Send + Sync {
    fn add_call(&self, snapshot: &CallSnapshot) -> Result<(), DeliveryError>;
    fn update_call(&self, snapshot: &CallSnapshot) -> Result<(), DeliveryError>;
    fn remove_call(&self, call: &CallId) -> Result<(), DeliveryError>;
    fn set_audio_state(&self, audio: &AudioState) -> Result<(), DeliveryError>;
    fn set_can_add_call(&self, can_add: bool) -> Result<(), DeliveryError>;
    fn set_post_dial_wait(&self, call: &CallId, remaining: &str) -> Result<(), DeliveryError>;
    fn bring_to_foreground(&self, show_dialpad: bool) -> Result<(), DeliveryError>;
    fn silence_ringer(&self) -> Result<(), DeliveryError>;

    /// Forwards a free-form event raised by the call's routing backend.
    fn connection_event(
        &self,
        call: &CallId,
        event: &str,
        payload: Option<&serde_json::Value>,
    ) -> Result<(), DeliveryError>;

    fn rtt_initiation_failure(&self, call: &CallId, reason: i32) -> Result<(), DeliveryError>;
    fn remote_rtt_request(&self, call: &CallId, request_id: u32) -> Result<(), DeliveryError>;
}
