/*!
 Lifecycle notifications emitted around a model load.

 The observer is an explicitly passed collaborator, never ambient state;
 passing `None` to the load entry points disables all notifications.
*/

/// Receives lifecycle notifications around a model load
///
/// All methods have empty default bodies, so implementers only write the
/// hooks they care about. Observation never alters the outcome of a load:
/// a failure is reported and then re-raised to the caller unchanged.
pub trait LoadObserver {
    /// A load attempt is starting
    fn on_enter_load_model(&self) {}

    /// A load attempt completed; `_name` is the loaded module's type name
    fn on_exit_load_model(&self, _name: &str) {}

    /// A load attempt failed; `_message` is the rendered failure
    fn on_fail_load_model(&self, _message: &str) {}
}
