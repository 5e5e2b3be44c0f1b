/// Fire-and-forget notification fan-out.
///
/// Implementations must not block the caller on delivery.
pub trait Notifier: Send + Sync {
    /// Send a human-readable message to the operator chat.
    fn telegram_send(&self, text: String);

    /// Publish an internal event name to in-process subscribers.
    fn internal_send(&self, event: &str);
}

/// Discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn telegram_send(&self, _text: String) {}

    fn internal_send(&self, _event: &str) {}
}
