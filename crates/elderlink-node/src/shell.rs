use elderlink::protocol::Importance;

/// Something to surface on the device screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub importance: Importance,
    pub requires_acknowledgment: bool,
}

/// The launcher UI that displays notifications.
pub trait UiShell: Send + Sync {
    fn show_notification(&self, notification: &Notification);
}

/// Shell that only logs. Local socket clients still receive the notification
/// as an event.
pub struct LogShell;

impl UiShell for LogShell {
    fn show_notification(&self, notification: &Notification) {
        tracing::info!(
            title = %notification.title,
            importance = ?notification.importance,
            "notification for the elder"
        );
    }
}
