use warden_events::{Notification, NotificationBus, NotificationId};
use warden_telemetry::Metrics;

/// Publish a user-visible notification and count it.
pub(crate) fn publish(
    bus: &NotificationBus,
    metrics: Option<&Metrics>,
    notification: Notification,
) -> NotificationId {
    if let Some(metrics) = metrics {
        metrics.inc_notification(notification.severity.as_str());
    }
    bus.publish(notification)
}
