pub mod notifier;

pub use notifier::{Notification, NotificationItem, Notifier};
