pub mod admin_desk;
pub mod notifications;
pub mod session_sync;

#[cfg(test)]
mod session_sync_test;

pub use admin_desk::AdminDesk;
pub use notifications::{Notification, NotificationQueue, Severity};
pub use session_sync::{Confirm, SessionSync, SyncSnapshot};
