//! Outcome notifications.
//!
//! One [`Notification`] per renewal cycle goes to every configured backend.
//! A failing backend is logged and skipped; delivery problems never reach the
//! scheduler.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`types`] | The notification payload |
//! | [`notifier`] | The backend trait |
//! | [`manager`] | Fan-out with per-backend isolation |
//! | [`wecom`] | WeCom group-robot markdown messages |
//! | [`webhook`] | Plain JSON POST to any URL |

pub mod error;
pub mod manager;
pub mod notifier;
pub mod types;
pub mod wecom;
pub mod webhook;

pub use error::{NotifyError, Result};
pub use manager::NotificationManager;
pub use notifier::Notifier;
pub use types::{Notification, NotifyStatus};
pub use wecom::WeComNotifier;
pub use webhook::WebhookNotifier;
