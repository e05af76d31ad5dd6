use async_trait::async_trait;

use crate::error::Result;
use crate::types::Notification;

/// A delivery backend.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &str;

    /// Deliver `note`. Errors are reported to the caller, which logs and
    /// moves on to the next backend.
    async fn send(&self, note: &Notification) -> Result<()>;
}
