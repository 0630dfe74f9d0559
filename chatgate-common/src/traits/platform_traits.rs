// File: chatgate-common/src/traits/platform_traits.rs

use async_trait::async_trait;
use crate::Error;

/// Outbound half of a platform connector.
#[async_trait]
pub trait PlatformSender: Send + Sync {
    fn is_connected(&self) -> bool;
    async fn send(&self, channel: &str, text: &str) -> Result<(), Error>;
}
