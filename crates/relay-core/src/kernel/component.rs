use std::any::Any;
use std::fmt::Debug;

use async_trait::async_trait;

use crate::kernel::error::Result;

/// Lifecycle hooks driven by [`Application`](crate::kernel::bootstrap::Application).
///
/// Components are initialized and started in registration order and stopped
/// in reverse: the event manager publishes `shutdown` before the task queue
/// drains.
#[async_trait]
pub trait KernelComponent: Any + Send + Sync + Debug {
    /// Name reported in lifecycle errors
    fn name(&self) -> &'static str;
    async fn initialize(&self) -> Result<()>;
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}
