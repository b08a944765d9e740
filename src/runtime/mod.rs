use crate::error::Result;
use crate::types::{ContainerSnapshot, ContainerSummary, LifecycleEvent};
use async_trait::async_trait;
use futures_util::stream::BoxStream;

pub mod docker;
pub use docker::DockerRuntime;

/// Read side of the container runtime the reconciler depends on.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Current metadata for a container.
    async fn inspect(&self, container_id: &str) -> Result<ContainerSnapshot>;

    /// Containers matching a `key=value` label filter.
    async fn list_containers(&self, label_filter: &str) -> Result<Vec<ContainerSummary>>;

    /// Address of `interface` as seen from inside the container, or an
    /// empty string when it has none.
    ///
    /// Callers bound this with a timeout. Dropping the future abandons the
    /// exec; the process started inside the container is not killed and
    /// runs to completion on its own.
    async fn container_ip(&self, container_id: &str, interface: &str) -> Result<String>;

    /// Lifecycle events from now on. The stream ends or yields an error
    /// when the connection to the runtime is lost.
    fn events(&self) -> BoxStream<'static, Result<LifecycleEvent>>;
}
