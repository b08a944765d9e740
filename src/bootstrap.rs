//! Startup pass that republishes records for containers which were
//! already healthy before this process started.
//!
//! Records of containers that disappeared while nobody was watching are
//! left in place; only publishes are caught up.

use log::{debug, info};

use crate::dispatch::{Dispatcher, Job};
use crate::error::{with_timeout, Result};
use crate::reconciler::{Outcome, Reconciler, SkipReason};
use crate::types::{HealthStatus, RunningState};

/// Lists running service containers and submits one republish job per
/// container. Returns the number of jobs submitted.
pub async fn scan(dispatcher: &Dispatcher) -> Result<usize> {
    let reconciler = dispatcher.reconciler();
    let settings = reconciler.settings();
    let filter = settings.label_filter();

    info!("Processing existing containers");
    let containers = with_timeout(
        "list containers",
        settings.runtime_timeout,
        reconciler.runtime().list_containers(&filter),
    )
    .await?;

    let mut submitted = 0;
    for container in containers {
        if container.running_state != RunningState::Running {
            debug!("Skipping container {}: not running", container.id);
            continue;
        }
        if !dispatcher.submit(Job::Republish(container.id)).await {
            break;
        }
        submitted += 1;
    }
    info!("All existing containers have been processed ({} submitted)", submitted);
    Ok(submitted)
}

/// Publishes the record of `container_id` if it is a running, healthy
/// network service.
pub async fn republish(reconciler: &Reconciler, container_id: &str) -> Outcome {
    let Some(snapshot) = reconciler.inspect(container_id).await else {
        return Outcome::Skipped(SkipReason::InspectFailed);
    };
    if !reconciler.is_service(&snapshot) {
        return Outcome::Skipped(SkipReason::NotService);
    }
    if snapshot.running_state != RunningState::Running
        || snapshot.health_status != HealthStatus::Healthy
    {
        debug!("Container {} is not running and healthy yet", container_id);
        return Outcome::Skipped(SkipReason::NotReady);
    }
    reconciler.publish(&snapshot).await
}
