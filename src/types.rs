//! Data structures shared by the runtime adapter, the reconciler and the
//! bootstrap scanner.
//!
//! Snapshots are read on demand from the container runtime and never
//! cached: every reconciliation decision works from a fresh copy.

use std::collections::HashMap;

/// Action string the runtime emits when a health check starts passing.
pub const ACTION_HEALTHY: &str = "health_status: healthy";
/// Action string the runtime emits when a container's main process exits.
pub const ACTION_DIE: &str = "die";
/// Event type that carries container lifecycle actions.
pub const KIND_CONTAINER: &str = "container";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningState {
    Running,
    Stopped,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    None,
}

/// Point-in-time view of a container, as returned by inspect.
#[derive(Debug, Clone)]
pub struct ContainerSnapshot {
    pub id: String,
    pub hostname: String,
    pub domain_name: String,
    pub labels: HashMap<String, String>,
    pub running_state: RunningState,
    pub health_status: HealthStatus,
    /// Network name -> IP address, from the runtime's network settings.
    pub networks: HashMap<String, String>,
}

impl ContainerSnapshot {
    /// True when `labels[key] == value`.
    pub fn has_label(&self, key: &str, value: &str) -> bool {
        self.labels.get(key).map(String::as_str) == Some(value)
    }

    /// Address on `network`, or on the first network with a non-empty
    /// address (sorted by name) when no network is given.
    pub fn network_ip(&self, network: Option<&str>) -> Option<String> {
        match network {
            Some(name) => self.networks.get(name).filter(|ip| !ip.is_empty()).cloned(),
            None => {
                let mut names: Vec<&String> = self.networks.keys().collect();
                names.sort();
                names
                    .into_iter()
                    .filter_map(|n| self.networks.get(n))
                    .find(|ip| !ip.is_empty())
                    .cloned()
            }
        }
    }
}

/// Entry from a filtered container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub running_state: RunningState,
}

/// A single event from the runtime's event stream.
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    pub kind: String,
    pub action: String,
    pub actor_id: String,
    pub actor_name: String,
}

/// Actions the reconciler reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    Healthy,
    Die,
    Other,
}

impl LifecycleEvent {
    pub fn is_container(&self) -> bool {
        self.kind == KIND_CONTAINER
    }

    pub fn action(&self) -> EventAction {
        match self.action.as_str() {
            ACTION_HEALTHY => EventAction::Healthy,
            ACTION_DIE => EventAction::Die,
            _ => EventAction::Other,
        }
    }

    /// Name used in log lines; falls back to the id for unnamed actors.
    pub fn display_name(&self) -> &str {
        if self.actor_name.is_empty() {
            &self.actor_id
        } else {
            &self.actor_name
        }
    }
}
