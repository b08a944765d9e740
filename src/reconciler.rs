//! Event-driven reconciliation of DNS records.
//!
//! A container's record is never tracked in-process: every event is
//! decided from a fresh inspect of the container, so a record is either
//! written from the current snapshot or removed. Concurrent decisions for
//! the same container race on the store and the last write wins.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::config::{Config, IpSource};
use crate::error::with_timeout;
use crate::mapper;
use crate::runtime::ContainerRuntime;
use crate::store::RecordStore;
use crate::types::{ContainerSnapshot, EventAction, LifecycleEvent};

/// Knobs the reconciler needs from the configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub base_key: String,
    pub service_label: String,
    pub service_type: String,
    pub ip_source: IpSource,
    pub ip_interface: String,
    pub ip_network: Option<String>,
    pub runtime_timeout: Duration,
    pub exec_timeout: Duration,
    pub store_timeout: Duration,
}

impl From<&Config> for Settings {
    fn from(cfg: &Config) -> Self {
        Self {
            base_key: cfg.etcd_basekey.clone(),
            service_label: cfg.service_label.clone(),
            service_type: cfg.service_type.clone(),
            ip_source: cfg.ip_source,
            ip_interface: cfg.ip_interface.clone(),
            ip_network: cfg.ip_network.clone(),
            runtime_timeout: cfg.runtime_timeout(),
            exec_timeout: cfg.exec_timeout(),
            store_timeout: cfg.store_timeout(),
        }
    }
}

impl Settings {
    /// `key=value` filter selecting service containers.
    pub fn label_filter(&self) -> String {
        format!("{}={}", self.service_label, self.service_type)
    }
}

/// Why a reconciliation made no store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InspectFailed,
    NotService,
    NotReady,
    NoFqdn,
    NoIp,
}

/// Result of a single reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Published { key: String, value: String },
    Withdrawn { key: String },
    Skipped(SkipReason),
    Ignored,
    Failed { key: String, error: String },
}

pub struct Reconciler {
    runtime: Arc<dyn ContainerRuntime>,
    store: Arc<dyn RecordStore>,
    settings: Settings,
}

impl Reconciler {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        store: Arc<dyn RecordStore>,
        settings: Settings,
    ) -> Self {
        Self {
            runtime,
            store,
            settings,
        }
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Decides and applies the store mutation for one lifecycle event.
    pub async fn handle_event(&self, event: &LifecycleEvent) -> Outcome {
        if !event.is_container() {
            return Outcome::Ignored;
        }

        match event.action() {
            EventAction::Healthy => {
                let Some(snapshot) = self.inspect(&event.actor_id).await else {
                    return Outcome::Skipped(SkipReason::InspectFailed);
                };
                if !self.is_service(&snapshot) {
                    debug!("Container '{}' is not a network service", event.display_name());
                    return Outcome::Skipped(SkipReason::NotService);
                }
                info!("Container '{}' {}", event.display_name(), event.action);
                self.publish(&snapshot).await
            }
            // The label is not checked: a dead container may no longer
            // report it, and a stray delete is harmless.
            EventAction::Die => {
                info!("Container '{}' {}", event.display_name(), event.action);
                self.withdraw(&event.actor_id).await
            }
            EventAction::Other => Outcome::Ignored,
        }
    }

    pub fn is_service(&self, snapshot: &ContainerSnapshot) -> bool {
        snapshot.has_label(&self.settings.service_label, &self.settings.service_type)
    }

    /// Inspects a container. Failures are logged and yield `None`.
    pub async fn inspect(&self, container_id: &str) -> Option<ContainerSnapshot> {
        match with_timeout(
            "inspect",
            self.settings.runtime_timeout,
            self.runtime.inspect(container_id),
        )
        .await
        {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("Couldn't inspect container {}: {}", container_id, e);
                None
            }
        }
    }

    /// Writes the record for an already-admitted container.
    pub async fn publish(&self, snapshot: &ContainerSnapshot) -> Outcome {
        let Some(fqdn) = mapper::fqdn(&snapshot.hostname, &snapshot.domain_name) else {
            warn!(
                "Container {} has no valid FQDN ({:?}, {:?}), not adding record",
                snapshot.id, snapshot.hostname, snapshot.domain_name
            );
            return Outcome::Skipped(SkipReason::NoFqdn);
        };

        let ip = self.resolve_ip(snapshot).await;
        if ip.is_empty() {
            warn!("Container {} ({}) has no IP address, not adding record", snapshot.id, fqdn);
            return Outcome::Skipped(SkipReason::NoIp);
        }

        let key = mapper::dns_key(&fqdn, &self.settings.base_key);
        let value = match mapper::dns_value(&ip) {
            Ok(value) => value,
            Err(e) => {
                error!("Couldn't encode record for {}: {}", key, e);
                return Outcome::Failed {
                    key,
                    error: e.to_string(),
                };
            }
        };

        info!("Adding DNS record: {:?} -> {:?}", key, value);
        match with_timeout(
            "store set",
            self.settings.store_timeout,
            self.store.set(&key, &value),
        )
        .await
        {
            Ok(()) => Outcome::Published { key, value },
            Err(e) => {
                error!("Couldn't create key {}: {}", key, e);
                Outcome::Failed {
                    key,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Removes the record of a container, whatever its labels.
    pub async fn withdraw(&self, container_id: &str) -> Outcome {
        let Some(snapshot) = self.inspect(container_id).await else {
            return Outcome::Skipped(SkipReason::InspectFailed);
        };
        let Some(fqdn) = mapper::fqdn(&snapshot.hostname, &snapshot.domain_name) else {
            debug!("Container {} has no valid FQDN, nothing to remove", container_id);
            return Outcome::Skipped(SkipReason::NoFqdn);
        };

        let key = mapper::dns_key(&fqdn, &self.settings.base_key);
        info!("Removing DNS record: {:?} ({})", key, fqdn);
        match with_timeout(
            "store delete",
            self.settings.store_timeout,
            self.store.delete(&key),
        )
        .await
        {
            Ok(()) => Outcome::Withdrawn { key },
            Err(e) => {
                error!("Couldn't delete key {}: {}", key, e);
                Outcome::Failed {
                    key,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Container address according to the configured source; empty when
    /// unavailable.
    async fn resolve_ip(&self, snapshot: &ContainerSnapshot) -> String {
        match self.settings.ip_source {
            IpSource::Exec => match with_timeout(
                "exec",
                self.settings.exec_timeout,
                self.runtime
                    .container_ip(&snapshot.id, &self.settings.ip_interface),
            )
            .await
            {
                Ok(ip) => ip,
                Err(e) => {
                    warn!("Couldn't resolve IP of container {}: {}", snapshot.id, e);
                    String::new()
                }
            },
            IpSource::Network => snapshot
                .network_ip(self.settings.ip_network.as_deref())
                .unwrap_or_default(),
        }
    }
}
