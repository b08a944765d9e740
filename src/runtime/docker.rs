use super::ContainerRuntime;
use crate::error::{Error, Result};
use crate::types::{
    ContainerSnapshot, ContainerSummary, HealthStatus, LifecycleEvent, RunningState,
};
use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, ListContainersOptions, LogOutput};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::{
    ContainerInspectResponse, ContainerStateStatusEnum, EventMessage, HealthStatusEnum,
};
use bollard::system::EventsOptions;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::stream::{BoxStream, StreamExt};
use log::{debug, info};
use std::collections::HashMap;

/// Request timeout handed to the Docker client, in seconds.
const CLIENT_TIMEOUT_SECS: u64 = 120;

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Builds a client for `endpoint`, or for the local daemon when none
    /// is configured. `unix://` endpoints use the socket, anything else
    /// (`tcp://`, `http://`) goes over HTTP.
    pub fn connect(endpoint: Option<&str>) -> Result<Self> {
        let docker = match endpoint {
            None => Docker::connect_with_local_defaults()?,
            Some(addr) if addr.starts_with("unix://") => {
                Docker::connect_with_unix(addr, CLIENT_TIMEOUT_SECS, API_DEFAULT_VERSION)?
            }
            Some(addr) => {
                Docker::connect_with_http(addr, CLIENT_TIMEOUT_SECS, API_DEFAULT_VERSION)?
            }
        };
        info!(
            "Docker client connected to: {}",
            endpoint.unwrap_or("local defaults")
        );
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn inspect(&self, container_id: &str) -> Result<ContainerSnapshot> {
        match self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(detail) => Ok(snapshot_from(container_id, detail)),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(Error::NotFound(container_id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_containers(&self, label_filter: &str) -> Result<Vec<ContainerSummary>> {
        let opts = ListContainersOptions::<String> {
            all: false,
            filters: HashMap::from([("label".to_string(), vec![label_filter.to_string()])]),
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(opts)).await?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let running_state = match c.state.as_deref() {
                    Some("running") => RunningState::Running,
                    Some("exited") | Some("dead") => RunningState::Stopped,
                    _ => RunningState::Other,
                };
                Some(ContainerSummary { id, running_state })
            })
            .collect())
    }

    async fn container_ip(&self, container_id: &str, interface: &str) -> Result<String> {
        let script = format!(
            "ifconfig {} | grep 'inet addr:' | cut -d: -f2 | awk '{{ print $1}}'",
            interface
        );
        let exec = self
            .docker
            .create_exec(
                container_id,
                CreateExecOptions {
                    attach_stdin: Some(false),
                    attach_stdout: Some(true),
                    attach_stderr: Some(false),
                    tty: Some(false),
                    cmd: Some(vec!["sh".to_string(), "-c".to_string(), script]),
                    ..Default::default()
                },
            )
            .await?;

        let mut stdout = String::new();
        if let StartExecResults::Attached { mut output, .. } =
            self.docker.start_exec(&exec.id, None).await?
        {
            while let Some(chunk) = output.next().await {
                if let LogOutput::StdOut { message } = chunk? {
                    stdout.push_str(&String::from_utf8_lossy(&message));
                }
            }
        }

        let ip = stdout.trim_matches('\n').to_string();
        debug!("Exec on {} reported address {:?}", container_id, ip);
        Ok(ip)
    }

    fn events(&self) -> BoxStream<'static, Result<LifecycleEvent>> {
        let opts = EventsOptions::<String> {
            filters: HashMap::from([("type".to_string(), vec!["container".to_string()])]),
            ..Default::default()
        };
        self.docker
            .events(Some(opts))
            .map(|msg| msg.map(lifecycle_event).map_err(Error::from))
            .boxed()
    }
}

fn snapshot_from(container_id: &str, detail: ContainerInspectResponse) -> ContainerSnapshot {
    let config = detail.config.unwrap_or_default();
    let state = detail.state.unwrap_or_default();

    let running_state = match state.status {
        Some(ContainerStateStatusEnum::RUNNING) => RunningState::Running,
        Some(ContainerStateStatusEnum::EXITED) | Some(ContainerStateStatusEnum::DEAD) => {
            RunningState::Stopped
        }
        _ => RunningState::Other,
    };
    let health_status = match state.health.and_then(|h| h.status) {
        Some(HealthStatusEnum::HEALTHY) => HealthStatus::Healthy,
        Some(HealthStatusEnum::UNHEALTHY) => HealthStatus::Unhealthy,
        _ => HealthStatus::None,
    };

    let networks = detail
        .network_settings
        .and_then(|s| s.networks)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, endpoint)| {
            let ipv4 = endpoint.ip_address.filter(|ip| !ip.is_empty());
            let ipv6 = endpoint.global_ipv6_address.filter(|ip| !ip.is_empty());
            ipv4.or(ipv6).map(|ip| (name, ip))
        })
        .collect();

    ContainerSnapshot {
        id: detail.id.unwrap_or_else(|| container_id.to_string()),
        hostname: config.hostname.unwrap_or_default(),
        domain_name: config.domainname.unwrap_or_default(),
        labels: config.labels.unwrap_or_default(),
        running_state,
        health_status,
        networks,
    }
}

fn lifecycle_event(event: EventMessage) -> LifecycleEvent {
    let actor = event.actor.unwrap_or_default();
    let attributes = actor.attributes.unwrap_or_default();
    LifecycleEvent {
        kind: event.typ.map(|t| t.to_string()).unwrap_or_default(),
        action: event.action.unwrap_or_default(),
        actor_id: actor.id.unwrap_or_default(),
        actor_name: attributes.get("name").cloned().unwrap_or_default(),
    }
}
