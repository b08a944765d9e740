//! In-memory collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::config::IpSource;
use crate::error::{Error, Result};
use crate::reconciler::Settings;
use crate::runtime::ContainerRuntime;
use crate::store::RecordStore;
use crate::types::{
    ContainerSnapshot, ContainerSummary, HealthStatus, LifecycleEvent, RunningState,
};

pub fn settings() -> Settings {
    Settings {
        base_key: "/dns/".into(),
        service_label: "bigboat.service.type".into(),
        service_type: "net".into(),
        ip_source: IpSource::Exec,
        ip_interface: "eth0".into(),
        ip_network: None,
        runtime_timeout: Duration::from_millis(200),
        exec_timeout: Duration::from_millis(100),
        store_timeout: Duration::from_millis(100),
    }
}

/// A running, healthy container labeled as a network service.
pub fn net_service(id: &str, hostname: &str, domain_name: &str) -> ContainerSnapshot {
    ContainerSnapshot {
        id: id.into(),
        hostname: hostname.into(),
        domain_name: domain_name.into(),
        labels: HashMap::from([("bigboat.service.type".to_string(), "net".to_string())]),
        running_state: RunningState::Running,
        health_status: HealthStatus::Healthy,
        networks: HashMap::new(),
    }
}

pub fn event(action: &str, actor_id: &str) -> LifecycleEvent {
    LifecycleEvent {
        kind: "container".into(),
        action: action.into(),
        actor_id: actor_id.into(),
        actor_name: format!("{}-name", actor_id),
    }
}

#[derive(Default)]
pub struct FakeRuntime {
    containers: HashMap<String, ContainerSnapshot>,
    ips: HashMap<String, String>,
    hang_exec: bool,
    hang_inspect: Vec<String>,
    hang_list: bool,
    streams: Mutex<VecDeque<Vec<Result<LifecycleEvent>>>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, snapshot: ContainerSnapshot, ip: &str) -> Self {
        self.ips.insert(snapshot.id.clone(), ip.to_string());
        self.containers.insert(snapshot.id.clone(), snapshot);
        self
    }

    pub fn hang_exec(mut self) -> Self {
        self.hang_exec = true;
        self
    }

    /// Inspect of `id` never completes.
    pub fn hang_inspect(mut self, id: &str) -> Self {
        self.hang_inspect.push(id.to_string());
        self
    }

    /// Listing never completes.
    pub fn hang_list(mut self) -> Self {
        self.hang_list = true;
        self
    }

    /// Queues a stream that yields `events` and then ends. Each call to
    /// `events()` takes the next queued stream; once the queue is empty
    /// the stream stays open without yielding.
    pub fn with_events(self, events: Vec<LifecycleEvent>) -> Self {
        self.streams
            .lock()
            .unwrap()
            .push_back(events.into_iter().map(Ok).collect());
        self
    }

    /// Queues a stream that fails straight away.
    pub fn with_stream_error(self) -> Self {
        self.streams.lock().unwrap().push_back(vec![Err(Error::Docker(
            bollard::errors::Error::DockerResponseServerError {
                status_code: 500,
                message: "event stream reset".into(),
            },
        ))]);
        self
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn inspect(&self, container_id: &str) -> Result<ContainerSnapshot> {
        if self.hang_inspect.iter().any(|id| id == container_id) {
            std::future::pending::<()>().await;
        }
        self.containers
            .get(container_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(container_id.to_string()))
    }

    async fn list_containers(&self, label_filter: &str) -> Result<Vec<ContainerSummary>> {
        if self.hang_list {
            std::future::pending::<()>().await;
        }
        let (key, value) = label_filter.split_once('=').unwrap_or((label_filter, ""));
        let mut found: Vec<ContainerSummary> = self
            .containers
            .values()
            .filter(|c| c.has_label(key, value))
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                running_state: c.running_state,
            })
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn container_ip(&self, container_id: &str, _interface: &str) -> Result<String> {
        if self.hang_exec {
            std::future::pending::<()>().await;
        }
        Ok(self.ips.get(container_id).cloned().unwrap_or_default())
    }

    fn events(&self) -> BoxStream<'static, Result<LifecycleEvent>> {
        match self.streams.lock().unwrap().pop_front() {
            Some(items) => stream::iter(items).boxed(),
            None => stream::pending::<Result<LifecycleEvent>>().boxed(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Set(String, String),
    Delete(String),
}

#[derive(Default, Clone, Copy, PartialEq, Eq)]
enum Mode {
    #[default]
    Ok,
    Fail,
    Hang,
}

#[derive(Default)]
pub struct FakeStore {
    mode: Mode,
    calls: Mutex<Vec<StoreCall>>,
    data: Mutex<HashMap<String, String>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            mode: Mode::Fail,
            ..Self::default()
        }
    }

    pub fn hanging() -> Self {
        Self {
            mode: Mode::Hang,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.data.lock().unwrap().get(key).cloned()
    }

    async fn apply(&self, call: StoreCall) -> Result<()> {
        self.calls.lock().unwrap().push(call.clone());
        match self.mode {
            Mode::Ok => {}
            Mode::Fail => {
                return Err(Error::Etcd(etcd_client::Error::InvalidArgs(
                    "store unreachable".into(),
                )))
            }
            Mode::Hang => std::future::pending::<()>().await,
        }
        let mut data = self.data.lock().unwrap();
        match call {
            StoreCall::Set(key, value) => {
                data.insert(key, value);
            }
            StoreCall::Delete(key) => {
                data.remove(&key);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FakeStore {
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.apply(StoreCall::Set(key.to_string(), value.to_string())).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.apply(StoreCall::Delete(key.to_string())).await
    }
}
