use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where a container's address comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IpSource {
    /// Run `ifconfig` inside the container.
    Exec,
    /// Read the address from the runtime's network settings.
    Network,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_endpoint: Option<String>,
    pub etcd_endpoint: String,
    pub etcd_basekey: String,
    pub service_label: String,
    pub service_type: String,
    pub ip_source: IpSource,
    pub ip_interface: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_network: Option<String>,
    pub runtime_timeout_secs: u64,
    pub exec_timeout_secs: u64,
    pub store_timeout_secs: u64,
    pub max_in_flight: usize,
    pub event_buffer: usize,
    pub shutdown_grace_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docker_endpoint: None,
            etcd_endpoint: "http://127.0.0.1:2379".into(),
            etcd_basekey: "/skydns/".into(),
            service_label: "bigboat.service.type".into(),
            service_type: "net".into(),
            ip_source: IpSource::Exec,
            ip_interface: "eth0".into(),
            ip_network: None,
            runtime_timeout_secs: 10,
            exec_timeout_secs: 5,
            store_timeout_secs: 5,
            max_in_flight: 64,
            event_buffer: 1024,
            shutdown_grace_secs: 10,
        }
    }
}

impl Config {
    /// Layered sources, lowest priority first.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("skyhook.toml"))
            .merge(Json::file("skyhook.json"))
            // Variable names understood by earlier deployments
            .merge(Env::raw().only(&["DOCKER_ENDPOINT", "ETCD_ENDPOINT", "ETCD_BASEKEY"]))
            .merge(Env::prefixed("SKYHOOK_"))
    }

    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(Self::figment())
    }

    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let mut config: Config = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        // An empty endpoint means "use the local socket"
        if config.docker_endpoint.as_deref().map(str::trim) == Some("") {
            config.docker_endpoint = None;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let positive = [
            ("runtime_timeout_secs", self.runtime_timeout_secs as usize),
            ("exec_timeout_secs", self.exec_timeout_secs as usize),
            ("store_timeout_secs", self.store_timeout_secs as usize),
            ("max_in_flight", self.max_in_flight),
            ("event_buffer", self.event_buffer),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(invalid(format!("{} must be greater than 0", name)));
            }
        }
        if self.service_label.trim().is_empty() {
            return Err(invalid("service_label must not be empty".into()));
        }
        if self.etcd_endpoint.trim().is_empty() {
            return Err(invalid("etcd_endpoint must not be empty".into()));
        }
        // Interpolated into a shell command inside the container
        let iface_ok = !self.ip_interface.is_empty()
            && self
                .ip_interface
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
        if !iface_ok {
            return Err(invalid(format!("invalid ip_interface {:?}", self.ip_interface)));
        }
        Ok(())
    }

    pub fn runtime_timeout(&self) -> Duration {
        Duration::from_secs(self.runtime_timeout_secs)
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn invalid(msg: String) -> anyhow::Error {
    crate::error::Error::Config(msg).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_toml(toml: &str) -> anyhow::Result<Config> {
        Config::from_figment(
            Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(toml)),
        )
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = with_toml("").unwrap();
        assert_eq!(cfg.docker_endpoint, None);
        assert_eq!(cfg.etcd_basekey, "/skydns/");
        assert_eq!(cfg.ip_source, IpSource::Exec);
        assert_eq!(cfg.service_label, "bigboat.service.type");
        assert_eq!(cfg.service_type, "net");
        assert_eq!(cfg.exec_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn file_values_override_defaults() {
        let cfg = with_toml(
            r#"
            docker_endpoint = "unix:///var/run/docker.sock"
            etcd_endpoint = "http://etcd:2379"
            etcd_basekey = "/dns/"
            ip_source = "network"
            ip_network = "backend"
            max_in_flight = 8
            "#,
        )
        .unwrap();
        assert_eq!(cfg.docker_endpoint.as_deref(), Some("unix:///var/run/docker.sock"));
        assert_eq!(cfg.etcd_endpoint, "http://etcd:2379");
        assert_eq!(cfg.etcd_basekey, "/dns/");
        assert_eq!(cfg.ip_source, IpSource::Network);
        assert_eq!(cfg.ip_network.as_deref(), Some("backend"));
        assert_eq!(cfg.max_in_flight, 8);
    }

    #[test]
    fn blank_docker_endpoint_means_local() {
        let cfg = with_toml(r#"docker_endpoint = "  ""#).unwrap();
        assert_eq!(cfg.docker_endpoint, None);
    }

    #[test]
    fn zero_limits_are_rejected() {
        assert!(with_toml("exec_timeout_secs = 0").is_err());
        assert!(with_toml("max_in_flight = 0").is_err());
        assert!(with_toml("event_buffer = 0").is_err());
        assert!(with_toml(r#"service_label = """#).is_err());
    }

    #[test]
    fn shell_metacharacters_in_interface_are_rejected() {
        assert!(with_toml(r#"ip_interface = "eth0; rm -rf /""#).is_err());
        assert!(with_toml(r#"ip_interface = """#).is_err());
        assert!(with_toml(r#"ip_interface = "eth0.100""#).is_ok());
    }

    #[test]
    fn unknown_ip_source_is_rejected() {
        assert!(with_toml(r#"ip_source = "dhcp""#).is_err());
    }
}
