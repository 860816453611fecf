//! Environment-driven configuration (spec §6). Loading/parsing the process
//! environment and CLI flags is explicitly out of scope (spec §1) beyond
//! this struct existing with sane defaults and a `from_env` constructor —
//! wiring it into a real bootstrap (leader election, health probes, pprof,
//! the HTTP server) is the out-of-scope collaborator's job.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub requeue_interval: Duration,
    /// `None` disables the timeout (spec: "0 disables").
    pub request_timeout: Option<Duration>,
    /// `None` disables TTL-driven deletion (spec: "default 0 = disabled").
    pub request_ttl: Option<Duration>,
    pub leader_election: bool,
    pub http2: bool,
    /// Address the out-of-scope bootstrap binds its health-probe endpoint
    /// to (spec §6's "health-probe address").
    pub health_probe_addr: String,
    /// `None` disables the pprof endpoint (spec §6's "pprof port").
    pub pprof_port: Option<u16>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            requeue_interval: Duration::from_secs(3 * 60),
            request_timeout: Some(Duration::from_secs(4 * 60 * 60)),
            request_ttl: None,
            leader_election: false,
            http2: false,
            health_probe_addr: "0.0.0.0:8081".to_string(),
            pprof_port: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub namespace: String,
    pub default_duration: Duration,
    pub kubeconfig_path: Option<String>,
    /// Port the out-of-scope HTTP layer listens on (spec §6's "listen port").
    pub listen_port: u16,
    /// Port the metrics endpoint is served on (spec §6's "metrics port").
    pub metrics_port: u16,
}

#[derive(Debug, Clone, Default)]
pub struct PluginConfig {
    /// Path to the plugin binary. Empty means no plugin (spec §6).
    pub binary_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub controller: ControllerConfig,
    pub backend: BackendConfig,
    pub plugin: PluginConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingRequired(&'static str),
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        let level = match std::env::var("LEVEL").ok().as_deref() {
            None | Some("info") => LogLevel::Info,
            Some("debug") => LogLevel::Debug,
            Some("error") => LogLevel::Error,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "LEVEL",
                    value: other.to_string(),
                })
            }
        };
        let format = match std::env::var("FORMAT").ok().as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "FORMAT",
                    value: other.to_string(),
                })
            }
        };

        let requeue_interval = parse_secs_env("REQUEUE_INTERVAL_SECONDS", 3 * 60)?;
        let request_timeout = parse_optional_secs_env("REQUEST_TIMEOUT_SECONDS", 4 * 60 * 60)?;
        let request_ttl = parse_optional_secs_env("REQUEST_TTL_SECONDS", 0)?;
        let leader_election = std::env::var("LEADER_ELECTION")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        let http2 = std::env::var("HTTP2").map(|v| v == "true" || v == "1").unwrap_or(false);
        let health_probe_addr =
            std::env::var("HEALTH_PROBE_ADDR").unwrap_or_else(|_| "0.0.0.0:8081".to_string());
        let pprof_port = parse_optional_port_env("PPROF_PORT", 0)?;

        let namespace = std::env::var("NAMESPACE").map_err(|_| ConfigError::MissingRequired("NAMESPACE"))?;
        let default_duration = parse_secs_env("DEFAULT_ACCESS_DURATION_SECONDS", 4 * 60 * 60)?;
        let kubeconfig_path = std::env::var("KUBECONFIG").ok().filter(|s| !s.is_empty());
        let listen_port = parse_port_env("LISTEN_PORT", 8080)?;
        let metrics_port = parse_port_env("METRICS_PORT", 9090)?;

        let binary_path = std::env::var("PLUGIN_PATH").ok().filter(|s| !s.is_empty());

        Ok(Config {
            logging: LoggingConfig { level, format },
            controller: ControllerConfig {
                requeue_interval,
                request_timeout,
                request_ttl,
                leader_election,
                http2,
                health_probe_addr,
                pprof_port,
            },
            backend: BackendConfig {
                namespace,
                default_duration,
                kubeconfig_path,
                listen_port,
                metrics_port,
            },
            plugin: PluginConfig { binary_path },
        })
    }
}

fn parse_port_env(name: &'static str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(name) {
        Ok(v) => v.parse::<u16>().map_err(|_| ConfigError::InvalidValue { name, value: v }),
        Err(_) => Ok(default),
    }
}

fn parse_optional_port_env(name: &'static str, default: u16) -> Result<Option<u16>, ConfigError> {
    let port = parse_port_env(name, default)?;
    Ok(if port == 0 { None } else { Some(port) })
}

fn parse_secs_env(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(v) => v
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidValue { name, value: v }),
        Err(_) => Ok(Duration::from_secs(default)),
    }
}

fn parse_optional_secs_env(name: &'static str, default: u64) -> Result<Option<Duration>, ConfigError> {
    let secs = parse_secs_env(name, default)?;
    Ok(if secs.as_secs() == 0 { None } else { Some(secs) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_means_disabled_for_timeout_and_ttl() {
        assert_eq!(parse_optional_secs_env("UNSET_ENV_FOR_TEST_ABC", 0).unwrap(), None);
    }
}
