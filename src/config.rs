use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::ConfigError;

pub const DEFAULT_INTERVAL_MINUTES: u64 = 5;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default)]
    pub servers: Vec<Host>,
    #[serde(default = "default_broadcast_ip")]
    pub broadcast_ip: String,
    /// Minutes between sweeps. Zero or negative falls back to the default.
    #[serde(default)]
    pub monitoring_interval: i64,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_api_bind")]
    pub api_bind: IpAddr,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub admin_chat_id: i64,
}

fn default_broadcast_ip() -> String { "255.255.255.255".into() }
fn default_api_bind() -> IpAddr { IpAddr::V4(Ipv4Addr::LOCALHOST) }
fn default_api_port() -> u16 { 3000 }
fn default_max_concurrency() -> usize { 32 }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Host {
    pub name: String,
    pub mac_address: String,
    #[serde(default, deserialize_with = "optional_ipv4", skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tcp_ports: Vec<u16>,
}

impl Host {
    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

fn optional_ipv4<'de, D>(deserializer: D) -> Result<Option<Ipv4Addr>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => text
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid IPv4 address '{}'", text))),
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        let minutes = if self.monitoring_interval > 0 {
            self.monitoring_interval as u64
        } else {
            DEFAULT_INTERVAL_MINUTES
        };
        Duration::from_secs(minutes * 60)
    }

    pub fn find_host(&self, name: &str) -> Option<&Host> {
        self.servers.iter().find(|host| host.matches(name))
    }

    /// Hosts that take part in monitoring, in configuration order.
    pub fn monitored_hosts(&self) -> impl Iterator<Item = (&Host, Ipv4Addr)> {
        self.servers
            .iter()
            .filter_map(|host| host.ip_address.map(|ip| (host, ip)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// YAML first, JSON as a fallback.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        match serde_yaml::from_str::<Self>(content) {
            Ok(config) => Ok(config),
            Err(yaml_err) => serde_json::from_str::<Self>(content).map_err(|json_err| {
                ConfigError::Parse {
                    yaml: yaml_err.to_string(),
                    json: json_err.to_string(),
                }
            }),
        }
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("WAKEWATCH_BOT_TOKEN").filter(|v| !v.is_empty()) {
            self.telegram.get_or_insert_with(TelegramConfig::default).bot_token = token;
            info!("Using bot token from WAKEWATCH_BOT_TOKEN environment variable");
        }

        if let Some(raw) = lookup("WAKEWATCH_ADMIN_CHAT_ID").filter(|v| !v.is_empty()) {
            match raw.parse::<i64>() {
                Ok(chat_id) => {
                    self.telegram.get_or_insert_with(TelegramConfig::default).admin_chat_id = chat_id;
                    info!("Using admin chat ID from WAKEWATCH_ADMIN_CHAT_ID environment variable");
                }
                Err(_) => warn!("Invalid WAKEWATCH_ADMIN_CHAT_ID format: {} (must be a number)", raw),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for host in &self.servers {
            if host.name.trim().is_empty() {
                return Err(ConfigError::Invalid("server with empty name".into()));
            }
            if host.name.trim().eq_ignore_ascii_case("all") {
                return Err(ConfigError::Invalid("server name 'all' is reserved for batch commands".into()));
            }
            if !seen.insert(host.name.to_ascii_lowercase()) {
                return Err(ConfigError::Invalid(format!("duplicate server name '{}'", host.name)));
            }
        }
        if self.broadcast_ip.trim().is_empty() {
            return Err(ConfigError::Invalid("broadcast_ip must not be empty".into()));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid("max_concurrency must be at least 1".into()));
        }
        Ok(())
    }
}
