use crate::utils::misc::Typename;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.yml";

pub const DEFAULT_WHATSAT_TIMEOUT_SECS: f64 = 5.0;
pub const DEFAULT_PEER_QUEUE_BOUND: usize = 1024;

#[derive(Debug, thiserror::Error, strum_macros::IntoStaticStr)]
pub enum Error {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unknown member {name}, valid names: {known}")]
    UnknownMember { name: String, known: String },
    #[error("neighbor map is not symmetric: {a} lists {b} but not vice versa")]
    AsymmetricNeighbors { a: String, b: String },
    #[error("{context} references {name}, which is not in the servers map")]
    UnknownServer { context: String, name: String },
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

impl Typename for Error {
    fn typename(&self) -> &'static str {
        self.into()
    }
}

/// Startup configuration for the whole herd, loaded once from a YAML
/// document. A `benchmark` section may be present for the load tool;
/// the server ignores it.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// member name -> TCP port
    pub servers: BTreeMap<String, u16>,
    /// member name -> neighbor names (must be symmetric)
    #[serde(default)]
    pub neighbors: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_places_endpoint")]
    pub places_endpoint: String,
    #[serde(default = "default_whatsat_timeout")]
    pub whatsat_timeout: f64,
    #[serde(default = "default_peer_queue_bound")]
    pub peer_queue_bound: usize,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub filename: Option<String>,
    /// one of full | compact | json
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), filename: None, format: default_log_format() }
    }
}

fn default_places_endpoint() -> String {
    "https://maps.googleapis.com/maps/api/place/nearbysearch/json".to_string()
}

fn default_whatsat_timeout() -> f64 {
    DEFAULT_WHATSAT_TIMEOUT_SECS
}

fn default_peer_queue_bound() -> usize {
    DEFAULT_PEER_QUEUE_BOUND
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "full".to_string()
}

/// The immutable slice of the config one member actually runs on.
#[derive(Debug, Clone)]
pub struct MemberView {
    pub name: String,
    pub port: u16,
    /// neighbor (name, port) pairs, config order
    pub neighbors: Vec<(String, u16)>,
    pub api_key: String,
    pub places_endpoint: String,
    pub whatsat_timeout: Duration,
    pub peer_queue_bound: usize,
}

impl Config {
    pub async fn from_fs(path: Option<&Path>) -> Result<Self, Error> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_str(&text)
    }

    pub fn from_str(text: &str) -> Result<Self, Error> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.servers.is_empty() {
            return Err(Error::InvalidValue("servers map is empty".to_string()));
        }
        if !(self.whatsat_timeout > 0.0 && self.whatsat_timeout.is_finite()) {
            return Err(Error::InvalidValue(format!("whatsat_timeout {} must be positive", self.whatsat_timeout)));
        }
        if self.peer_queue_bound == 0 {
            return Err(Error::InvalidValue("peer_queue_bound must be positive".to_string()));
        }
        for (name, neighbors) in &self.neighbors {
            if !self.servers.contains_key(name) {
                return Err(Error::UnknownServer { context: "neighbors".to_string(), name: name.clone() });
            }
            for neighbor in neighbors {
                if !self.servers.contains_key(neighbor) {
                    return Err(Error::UnknownServer {
                        context: format!("neighbors of {}", name),
                        name: neighbor.clone(),
                    });
                }
                let reciprocal = self.neighbors.get(neighbor).map(|ns| ns.contains(name)).unwrap_or(false);
                if !reciprocal {
                    return Err(Error::AsymmetricNeighbors { a: name.clone(), b: neighbor.clone() });
                }
            }
        }
        Ok(())
    }

    pub fn valid_names(&self) -> String {
        self.servers.keys().cloned().collect::<Vec<_>>().join(", ")
    }

    /// Resolve the per-member view; fails before any socket is opened
    /// when the name is not in the servers map.
    pub fn member(&self, name: &str) -> Result<MemberView, Error> {
        let port = *self
            .servers
            .get(name)
            .ok_or_else(|| Error::UnknownMember { name: name.to_string(), known: self.valid_names() })?;
        let neighbors = self
            .neighbors
            .get(name)
            .map(|ns| ns.iter().map(|n| (n.clone(), self.servers[n])).collect())
            .unwrap_or_default();
        Ok(MemberView {
            name: name.to_string(),
            port,
            neighbors,
            api_key: self.api_key.clone(),
            places_endpoint: self.places_endpoint.clone(),
            whatsat_timeout: Duration::from_secs_f64(self.whatsat_timeout),
            peer_queue_bound: self.peer_queue_bound,
        })
    }
}
