use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarMissing(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

pub const AISSTREAM_API_KEY_VAR: &str = "AISSTREAM_API_KEY";
pub const POLL_API_KEY_VAR: &str = "POLL_API_KEY";
pub const BIND_ADDR_VAR: &str = "RELAY_BIND_ADDR";
pub const LOG_LEVEL_VAR: &str = "LOG_LEVEL";

const VALID_LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Upper bound for `cache_max_age_secs` (30 days)
pub const MAX_CACHE_AGE_SECS: u64 = 30 * 24 * 3600;

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub aisstream: AisStreamConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub mock: MockConfig,
    #[serde(default)]
    pub relay: RelayServerConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    /// Positions older than this are evicted from the cache
    #[serde(default = "default_cache_max_age")]
    pub cache_max_age_secs: u64,
}

/// Rectangle in degrees, as aisstream.io expects it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub const WORLD: BoundingBox = BoundingBox {
        min_lat: -90.0,
        min_lon: -180.0,
        max_lat: 90.0,
        max_lon: 180.0,
    };

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&latitude)
            && (self.min_lon..=self.max_lon).contains(&longitude)
    }

    /// `[[lat, lon], [lat, lon]]` corner pair
    pub fn corners(&self) -> [[f64; 2]; 2] {
        [[self.min_lat, self.min_lon], [self.max_lat, self.max_lon]]
    }

    fn validate(&self, name: &str) -> Result<()> {
        let lat_ok = (-90.0..=90.0).contains(&self.min_lat) && (-90.0..=90.0).contains(&self.max_lat);
        let lon_ok =
            (-180.0..=180.0).contains(&self.min_lon) && (-180.0..=180.0).contains(&self.max_lon);
        if !lat_ok || !lon_ok {
            return Err(ConfigError::ValidationError(format!(
                "{}: coordinates out of range",
                name
            )));
        }
        if self.min_lat >= self.max_lat || self.min_lon >= self.max_lon {
            return Err(ConfigError::ValidationError(format!(
                "{}: min corner must be south-west of max corner",
                name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AisStreamConfig {
    #[serde(default = "default_ais_url")]
    pub url: String,
    #[serde(default = "default_bounding_boxes")]
    pub bounding_boxes: Vec<BoundingBox>,
    /// Restrict to these MMSIs (empty = all)
    #[serde(default)]
    pub mmsi_filter: Vec<u32>,
    #[serde(default = "default_message_types")]
    pub message_types: Vec<String>,
    /// Reconnect when the stream is silent this long
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    #[serde(default = "default_reconnect_max_secs")]
    pub reconnect_max_secs: u64,

    /// From AISSTREAM_API_KEY (not in YAML)
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for AisStreamConfig {
    fn default() -> Self {
        Self {
            url: default_ais_url(),
            bounding_boxes: default_bounding_boxes(),
            mmsi_filter: Vec::new(),
            message_types: default_message_types(),
            idle_timeout_secs: default_idle_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_secs: default_reconnect_max_secs(),
            api_key: None,
        }
    }
}

impl AisStreamConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// HTTP endpoint returning current positions (unset = no fallback)
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_poll_timeout")]
    pub timeout_secs: u64,

    /// From POLL_API_KEY (not in YAML)
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            url: None,
            interval_secs: default_poll_interval(),
            timeout_secs: default_poll_timeout(),
            api_key: None,
        }
    }
}

impl PollerConfig {
    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockConfig {
    /// Generate synthetic traffic when no API key is available
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_mock_vessels")]
    pub vessel_count: usize,
    #[serde(default = "default_mock_seed")]
    pub seed: u64,
    #[serde(default = "default_mock_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_mock_area")]
    pub area: BoundingBox,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            vessel_count: default_mock_vessels(),
            seed: default_mock_seed(),
            interval_ms: default_mock_interval_ms(),
            area: default_mock_area(),
        }
    }
}

impl MockConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Updates buffered per pub/sub group before slow clients lag
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_clients: default_max_clients(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Stream outage length that switches to the poller
    #[serde(default = "default_failover_after")]
    pub failover_after_secs: u64,
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            failover_after_secs: default_failover_after(),
            check_interval_ms: default_check_interval_ms(),
        }
    }
}

impl SupervisorConfig {
    pub fn failover_after(&self) -> Duration {
        Duration::from_secs(self.failover_after_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            aisstream: AisStreamConfig::default(),
            poller: PollerConfig::default(),
            mock: MockConfig::default(),
            relay: RelayServerConfig::default(),
            supervisor: SupervisorConfig::default(),
            log_level: default_log_level(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            cache_max_age_secs: default_cache_max_age(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_heartbeat_interval() -> u64 {
    60
}

fn default_cache_max_age() -> u64 {
    3600
}

fn default_ais_url() -> String {
    "wss://stream.aisstream.io/v0/stream".to_string()
}

fn default_bounding_boxes() -> Vec<BoundingBox> {
    vec![BoundingBox::WORLD]
}

fn default_message_types() -> Vec<String> {
    [
        "PositionReport",
        "StandardClassBPositionReport",
        "ExtendedClassBPositionReport",
        "ShipStaticData",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_reconnect_initial_ms() -> u64 {
    1000
}

fn default_reconnect_max_secs() -> u64 {
    60
}

fn default_poll_interval() -> u64 {
    30
}

fn default_poll_timeout() -> u64 {
    10
}

fn default_mock_vessels() -> usize {
    25
}

fn default_mock_seed() -> u64 {
    42
}

fn default_mock_interval_ms() -> u64 {
    1000
}

fn default_mock_area() -> BoundingBox {
    // English Channel
    BoundingBox {
        min_lat: 49.5,
        min_lon: -5.0,
        max_lat: 51.2,
        max_lon: 1.8,
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8765".to_string()
}

fn default_max_clients() -> usize {
    256
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_failover_after() -> u64 {
    30
}

fn default_check_interval_ms() -> u64 {
    250
}

impl RelayConfig {
    /// Load from a YAML file, apply environment overrides, validate
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config = Self::from_yaml(&yaml_content)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse without overrides or validation
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Apply secrets and overrides from `lookup` (normally the environment)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(AISSTREAM_API_KEY_VAR) {
            self.aisstream.api_key = Some(key);
        }
        if let Some(key) = non_empty(POLL_API_KEY_VAR) {
            self.poller.api_key = Some(key);
        }
        if let Some(addr) = non_empty(BIND_ADDR_VAR) {
            info!("Overriding relay bind address from environment variable");
            self.relay.bind_addr = addr;
        }
        if let Some(level) = non_empty(LOG_LEVEL_VAR) {
            self.log_level = level;
        }
    }

    pub fn has_stream_credentials(&self) -> bool {
        self.aisstream.api_key.is_some()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.has_stream_credentials() && !self.mock.enabled {
            return Err(ConfigError::EnvVarMissing(format!(
                "{} (or enable the mock feed)",
                AISSTREAM_API_KEY_VAR
            )));
        }

        if !(self.aisstream.url.starts_with("ws://") || self.aisstream.url.starts_with("wss://")) {
            return Err(ConfigError::ValidationError(
                "aisstream.url must start with ws:// or wss://".to_string(),
            ));
        }
        if self.aisstream.bounding_boxes.is_empty() {
            return Err(ConfigError::ValidationError(
                "aisstream.bounding_boxes must not be empty".to_string(),
            ));
        }
        for (i, bbox) in self.aisstream.bounding_boxes.iter().enumerate() {
            bbox.validate(&format!("aisstream.bounding_boxes[{}]", i))?;
        }
        if self.aisstream.idle_timeout_secs == 0 || self.aisstream.connect_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "aisstream timeouts must be greater than 0".to_string(),
            ));
        }

        if let Some(url) = &self.poller.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::ValidationError(
                    "poller.url must start with http:// or https://".to_string(),
                ));
            }
            if self.poller.interval_secs == 0 || self.poller.timeout_secs == 0 {
                return Err(ConfigError::ValidationError(
                    "poller.interval_secs and poller.timeout_secs must be greater than 0"
                        .to_string(),
                ));
            }
        }

        if self.mock.enabled {
            if self.mock.vessel_count == 0 || self.mock.interval_ms == 0 {
                return Err(ConfigError::ValidationError(
                    "mock.vessel_count and mock.interval_ms must be greater than 0".to_string(),
                ));
            }
            self.mock.area.validate("mock.area")?;
        }

        if self.relay.max_clients == 0 || self.relay.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "relay.max_clients and relay.channel_capacity must be greater than 0".to_string(),
            ));
        }
        if self.supervisor.failover_after_secs == 0 || self.supervisor.check_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "supervisor intervals must be greater than 0".to_string(),
            ));
        }

        if self.cache_max_age_secs == 0 || self.cache_max_age_secs > MAX_CACHE_AGE_SECS {
            return Err(ConfigError::ValidationError(format!(
                "cache_max_age_secs must be between 1 and {}",
                MAX_CACHE_AGE_SECS
            )));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  AIS stream: {}", self.aisstream.url);
        info!("  API key: {}", mask_secret(self.aisstream.api_key.as_deref()));
        info!("  Bounding boxes: {}", self.aisstream.bounding_boxes.len());
        info!("  Idle timeout: {}s", self.aisstream.idle_timeout_secs);
        match &self.poller.url {
            Some(url) => info!("  Poll fallback: {} every {}s", url, self.poller.interval_secs),
            None => info!("  Poll fallback: disabled"),
        }
        info!(
            "  Mock feed: {}",
            if self.mock.enabled { "enabled" } else { "disabled" }
        );
        info!(
            "  Relay: {} (max {} clients)",
            self.relay.bind_addr, self.relay.max_clients
        );
        info!("  Failover after: {}s", self.supervisor.failover_after_secs);
        info!("  Log level: {}", self.log_level);
    }
}

/// First four characters, the rest starred
pub fn mask_secret(secret: Option<&str>) -> String {
    match secret {
        None => "<not set>".to_string(),
        Some(s) if s.chars().count() <= 4 => "****".to_string(),
        Some(s) => format!("{}****", s.chars().take(4).collect::<String>()),
    }
}
