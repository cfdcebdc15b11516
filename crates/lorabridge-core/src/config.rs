/*!
 * Configuration management for LoRaBridge.
 *
 * This module provides functionality to load, validate, and access configuration
 * settings for the gateway: radio pacing, MQTT broker access, queue sizing and
 * the optional device catalog override.
 */
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Core configuration for LoRaBridge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Radio link configuration
    #[serde(default)]
    pub radio: RadioConfig,

    /// MQTT broker configuration
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Gateway behaviour configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Application environment (development, production, etc.)
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, "lorabridge_gateway=debug", ...)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to print the event target alongside each line
    #[serde(default = "default_show_target")]
    pub show_target: bool,
}

/// Radio link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioConfig {
    /// Which transport carries packets: "udp" (modem daemon) or "simulated"
    #[serde(default = "default_radio_transport")]
    pub transport: String,

    /// Local address the UDP transport listens on
    #[serde(default = "default_radio_bind_addr")]
    pub bind_addr: String,

    /// Address of the modem daemon that owns the radio hardware
    #[serde(default = "default_radio_modem_addr")]
    pub modem_addr: String,

    /// Largest payload, in bytes, the link carries in either direction
    #[serde(default = "default_max_packet_len")]
    pub max_packet_len: usize,

    /// Pause after each transmission before the next device is considered
    #[serde(default = "default_tx_interval_ms")]
    pub tx_interval_ms: u64,

    /// How often the listener polls the transport for inbound packets
    #[serde(default = "default_receive_poll_ms")]
    pub receive_poll_ms: u64,

    /// How often the scheduler re-evaluates pending work when idle
    #[serde(default = "default_status_poll_ms")]
    pub status_poll_ms: u64,
}

/// MQTT broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    /// Broker port
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Client name presented to the broker
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// Gateway access token (sent as the MQTT username)
    #[serde(default)]
    pub access_token: String,

    /// Keep-alive interval in seconds
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// Delay before polling the broker again after a connection error
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

/// Gateway behaviour configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Number of outbound messages that may wait for the broker
    #[serde(default = "default_publish_queue_capacity")]
    pub publish_queue_capacity: usize,

    /// Inbound MQTT messages this long or longer are discarded unparsed
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,

    /// Delay between acknowledging a reset request and shutting down
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,

    /// Devices served by the gateway; the built-in catalog is used when empty
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
}

/// A remote device described in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSpec {
    /// Display name, used to address commands
    pub name: String,
    /// Radio address of the device
    pub symbol: SymbolSpec,
    /// Fields the device reports or accepts
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

/// A device field described in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Display name, used as the telemetry key and RPC method
    pub name: String,
    /// Wire symbol
    pub symbol: SymbolSpec,
    /// Encoding kind ("byte", "tenths", "half_seconds", "settable_byte", ...)
    pub kind: String,
    /// Smallest value accepted for settable fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    /// Largest value accepted for settable fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
}

/// A single-byte symbol written either as a number or as text
///
/// Text may be a single ASCII character (`"T"`) or a hex literal (`"0x5A"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SymbolSpec {
    /// Numeric form
    Byte(u8),
    /// Character or hex literal form
    Text(String),
}

impl SymbolSpec {
    /// Resolve to the byte used on the wire
    pub fn resolve(&self) -> Result<u8> {
        match self {
            SymbolSpec::Byte(b) => Ok(*b),
            SymbolSpec::Text(text) => {
                if let Some(hex) = text
                    .strip_prefix("0x")
                    .or_else(|| text.strip_prefix("0X"))
                {
                    return u8::from_str_radix(hex, 16)
                        .map_err(|e| Error::config(format!("Invalid symbol '{}': {}", text, e)));
                }

                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii() => Ok(c as u8),
                    _ => Err(Error::config(format!(
                        "Invalid symbol '{}': expected one ASCII character, a number or a 0x literal",
                        text
                    ))),
                }
            }
        }
    }
}

impl Config {
    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::serialization(e.to_string()))
    }
}

impl RadioConfig {
    /// Inter-transmission pacing interval
    pub fn tx_interval(&self) -> Duration {
        Duration::from_millis(self.tx_interval_ms)
    }

    /// Listener poll interval
    pub fn receive_poll(&self) -> Duration {
        Duration::from_millis(self.receive_poll_ms)
    }

    /// Scheduler idle poll interval
    pub fn status_poll(&self) -> Duration {
        Duration::from_millis(self.status_poll_ms)
    }
}

impl MqttConfig {
    /// Keep-alive interval
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Delay after a connection error
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl GatewayConfig {
    /// Delay between a reset acknowledgement and shutdown
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            environment: default_environment(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            show_target: default_show_target(),
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            transport: default_radio_transport(),
            bind_addr: default_radio_bind_addr(),
            modem_addr: default_radio_modem_addr(),
            max_packet_len: default_max_packet_len(),
            tx_interval_ms: default_tx_interval_ms(),
            receive_poll_ms: default_receive_poll_ms(),
            status_poll_ms: default_status_poll_ms(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_name: default_client_name(),
            access_token: String::new(),
            keep_alive_secs: default_keep_alive_secs(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            publish_queue_capacity: default_publish_queue_capacity(),
            max_message_len: default_max_message_len(),
            restart_delay_ms: default_restart_delay_ms(),
            devices: Vec::new(),
        }
    }
}

fn default_app_name() -> String {
    "lorabridge".to_string()
}

fn default_environment() -> String {
    "production".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_show_target() -> bool {
    true
}

fn default_radio_transport() -> String {
    "udp".to_string()
}

fn default_radio_bind_addr() -> String {
    "127.0.0.1:1700".to_string()
}

fn default_radio_modem_addr() -> String {
    "127.0.0.1:1701".to_string()
}

fn default_max_packet_len() -> usize {
    50
}

fn default_tx_interval_ms() -> u64 {
    10_000
}

fn default_receive_poll_ms() -> u64 {
    10
}

fn default_status_poll_ms() -> u64 {
    10
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_name() -> String {
    "lorabridge".to_string()
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_publish_queue_capacity() -> usize {
    15
}

fn default_max_message_len() -> usize {
    200
}

fn default_restart_delay_ms() -> u64 {
    10_000
}

/// A builder for creating a configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_file: Option<String>,
    environment_prefix: Option<String>,
    override_with: Option<Config>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Set the environment variable prefix for configuration
    pub fn with_environment_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.environment_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Override with an existing config
    pub fn override_with(mut self, config: Config) -> Self {
        self.override_with = Some(config);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<Config> {
        if let Some(config) = self.override_with {
            return Ok(config);
        }

        let mut config_builder = ConfigLib::builder();

        // Start with default values
        let default_config = Config::default();
        config_builder = config_builder.add_source(
            ConfigLib::try_from(&default_config)
                .map_err(|e| Error::config(format!("Failed to create default config: {}", e)))?,
        );

        if let Some(config_file) = self.config_file {
            let path = Path::new(&config_file);
            if path.exists() {
                debug!("Loading configuration from {}", config_file);
                config_builder = config_builder.add_source(File::with_name(&config_file));
            } else {
                debug!("Configuration file {} does not exist, using defaults", config_file);
            }
        }

        if let Some(prefix) = self.environment_prefix {
            debug!("Loading configuration from environment variables with prefix {}", prefix);
            config_builder = config_builder.add_source(
                Environment::with_prefix(&prefix)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config_lib = config_builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build configuration: {}", e)))?;

        let config: Config = config_lib
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize configuration: {}", e)))?;

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }
}

impl Config {
    /// Reject settings the gateway cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.radio.max_packet_len == 0 || self.radio.max_packet_len > u8::MAX as usize {
            return Err(Error::config(format!(
                "radio.max_packet_len must be between 1 and 255, got {}",
                self.radio.max_packet_len
            )));
        }
        if !matches!(self.radio.transport.as_str(), "udp" | "simulated") {
            return Err(Error::config(format!(
                "radio.transport must be \"udp\" or \"simulated\", got \"{}\"",
                self.radio.transport
            )));
        }
        if self.gateway.publish_queue_capacity == 0 {
            return Err(Error::config("gateway.publish_queue_capacity must be at least 1"));
        }
        Ok(())
    }
}

/// A thread-safe reference to a configuration
#[derive(Debug, Clone)]
pub struct SharedConfig(Arc<Config>);

impl SharedConfig {
    /// Create a new SharedConfig
    pub fn new(config: Config) -> Self {
        Self(Arc::new(config))
    }

    /// Get a reference to the config
    pub fn get(&self) -> &Config {
        &self.0
    }
}

impl From<Config> for SharedConfig {
    fn from(config: Config) -> Self {
        Self::new(config)
    }
}

impl AsRef<Config> for SharedConfig {
    fn as_ref(&self) -> &Config {
        self.get()
    }
}
