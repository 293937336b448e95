use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::env;

use crate::command_queue::OverflowPolicy;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub subscribers: SubscriberConfig,
    /// JSON object overlaid onto the built-in default settings at startup.
    /// Raw string: config keys are case-folded, settings keys are not.
    #[serde(default)]
    pub initial_settings: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
    /// Extra standalone push listener. Subscribers can always upgrade on
    /// `http_addr` at `/`.
    #[serde(default)]
    pub ws_addr: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            ws_addr: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    /// 0 = unbounded
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_pending: default_max_pending(),
            overflow: OverflowPolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SubscriberConfig {
    /// Frames buffered per connection before sends start failing.
    #[serde(default = "default_send_buffer")]
    pub send_buffer: usize,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            send_buffer: default_send_buffer(),
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_max_pending() -> usize {
    1024
}

fn default_send_buffer() -> usize {
    256
}

impl RelayConfig {
    pub fn initial_settings(&self) -> Result<Map<String, Value>, ConfigError> {
        let Some(raw) = self.initial_settings.as_deref() else {
            return Ok(Map::new());
        };
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(ConfigError::Message(
                "initial_settings must be a JSON object".to_string(),
            )),
            Err(e) => Err(ConfigError::Message(format!(
                "initial_settings is not valid JSON: {}",
                e
            ))),
        }
    }

    pub fn new() -> Result<Self, ConfigError> {
        Self::load(Environment::with_prefix("RELAY"))
    }

    fn load(environment: Environment) -> Result<Self, ConfigError> {
        let home = env::var("HOME").unwrap_or_else(|_| ".".into());

        let s = Config::builder()
            // 1. ~/.trade-relay/config.{toml,json,ini}
            .add_source(File::with_name(&format!("{}/.trade-relay/config", home)).required(false))
            // 2. config/relay
            .add_source(File::with_name("config/relay").required(false))
            // 3. config/local (not checked in)
            .add_source(File::with_name("config/local").required(false))
            // 4. e.g. RELAY_QUEUE__MAX_PENDING=500
            .add_source(
                environment
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }
}
