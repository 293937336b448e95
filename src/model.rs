use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value, json};

use crate::error::RelayError;

// Recognized settings keys
pub const TRIGGER_PERCENT: &str = "triggerPercent";
pub const MOVE_TO_BE: &str = "moveToBE";
pub const CLOSE_PERCENT: &str = "closePercent";
pub const AUTO_TRADING_ENABLED: &str = "auto_trading_enabled";

// Reserved command actions
pub const ACTION_UPDATE_SETTINGS: &str = "update_settings";
pub const ACTION_TOGGLE_AUTO: &str = "toggle_auto";

pub const NO_COMMAND_STATUS: &str = "no command";

/// Flat option map shared between the producer and every subscriber.
///
/// Schema-tolerant: keys other than the four recognized ones are carried
/// through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(Map<String, Value>);

impl Default for Settings {
    fn default() -> Self {
        let defaults = json!({
            TRIGGER_PERCENT: 40.0,
            MOVE_TO_BE: true,
            CLOSE_PERCENT: 50.0,
            AUTO_TRADING_ENABLED: true,
        });
        match defaults {
            Value::Object(map) => Settings(map),
            _ => Settings(Map::new()),
        }
    }
}

impl Settings {
    pub fn from_map(map: Map<String, Value>) -> Self {
        Settings(map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Shallow overlay: keys in `partial` overwrite, everything else stays.
    pub(crate) fn overlay(&mut self, partial: Map<String, Value>) {
        for (key, value) in partial {
            self.0.insert(key, value);
        }
    }

    pub(crate) fn insert(&mut self, key: String, value: Value) {
        self.0.insert(key, value);
    }

    pub fn trigger_percent(&self) -> Option<f64> {
        self.0.get(TRIGGER_PERCENT).and_then(Value::as_f64)
    }

    pub fn move_to_be(&self) -> Option<bool> {
        self.0.get(MOVE_TO_BE).and_then(Value::as_bool)
    }

    pub fn close_percent(&self) -> Option<f64> {
        self.0.get(CLOSE_PERCENT).and_then(Value::as_f64)
    }

    pub fn auto_trading_enabled(&self) -> Option<bool> {
        self.0.get(AUTO_TRADING_ENABLED).and_then(Value::as_bool)
    }
}

/// A producer-issued instruction, kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Command(Map<String, Value>);

impl Command {
    pub fn action(&self) -> Option<&str> {
        self.0.get("action").and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// What a submitted command turns into once inspected.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandAction {
    UpdateSettings(Map<String, Value>),
    ToggleAuto(bool),
    Enqueue(Command),
}

impl TryFrom<Value> for CommandAction {
    type Error = RelayError;

    fn try_from(payload: Value) -> Result<Self, Self::Error> {
        let mut obj = match payload {
            Value::Object(obj) => obj,
            _ => return Err(RelayError::invalid("Command must be a JSON object")),
        };

        let action = match obj.get("action") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(_) => return Err(RelayError::invalid("action must be a non-empty string")),
            None => return Err(RelayError::invalid("action is required")),
        };

        match action.as_str() {
            // Missing or null settings merge nothing but still broadcast
            ACTION_UPDATE_SETTINGS => match obj.remove("settings") {
                Some(Value::Object(partial)) => Ok(CommandAction::UpdateSettings(partial)),
                None | Some(Value::Null) => Ok(CommandAction::UpdateSettings(Map::new())),
                Some(_) => Err(RelayError::invalid("settings must be a JSON object")),
            },
            ACTION_TOGGLE_AUTO => match obj.get("auto_state") {
                Some(Value::Bool(state)) => Ok(CommandAction::ToggleAuto(*state)),
                _ => Err(RelayError::invalid("toggle_auto requires a boolean auto_state")),
            },
            _ => Ok(CommandAction::Enqueue(Command(obj))),
        }
    }
}

/// Push event sent to subscribers as `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RelayEvent {
    Settings(Settings),
    TradeData(Value),
}

impl RelayEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RelayEvent::Settings(_) => "settings",
            RelayEvent::TradeData(_) => "trade_data",
        }
    }
}

/// Result of polling the command queue. An empty queue is the steady state,
/// not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandPoll {
    Command(Command),
    NoCommand,
}

impl CommandPoll {
    pub fn is_empty(&self) -> bool {
        matches!(self, CommandPoll::NoCommand)
    }

    pub fn into_command(self) -> Option<Command> {
        match self {
            CommandPoll::Command(cmd) => Some(cmd),
            CommandPoll::NoCommand => None,
        }
    }
}

impl Serialize for CommandPoll {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CommandPoll::Command(cmd) => cmd.serialize(serializer),
            CommandPoll::NoCommand => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("status", NO_COMMAND_STATUS)?;
                map.end()
            }
        }
    }
}
