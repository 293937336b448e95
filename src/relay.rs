use serde_json::Value;
use tracing::{debug, info, warn};

use crate::broadcast::{BroadcastRelay, BroadcastReport};
use crate::command_queue::{CommandQueue, OverflowPolicy, PushOutcome};
use crate::config::{RelayConfig, SubscriberConfig};
use crate::error::RelayError;
use crate::metrics;
use crate::model::{AUTO_TRADING_ENABLED, CommandAction, CommandPoll, Settings};
use crate::settings_store::SettingsStore;
use crate::subscriber::{SubscriberHandle, SubscriberId};

/// What `submit_command` did with a command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    SettingsUpdated {
        settings: Settings,
        report: BroadcastReport,
    },
    Queued(PushOutcome),
}

/// The relay instance the transport shells hold.
///
/// Owns the settings, the command queue and the subscriber set; constructed
/// once at startup and shared behind an `Arc`.
pub struct TradeRelay {
    broadcast: BroadcastRelay,
    commands: CommandQueue,
    // Frames buffered per push connection
    send_buffer: usize,
}

impl Default for TradeRelay {
    fn default() -> Self {
        Self::new(Settings::default(), CommandQueue::default())
    }
}

impl TradeRelay {
    pub fn new(initial: Settings, commands: CommandQueue) -> Self {
        Self {
            broadcast: BroadcastRelay::new(SettingsStore::new(initial)),
            commands,
            send_buffer: SubscriberConfig::default().send_buffer,
        }
    }

    pub fn with_send_buffer(mut self, send_buffer: usize) -> Self {
        self.send_buffer = send_buffer;
        self
    }

    pub fn from_config(config: &RelayConfig) -> Result<Self, ::config::ConfigError> {
        let mut initial = Settings::default();
        initial.overlay(config.initial_settings()?);

        let commands = CommandQueue::new(config.queue.max_pending, config.queue.overflow);
        match (commands.capacity(), config.queue.overflow) {
            (None, _) => warn!("Command queue is unbounded"),
            (Some(cap), OverflowPolicy::DropOldest) => {
                info!(capacity = cap, "Command queue bounded, evicting oldest on overflow")
            }
            (Some(cap), OverflowPolicy::RejectNewest) => {
                info!(capacity = cap, "Command queue bounded, rejecting newest on overflow")
            }
        }

        Ok(Self::new(initial, commands).with_send_buffer(config.subscribers.send_buffer))
    }

    /// Fan telemetry out as a `trade_data` event. Succeeds regardless of how
    /// many subscribers actually received it.
    pub fn submit_telemetry(&self, payload: Value) -> Result<BroadcastReport, RelayError> {
        if !payload.is_object() {
            metrics::inc_invalid_submissions();
            return Err(RelayError::invalid("Telemetry must be a JSON object"));
        }

        metrics::inc_telemetry_received();
        let report = self.broadcast.publish_telemetry(payload);
        if report.failed > 0 {
            debug!(failed = report.failed, "Telemetry broadcast had delivery failures");
        }
        Ok(report)
    }

    pub fn submit_command(&self, payload: Value) -> Result<CommandOutcome, RelayError> {
        let action = CommandAction::try_from(payload).inspect_err(|e| {
            metrics::inc_invalid_submissions();
            warn!(error = %e, "Rejected command");
        })?;

        match action {
            CommandAction::UpdateSettings(partial) => {
                let (settings, report) = self.broadcast.update_settings(partial);
                metrics::inc_settings_updates();
                Ok(CommandOutcome::SettingsUpdated { settings, report })
            }
            CommandAction::ToggleAuto(state) => {
                let (settings, report) = self
                    .broadcast
                    .set_setting(AUTO_TRADING_ENABLED, Value::Bool(state));
                metrics::inc_settings_updates();
                Ok(CommandOutcome::SettingsUpdated { settings, report })
            }
            CommandAction::Enqueue(command) => {
                let action = command.action().unwrap_or_default().to_string();
                let outcome = self.commands.push(command)?;
                metrics::inc_commands_queued();
                info!(action = %action, pending = self.commands.len(), "Command queued");
                Ok(CommandOutcome::Queued(outcome))
            }
        }
    }

    /// Next pending command, or `NoCommand`. Also serves the legacy
    /// command-state query.
    pub fn poll_command(&self) -> CommandPoll {
        let next = self.commands.pop();
        if let CommandPoll::Command(cmd) = &next {
            debug!(action = cmd.action().unwrap_or_default(), "Command dequeued");
        }
        next
    }

    pub fn query_settings(&self) -> Settings {
        self.broadcast.settings().get()
    }

    pub fn on_subscriber_connect(&self, subscriber: SubscriberHandle) {
        let id = subscriber.id();
        if let Err(e) = self.broadcast.on_connect(subscriber) {
            debug!(subscriber = %id, error = %e, "Subscriber missed its initial sync");
        }
    }

    pub fn on_subscriber_disconnect(&self, id: SubscriberId) {
        self.broadcast.on_disconnect(id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.broadcast.registry().len()
    }

    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    pub fn send_buffer(&self) -> usize {
        self.send_buffer
    }
}
