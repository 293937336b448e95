//! Fan-out of settings and telemetry events to push subscribers.
//!
//! Every broadcast serializes the event once and offers the same frame to
//! each subscriber in a registry snapshot. Sends are non-blocking, so a slow
//! or dead connection costs the pass one failed `try_send` and nothing more.
//! Failures are counted and logged here; they never reach the producer.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::error::DeliveryError;
use crate::metrics;
use crate::model::{RelayEvent, Settings};
use crate::settings_store::SettingsStore;
use crate::subscriber::{SubscriberHandle, SubscriberId, SubscriberRegistry};

/// Per-pass delivery tally. Used for logging and metrics only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BroadcastReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.skipped + self.failed
    }
}

pub struct BroadcastRelay {
    settings: SettingsStore,
    registry: SubscriberRegistry,
    // Serializes settings mutation + broadcast against register + initial sync
    sync_lock: Mutex<()>,
}

impl BroadcastRelay {
    pub fn new(settings: SettingsStore) -> Self {
        Self {
            settings,
            registry: SubscriberRegistry::new(),
            sync_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    /// Send the subscriber, alone, the current settings, then register it.
    ///
    /// The initial frame goes out before the subscriber joins the registry so
    /// no concurrent broadcast can reach it ahead of its settings sync.
    pub fn on_connect(&self, subscriber: SubscriberHandle) -> Result<(), DeliveryError> {
        let _guard = self.sync_lock.lock();

        let id = subscriber.id();
        let event = RelayEvent::Settings(self.settings.get());
        let result = match serialize(&event) {
            Some(frame) => subscriber.send(frame),
            None => Err(DeliveryError::Transport("event serialization failed".into())),
        };

        match &result {
            Ok(()) => {
                metrics::inc_deliveries(1);
                debug!(subscriber = %id, "Initial settings sync sent");
            }
            Err(e) => {
                metrics::inc_delivery_failures(1);
                warn!(subscriber = %id, error = %e, "Initial settings sync failed");
            }
        }

        self.registry.add(subscriber);
        result
    }

    pub fn on_disconnect(&self, id: SubscriberId) -> bool {
        self.registry.remove(id)
    }

    /// Offer `event` to every open subscriber of the current snapshot.
    pub fn broadcast(&self, event: &RelayEvent) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let Some(frame) = serialize(event) else {
            return report;
        };

        for subscriber in self.registry.snapshot() {
            if !subscriber.is_open() {
                report.skipped += 1;
                continue;
            }

            match subscriber.send(Arc::clone(&frame)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        subscriber = %subscriber.id(),
                        event = event.kind(),
                        error = %e,
                        "Delivery failed"
                    );
                }
            }
        }

        metrics::inc_deliveries(report.delivered as u64);
        metrics::inc_delivery_skipped(report.skipped as u64);
        metrics::inc_delivery_failures(report.failed as u64);

        debug!(
            event = event.kind(),
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            "Broadcast complete"
        );
        report
    }

    /// Merge `partial` into the settings and broadcast the full result.
    pub fn update_settings(&self, partial: Map<String, Value>) -> (Settings, BroadcastReport) {
        let _guard = self.sync_lock.lock();
        let updated = self.settings.merge(partial);
        let snapshot = Value::Object(updated.as_map().clone());
        info!(settings = %snapshot, "Settings updated");
        let report = self.broadcast(&RelayEvent::Settings(updated.clone()));
        (updated, report)
    }

    pub fn set_setting(&self, key: &str, value: Value) -> (Settings, BroadcastReport) {
        let _guard = self.sync_lock.lock();
        let updated = self.settings.set_field(key, value.clone());
        info!(key = key, value = %value, "Setting changed");
        let report = self.broadcast(&RelayEvent::Settings(updated.clone()));
        (updated, report)
    }

    pub fn publish_telemetry(&self, payload: Value) -> BroadcastReport {
        self.broadcast(&RelayEvent::TradeData(payload))
    }
}

fn serialize(event: &RelayEvent) -> Option<Arc<str>> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Arc::from(text)),
        Err(e) => {
            error!(event = event.kind(), error = %e, "Failed to serialize event");
            None
        }
    }
}
