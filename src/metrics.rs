use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_gauge, IntCounter, IntGauge};

// --- Producer side ---

pub static TELEMETRY_RECEIVED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "trade_relay_telemetry_received_total",
        "Telemetry payloads accepted for fan-out"
    )
    .expect("telemetry_received counter")
});

pub static COMMANDS_QUEUED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "trade_relay_commands_queued_total",
        "Commands appended to the pending queue"
    )
    .expect("commands_queued counter")
});

pub static COMMANDS_EVICTED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "trade_relay_commands_evicted_total",
        "Pending commands evicted by the drop_oldest overflow policy"
    )
    .expect("commands_evicted counter")
});

pub static SETTINGS_UPDATES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "trade_relay_settings_updates_total",
        "Settings mutations (update_settings and toggle_auto)"
    )
    .expect("settings_updates counter")
});

pub static INVALID_SUBMISSIONS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "trade_relay_invalid_submissions_total",
        "Telemetry or command submissions rejected as invalid"
    )
    .expect("invalid_submissions counter")
});

pub static PENDING_COMMANDS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "trade_relay_pending_commands",
        "Commands waiting for the poller"
    )
    .expect("pending_commands gauge")
});

// --- Subscriber side ---

pub static CONNECTED_SUBSCRIBERS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "trade_relay_connected_subscribers",
        "Currently registered push subscribers"
    )
    .expect("connected_subscribers gauge")
});

pub static DELIVERIES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "trade_relay_deliveries_total",
        "Event frames handed to subscriber transports"
    )
    .expect("deliveries counter")
});

pub static DELIVERY_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "trade_relay_delivery_failures_total",
        "Per-subscriber sends that failed"
    )
    .expect("delivery_failures counter")
});

pub static DELIVERY_SKIPPED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "trade_relay_delivery_skipped_total",
        "Sends skipped because the subscriber was not open"
    )
    .expect("delivery_skipped counter")
});

pub fn inc_telemetry_received() {
    TELEMETRY_RECEIVED.inc();
}

pub fn inc_commands_queued() {
    COMMANDS_QUEUED.inc();
}

pub fn inc_commands_evicted() {
    COMMANDS_EVICTED.inc();
}

pub fn inc_settings_updates() {
    SETTINGS_UPDATES.inc();
}

pub fn inc_invalid_submissions() {
    INVALID_SUBMISSIONS.inc();
}

pub fn set_pending_commands(count: i64) {
    PENDING_COMMANDS.set(count);
}

pub fn set_connected_subscribers(count: i64) {
    CONNECTED_SUBSCRIBERS.set(count);
}

pub fn inc_deliveries(count: u64) {
    DELIVERIES.inc_by(count);
}

pub fn inc_delivery_failures(count: u64) {
    DELIVERY_FAILURES.inc_by(count);
}

pub fn inc_delivery_skipped(count: u64) {
    DELIVERY_SKIPPED.inc_by(count);
}
