//! Relay Property Tests
//!
//! Queue ordering, settings merge semantics and fan-out isolation,
//! exercised through the public `TradeRelay` surface.

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use rand::Rng;
use serde_json::{json, Value};

use trade_relay::command_queue::{CommandQueue, OverflowPolicy, PushOutcome};
use trade_relay::error::DeliveryError;
use trade_relay::model::{CommandPoll, RelayEvent, Settings};
use trade_relay::relay::TradeRelay;
use trade_relay::subscriber::{ConnectionState, Subscriber, SubscriberId};

struct MockDashboard {
    id: SubscriberId,
    inbox: Mutex<Vec<RelayEvent>>,
    broken: bool,
}

impl MockDashboard {
    fn healthy() -> Arc<Self> {
        Arc::new(Self {
            id: SubscriberId::new(),
            inbox: Mutex::new(Vec::new()),
            broken: false,
        })
    }

    fn broken() -> Arc<Self> {
        Arc::new(Self {
            id: SubscriberId::new(),
            inbox: Mutex::new(Vec::new()),
            broken: true,
        })
    }

    fn received(&self) -> Vec<RelayEvent> {
        self.inbox.lock().clone()
    }
}

impl Subscriber for MockDashboard {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::Open
    }

    fn send(&self, frame: Arc<str>) -> Result<(), DeliveryError> {
        if self.broken {
            return Err(DeliveryError::Closed);
        }
        let event: RelayEvent = serde_json::from_str(&frame).expect("frame is a relay event");
        self.inbox.lock().push(event);
        Ok(())
    }
}

fn drain(relay: &TradeRelay) -> Vec<Value> {
    let mut out = Vec::new();
    while let CommandPoll::Command(cmd) = relay.poll_command() {
        out.push(cmd.into_value());
    }
    out
}

/// Commands come back out in exactly the order they went in.
#[test]
fn test_fifo_random_sequences() {
    let mut rng = rand::thread_rng();
    let actions = ["close_all", "close_profits", "breakeven", "open_position"];

    for _ in 0..20 {
        let relay = TradeRelay::new(Settings::default(), CommandQueue::unbounded());
        let len = rng.gen_range(1..64);
        let mut submitted = Vec::with_capacity(len);

        for seq in 0..len {
            let cmd = json!({
                "action": actions[rng.gen_range(0..actions.len())],
                "seq": seq,
                "lot": rng.gen_range(1..100),
            });
            relay.submit_command(cmd.clone()).unwrap();
            submitted.push(cmd);
        }

        assert_eq!(drain(&relay), submitted);
        assert!(relay.poll_command().is_empty());
    }
}

#[test]
fn test_empty_poll_is_sentinel_and_repeatable() {
    let relay = TradeRelay::default();
    for _ in 0..3 {
        let poll = relay.poll_command();
        assert_eq!(poll, CommandPoll::NoCommand);
        assert_eq!(serde_json::to_value(&poll).unwrap(), json!({"status": "no command"}));
    }
}

#[test]
fn test_merge_is_shallow_overlay() {
    let relay = TradeRelay::default();
    relay
        .submit_command(json!({
            "action": "update_settings",
            "settings": {"triggerPercent": 55.5, "sessions": {"london": true}}
        }))
        .unwrap();
    relay
        .submit_command(json!({
            "action": "update_settings",
            "settings": {"sessions": {"tokyo": false}}
        }))
        .unwrap();

    let settings = relay.query_settings();
    assert_eq!(settings.trigger_percent(), Some(55.5));
    assert_eq!(settings.move_to_be(), Some(true));
    assert_eq!(settings.close_percent(), Some(50.0));
    assert_eq!(settings.auto_trading_enabled(), Some(true));
    // Nested objects are replaced, not merged
    assert_eq!(settings.get("sessions"), Some(&json!({"tokyo": false})));
}

#[test]
fn test_empty_settings_update_still_broadcasts() {
    let relay = TradeRelay::default();
    let dash = MockDashboard::healthy();
    relay.on_subscriber_connect(dash.clone());

    relay
        .submit_command(json!({"action": "update_settings", "settings": {}}))
        .unwrap();

    let received = dash.received();
    assert_eq!(received.len(), 2);
    assert_eq!(received[1], RelayEvent::Settings(Settings::default()));
}

#[test]
fn test_update_settings_without_settings_rebroadcasts_snapshot() {
    let relay = TradeRelay::default();
    let dash = MockDashboard::healthy();
    relay.on_subscriber_connect(dash.clone());

    relay
        .submit_command(json!({"action": "update_settings"}))
        .unwrap();
    relay
        .submit_command(json!({"action": "update_settings", "settings": null}))
        .unwrap();

    let received = dash.received();
    assert_eq!(received.len(), 3);
    assert_eq!(received[1], RelayEvent::Settings(Settings::default()));
    assert_eq!(received[2], RelayEvent::Settings(Settings::default()));
    assert_eq!(relay.query_settings(), Settings::default());
    assert!(relay.poll_command().is_empty());
}

#[test]
fn test_join_after_concurrent_merges() {
    let relay = Arc::new(TradeRelay::default());
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let relay = Arc::clone(&relay);
            thread::spawn(move || {
                for i in 0..25 {
                    let key = format!("k{}_{}", t, i);
                    relay
                        .submit_command(json!({"action": "update_settings", "settings": {key: i}}))
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let late = MockDashboard::healthy();
    relay.on_subscriber_connect(late.clone());
    let received = late.received();
    assert_eq!(received.len(), 1);

    let RelayEvent::Settings(seen) = &received[0] else {
        panic!("initial sync must be a settings event");
    };
    assert_eq!(seen.as_map().len(), 4 + 100);
    assert_eq!(seen, &relay.query_settings());
}

#[test]
fn test_failure_isolation_across_three_subscribers() {
    let relay = TradeRelay::default();
    let a = MockDashboard::healthy();
    let b = MockDashboard::broken();
    let c = MockDashboard::healthy();
    for sub in [a.clone(), b.clone(), c.clone()] {
        relay.on_subscriber_connect(sub);
    }

    let telemetry = json!({"symbol": "XAUUSD", "trades": [{"ticket": 7, "profit": 12.5}]});
    let report = relay.submit_telemetry(telemetry.clone()).unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);

    for sub in [&a, &c] {
        let received = sub.received();
        assert_eq!(received.last(), Some(&RelayEvent::TradeData(telemetry.clone())));
    }
}

#[test]
fn test_toggle_auto_broadcasts_once_and_is_not_pollable() {
    let relay = TradeRelay::default();
    let dash = MockDashboard::healthy();
    relay.on_subscriber_connect(dash.clone());

    relay
        .submit_command(json!({"action": "toggle_auto", "auto_state": false}))
        .unwrap();

    let received = dash.received();
    assert_eq!(received.len(), 2);
    match &received[1] {
        RelayEvent::Settings(s) => assert_eq!(s.auto_trading_enabled(), Some(false)),
        other => panic!("expected settings event, got {:?}", other),
    }
    assert_eq!(relay.poll_command(), CommandPoll::NoCommand);
}

#[test]
fn test_queued_command_is_verbatim_and_not_broadcast() {
    let relay = TradeRelay::default();
    let dash = MockDashboard::healthy();
    relay.on_subscriber_connect(dash.clone());

    let cmd = json!({
        "action": "open_position",
        "symbol": "EURUSD",
        "type": "buy",
        "lot": 0.1,
        "sl": null,
        "tp": [1.1, 1.2]
    });
    relay.submit_command(cmd.clone()).unwrap();

    assert_eq!(dash.received().len(), 1, "only the initial sync");
    let polled = relay.poll_command().into_command().unwrap();
    assert_eq!(polled.into_value(), cmd);
}

#[test]
fn test_telemetry_shapes() {
    let relay = TradeRelay::default();
    let dash = MockDashboard::healthy();
    relay.on_subscriber_connect(dash.clone());

    assert!(relay.submit_telemetry(json!({})).is_ok());
    assert!(relay.submit_telemetry(json!(null)).is_err());
    assert!(relay.submit_telemetry(json!("x")).is_err());

    let received = dash.received();
    assert_eq!(received.len(), 2);
    assert_eq!(received[1], RelayEvent::TradeData(json!({})));
}

#[test]
fn test_bounded_queue_drop_oldest() {
    let relay = TradeRelay::new(
        Settings::default(),
        CommandQueue::new(2, OverflowPolicy::DropOldest),
    );
    for seq in 0..3 {
        relay
            .submit_command(json!({"action": "breakeven", "seq": seq}))
            .unwrap();
    }
    assert_eq!(relay.pending_commands(), 2);
    assert_eq!(
        drain(&relay),
        vec![
            json!({"action": "breakeven", "seq": 1}),
            json!({"action": "breakeven", "seq": 2}),
        ]
    );

    let queue = CommandQueue::new(1, OverflowPolicy::DropOldest);
    let first = serde_json::from_value(json!({"action": "a"})).unwrap();
    let second = serde_json::from_value(json!({"action": "b"})).unwrap();
    assert_eq!(queue.push(first).unwrap(), PushOutcome::Queued);
    match queue.push(second).unwrap() {
        PushOutcome::QueuedEvicting(evicted) => assert_eq!(evicted.action(), Some("a")),
        other => panic!("expected eviction, got {:?}", other),
    }
}
