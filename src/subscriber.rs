use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DeliveryError;
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        SubscriberId(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection lifecycle: `Connecting -> Open -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    Closed = 2,
}

impl From<u8> for ConnectionState {
    fn from(raw: u8) -> Self {
        match raw {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            _ => ConnectionState::Closed,
        }
    }
}

/// A push-connected consumer.
///
/// `send` must not block: implementations hand the frame off to their own
/// transport and report failure immediately.
pub trait Subscriber: Send + Sync {
    fn id(&self) -> SubscriberId;

    fn state(&self) -> ConnectionState;

    fn send(&self, frame: Arc<str>) -> Result<(), DeliveryError>;

    fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }
}

pub type SubscriberHandle = Arc<dyn Subscriber>;

/// Subscriber backed by a bounded channel drained by the connection's
/// writer task.
#[derive(Debug)]
pub struct ChannelSubscriber {
    id: SubscriberId,
    peer_addr: Option<SocketAddr>,
    connected_at: DateTime<Utc>,
    state: AtomicU8,
    frames: mpsc::Sender<Arc<str>>,
}

impl ChannelSubscriber {
    /// Returns the subscriber (in `Connecting`) and the receiving half the
    /// writer task drains.
    pub fn new(
        peer_addr: Option<SocketAddr>,
        buffer: usize,
    ) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let subscriber = Self {
            id: SubscriberId::new(),
            peer_addr,
            connected_at: Utc::now(),
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            frames: tx,
        };
        (subscriber, rx)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// `Connecting -> Open`. Returns false if the connection was already
    /// past `Connecting`.
    pub fn mark_open(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Connecting as u8,
                ConnectionState::Open as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Terminal. Returns the previous state.
    pub fn mark_closed(&self) -> ConnectionState {
        ConnectionState::from(self.state.swap(ConnectionState::Closed as u8, Ordering::SeqCst))
    }
}

impl Subscriber for ChannelSubscriber {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from(self.state.load(Ordering::SeqCst))
    }

    fn send(&self, frame: Arc<str>) -> Result<(), DeliveryError> {
        self.frames.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::BufferFull,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Set of currently connected subscribers.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: RwLock<HashMap<SubscriberId, SubscriberHandle>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Adding the same id twice is a no-op.
    pub fn add(&self, subscriber: SubscriberHandle) -> bool {
        let id = subscriber.id();
        let mut subscribers = self.subscribers.write();
        if subscribers.contains_key(&id) {
            debug!(subscriber = %id, "Subscriber already registered");
            return false;
        }
        subscribers.insert(id, subscriber);
        metrics::set_connected_subscribers(subscribers.len() as i64);
        info!(subscriber = %id, subscribers = subscribers.len(), "Subscriber added");
        true
    }

    /// Deregister. Safe to call for ids that are already gone.
    pub fn remove(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.write();
        let removed = subscribers.remove(&id).is_some();
        if removed {
            metrics::set_connected_subscribers(subscribers.len() as i64);
            info!(subscriber = %id, subscribers = subscribers.len(), "Subscriber removed");
        }
        removed
    }

    /// Stable copy of the live set for a single fan-out pass.
    pub fn snapshot(&self) -> Vec<SubscriberHandle> {
        self.subscribers.read().values().cloned().collect()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_subscriber_lifecycle() {
        let (sub, _rx) = ChannelSubscriber::new(None, 4);
        assert_eq!(sub.state(), ConnectionState::Connecting);
        assert!(!sub.is_open());

        assert!(sub.mark_open());
        assert!(sub.is_open());
        assert!(!sub.mark_open(), "Open -> Open is not a transition");

        assert_eq!(sub.mark_closed(), ConnectionState::Open);
        assert_eq!(sub.state(), ConnectionState::Closed);
        assert!(!sub.mark_open(), "Closed is terminal");
    }

    #[test]
    fn test_channel_subscriber_send() {
        let (sub, mut rx) = ChannelSubscriber::new(None, 1);
        sub.mark_open();

        sub.send(Arc::from("one")).unwrap();
        assert_eq!(sub.send(Arc::from("two")), Err(DeliveryError::BufferFull));
        assert_eq!(rx.try_recv().unwrap().as_ref(), "one");

        drop(rx);
        assert_eq!(sub.send(Arc::from("three")), Err(DeliveryError::Closed));
    }

    #[test]
    fn test_channel_preserves_frame_order() {
        let (sub, mut rx) = ChannelSubscriber::new(None, 8);
        sub.mark_open();
        for n in 0..5 {
            sub.send(Arc::from(n.to_string())).unwrap();
        }
        drop(sub);

        let received = tokio_test::block_on(async move {
            let mut out = Vec::new();
            while let Some(frame) = rx.recv().await {
                out.push(frame.to_string());
            }
            out
        });
        assert_eq!(received, vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn test_registry_add_is_idempotent() {
        let registry = SubscriberRegistry::new();
        let (sub, _rx) = ChannelSubscriber::new(None, 4);
        let handle: SubscriberHandle = Arc::new(sub);

        assert!(registry.add(handle.clone()));
        assert!(!registry.add(handle.clone()));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(handle.id()));
    }

    #[test]
    fn test_registry_remove_twice() {
        let registry = SubscriberRegistry::new();
        let (sub, _rx) = ChannelSubscriber::new(None, 4);
        let id = sub.id();
        registry.add(Arc::new(sub));

        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_stable() {
        let registry = SubscriberRegistry::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (sub, rx) = ChannelSubscriber::new(None, 4);
            receivers.push(rx);
            registry.add(Arc::new(sub));
        }

        let snapshot = registry.snapshot();
        let first = snapshot[0].id();
        registry.remove(first);
        let (late, _late_rx) = ChannelSubscriber::new(None, 4);
        registry.add(Arc::new(late));

        // The earlier snapshot is unaffected by later membership changes.
        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.iter().any(|s| s.id() == first));
        assert_eq!(registry.len(), 3);
        assert!(!registry.contains(first));
    }

    #[test]
    fn test_reconnect_is_a_new_subscriber() {
        let (a, _ra) = ChannelSubscriber::new(None, 4);
        let (b, _rb) = ChannelSubscriber::new(None, 4);
        assert_ne!(a.id(), b.id());
    }
}
