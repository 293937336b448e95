use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::warn;

use crate::error::RelayError;
use crate::metrics;
use crate::model::{Command, CommandPoll};

/// What happens when a push hits `max_pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the head to make room for the new command.
    #[default]
    DropOldest,
    /// Refuse the new command.
    RejectNewest,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    Queued,
    /// Queued after evicting the oldest pending command.
    QueuedEvicting(Command),
}

/// FIFO of commands waiting for the poller.
#[derive(Debug)]
pub struct CommandQueue {
    pending: Mutex<VecDeque<Command>>,
    // 0 = unbounded
    capacity: usize,
    policy: OverflowPolicy,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl CommandQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            capacity,
            policy,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(0, OverflowPolicy::default())
    }

    pub fn capacity(&self) -> Option<usize> {
        (self.capacity > 0).then_some(self.capacity)
    }

    pub fn push(&self, command: Command) -> Result<PushOutcome, RelayError> {
        let mut pending = self.pending.lock();

        let outcome = if self.capacity > 0 && pending.len() >= self.capacity {
            match self.policy {
                OverflowPolicy::RejectNewest => {
                    warn!(
                        capacity = self.capacity,
                        action = command.action().unwrap_or_default(),
                        "Command queue full, rejecting command"
                    );
                    return Err(RelayError::QueueFull {
                        capacity: self.capacity,
                    });
                }
                OverflowPolicy::DropOldest => match pending.pop_front() {
                    Some(evicted) => {
                        warn!(
                            capacity = self.capacity,
                            evicted = evicted.action().unwrap_or_default(),
                            "Command queue full, evicting oldest command"
                        );
                        metrics::inc_commands_evicted();
                        PushOutcome::QueuedEvicting(evicted)
                    }
                    None => PushOutcome::Queued,
                },
            }
        } else {
            PushOutcome::Queued
        };

        pending.push_back(command);
        metrics::set_pending_commands(pending.len() as i64);
        Ok(outcome)
    }

    pub fn pop(&self) -> CommandPoll {
        let mut pending = self.pending.lock();
        let next = pending.pop_front();
        metrics::set_pending_commands(pending.len() as i64);

        match next {
            Some(cmd) => CommandPoll::Command(cmd),
            None => CommandPoll::NoCommand,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
