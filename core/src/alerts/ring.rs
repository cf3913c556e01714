use std::collections::VecDeque;
use std::sync::Arc;

use soc_protocol::Alert;

/// Number of alerts the live feed keeps on screen.
pub const ALERT_RING_CAPACITY: usize = 12;

/// Outcome of [`AlertRing::offer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offer {
    pub accepted: bool,
}

/// Bounded, newest-first buffer of alerts with at most one entry per `id`.
///
/// Single writer: the owning stream task offers serially, so the ring holds
/// no lock of its own.
#[derive(Debug, Clone)]
pub struct AlertRing {
    alerts: VecDeque<Alert>,
    capacity: usize,
}

impl Default for AlertRing {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertRing {
    pub fn new() -> Self {
        Self::with_capacity(ALERT_RING_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            alerts: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Prepend `alert` unless its `id` is already held. Evicts the oldest
    /// entry when the ring overflows. A rejected offer changes nothing.
    pub fn offer(&mut self, alert: Alert) -> Offer {
        if self.contains(&alert.id) {
            tracing::debug!("dropping duplicate alert {}", alert.id);
            return Offer { accepted: false };
        }

        self.alerts.push_front(alert);
        if self.alerts.len() > self.capacity
            && let Some(evicted) = self.alerts.pop_back()
        {
            tracing::trace!("evicted alert {}", evicted.id);
        }
        Offer { accepted: true }
    }

    /// Replace the contents with a historical batch, already newest-first.
    /// Duplicates within the batch keep their first (newest) occurrence.
    pub fn seed(&mut self, alerts: impl IntoIterator<Item = Alert>) {
        self.alerts.clear();
        for alert in alerts {
            if self.alerts.len() == self.capacity {
                break;
            }
            if !self.contains(&alert.id) {
                self.alerts.push_back(alert);
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.alerts.iter().any(|a| a.id == id)
    }

    /// Immutable copy for readers, newest first.
    pub fn snapshot(&self) -> Arc<[Alert]> {
        self.alerts.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
