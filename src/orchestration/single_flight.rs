//! # Single-Flight Guard
//!
//! At most one in-flight processing attempt per report id within this process.
//! Acquisition is scoped: the returned [`FlightGuard`] releases the key when dropped,
//! which covers normal return, early return, panic unwinding and future cancellation.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    in_flight: Arc<DashMap<Uuid, Instant>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`, or `None` if another attempt already holds it
    pub fn try_acquire(&self, key: Uuid) -> Option<FlightGuard> {
        match self.in_flight.entry(key) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                Some(FlightGuard {
                    key,
                    in_flight: Arc::clone(&self.in_flight),
                })
            }
        }
    }

    pub fn is_in_flight(&self, key: Uuid) -> bool {
        self.in_flight.contains_key(&key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// How long `key` has been held, if it is held
    pub fn held_for(&self, key: Uuid) -> Option<Duration> {
        self.in_flight.get(&key).map(|since| since.elapsed())
    }
}

/// Holds a single-flight key until dropped
#[must_use = "the key is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct FlightGuard {
    key: Uuid,
    in_flight: Arc<DashMap<Uuid, Instant>>,
}

impl FlightGuard {
    pub fn key(&self) -> Uuid {
        self.key
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}
