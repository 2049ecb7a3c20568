use crate::bus::BusState;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub bus_state: BusState,
    pub bus_reconnects: u32,
    pub events_received: u64,
    pub handler_faults: u64,
    pub poll_failures: u64,
    pub discarded_results: u64,
}

/// Compteurs de santé partagés entre bus, notifier et scheduler.
/// Les erreurs locales y sont reflétées au lieu d'être propagées.
#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    bus_state: Arc<parking_lot::Mutex<BusState>>,
    bus_reconnects: Arc<AtomicU32>,
    events_received: Arc<AtomicU64>,
    handler_faults: Arc<AtomicU64>,
    poll_failures: Arc<AtomicU64>,
    discarded_results: Arc<AtomicU64>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            bus_state: Arc::new(parking_lot::Mutex::new(BusState::Disconnected)),
            bus_reconnects: Arc::new(AtomicU32::new(0)),
            events_received: Arc::new(AtomicU64::new(0)),
            handler_faults: Arc::new(AtomicU64::new(0)),
            poll_failures: Arc::new(AtomicU64::new(0)),
            discarded_results: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn set_bus_state(&self, state: BusState) {
        *self.bus_state.lock() = state;
    }

    pub fn bus_state(&self) -> BusState {
        *self.bus_state.lock()
    }

    pub fn increment_reconnects(&self) {
        self.bus_reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handler_fault(&self) {
        self.handler_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poll_failure(&self) {
        self.poll_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded(&self) {
        self.discarded_results.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_health(&self) -> KernelHealth {
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            bus_state: self.bus_state(),
            bus_reconnects: self.bus_reconnects.load(Ordering::Relaxed),
            events_received: self.events_received.load(Ordering::Relaxed),
            handler_faults: self.handler_faults.load(Ordering::Relaxed),
            poll_failures: self.poll_failures.load(Ordering::Relaxed),
            discarded_results: self.discarded_results.load(Ordering::Relaxed),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}
