//! Engine clients of one run and the cooperative stop flag

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use actor_bridge::{TrafficSimulator, VehicleSimulator};

/// Both simulator clients, owned by the loop for the whole run
pub struct Session<T, V> {
    pub traffic: T,
    pub vehicle: V,
}

impl<T: TrafficSimulator, V: VehicleSimulator> Session<T, V> {
    pub fn new(traffic: T, vehicle: V) -> Self {
        Self { traffic, vehicle }
    }
}

/// Cooperative stop request, checked once per tick boundary
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
