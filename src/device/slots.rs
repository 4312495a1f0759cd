//! # Device Slot Handling
//!
//! Each bound DFU interface occupies one slot of a bounded pool while it
//! exists. Slot indices identify a device instance to the rest of the
//! service; the pool hands out the lowest free index, so indices are reused
//! deterministically after release.

use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub struct SlotPool {
    capacity: usize,
    used: Mutex<Vec<usize>>,
}

impl SlotPool {
    /// Construct a pool of `capacity` slots. One pool exists per process.
    pub fn new(capacity: usize) -> Arc<Self> {
        assert!(capacity > 0);
        Arc::new(Self {
            capacity,
            used: Mutex::new(Vec::new()),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently reserved.
    pub fn in_use(&self) -> usize {
        self.used.lock().unwrap().len()
    }

    /// Reserve the lowest free slot, or `None` when the pool is full.
    ///
    /// Linear scan over the used list; fine for the handful of devices this
    /// serves.
    pub fn reserve(self: &Arc<Self>) -> Option<SlotReservation> {
        let mut used = self.used.lock().unwrap();
        let index = (0..self.capacity).find(|index| !used.contains(index))?;
        used.push(index);
        Some(SlotReservation {
            index,
            pool: Arc::clone(self),
        })
    }

    fn release(&self, index: usize) {
        self.used.lock().unwrap().retain(|&used| used != index);
    }
}

/// RAII reservation of one slot; dropping it returns the slot to the pool.
#[derive(Debug)]
pub struct SlotReservation {
    index: usize,
    pool: Arc<SlotPool>,
}

impl SlotReservation {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Drop for SlotReservation {
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}
