//! Fixed-capacity memory pool.
//!
//! The pool is a pair of counters: nothing is reserved, nothing is partially
//! granted. Callers check `free()` before allocating; a violated precondition
//! surfaces as a [`MemoryError`] that the scheduler treats as fatal.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("cannot allocate {requested} units: only {free} free")]
    InsufficientFree { requested: u64, free: u64 },
    #[error("cannot release {requested} units: only {used} in use")]
    ReleaseExceedsUsed { requested: u64, used: u64 },
}

/// Memory budget shared by every application in a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryPool {
    capacity: u64,
    free: u64,
}

impl MemoryPool {
    /// Create a pool with all of `capacity` free.
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            free: capacity,
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn free(&self) -> u64 {
        self.free
    }

    pub fn used(&self) -> u64 {
        self.capacity - self.free
    }

    /// Whether `size` units could be allocated right now.
    pub fn fits(&self, size: u64) -> bool {
        size <= self.free
    }

    /// Occupancy as a fraction (0.0 - 1.0).
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.used() as f64 / self.capacity as f64
    }

    /// Take `size` units from the free counter.
    pub fn allocate(&mut self, size: u64) -> Result<(), MemoryError> {
        if size > self.free {
            return Err(MemoryError::InsufficientFree {
                requested: size,
                free: self.free,
            });
        }
        self.free -= size;
        Ok(())
    }

    /// Return `size` units to the free counter.
    pub fn release(&mut self, size: u64) -> Result<(), MemoryError> {
        let used = self.used();
        if size > used {
            return Err(MemoryError::ReleaseExceedsUsed {
                requested: size,
                used,
            });
        }
        self.free += size;
        Ok(())
    }
}
