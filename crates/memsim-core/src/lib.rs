//! MemSim — Discrete-event simulator for memory-constrained model serving.
//!
//! Several applications share one memory budget. Each can be served by one
//! of several model variants of increasing size (e.g. quantization levels).
//! A stream of arrivals drives admission, eviction, and residency decisions;
//! the simulator reports how many requests were missed and how memory
//! occupancy evolves.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐     ┌────────────┐     ┌──────────────┐
//! │ Workload │────▶│ Scheduler  │────▶│    Report    │
//! │ Ingestion│     │  (Events)  │     │  & Summary   │
//! └──────────┘     └─────┬──────┘     └──────────────┘
//!                        │
//!          ┌─────────────┼─────────────┐
//!          ▼             ▼             ▼
//!    ┌──────────┐  ┌──────────┐  ┌──────────────┐
//!    │  Event   │  │  Memory  │  │ Applications │
//!    │  Queue   │  │   Pool   │  │  (Registry)  │
//!    └──────────┘  └──────────┘  └──────────────┘
//! ```

pub mod application;
pub mod clock;
pub mod config;
pub mod engine;
pub mod memory;
pub mod queue;
pub mod report;
pub mod workload;

// Re-export key types for convenience.
pub use application::{AppId, AppStatus, Application, ApplicationRegistry, Observation};
pub use clock::SimClock;
pub use config::SimConfig;
pub use engine::{Scheduler, SimCounters, SimError, TraceRecord};
pub use memory::{MemoryError, MemoryPool};
pub use queue::{Event, EventKey, EventKind, EventQueue};
pub use report::{ReportRow, SimulationSummary};
pub use workload::{load_workload, Arrival};

/// Run a complete simulation of `arrivals` against a fresh registry.
pub fn run_simulation(
    config: &SimConfig,
    arrivals: &[Arrival],
) -> Result<SimulationSummary, SimError> {
    let mut scheduler = Scheduler::new(config);
    scheduler.load_workload(arrivals)?;
    scheduler.run()
}
