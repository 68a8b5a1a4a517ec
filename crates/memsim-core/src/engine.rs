//! Discrete-event simulation engine.
//!
//! The [`Scheduler`] owns every piece of mutable simulation state: the clock,
//! the event queue, the memory pool, and the application registry. Each
//! iteration pops the earliest event, advances the clock, dispatches on the
//! event kind, and appends a [`TraceRecord`].
//!
//! Admission walks an application's model variants from largest to smallest
//! and takes the first one that is already resident, fits in free memory, or
//! fits after evicting warm applications. Eviction is size-greedy: idle
//! applications are reclaimed largest first until the request fits.

use crate::application::{AppId, AppStatus, Application, ApplicationRegistry, Observation};
use crate::clock::SimClock;
use crate::config::SimConfig;
use crate::memory::{MemoryError, MemoryPool};
use crate::queue::{Event, EventKey, EventKind, EventQueue};
use crate::report::SimulationSummary;
use crate::workload::Arrival;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Faults that abort a run. A request that cannot be admitted is not one of
/// them; it is counted as a miss.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("unknown application: {name}")]
    UnknownApplication { name: String },
    #[error("memory accounting violated at t={time} for {app} (size {size}): {source}")]
    Memory {
        time: f64,
        app: String,
        size: u64,
        #[source]
        source: MemoryError,
    },
    #[error("active application {app} has no pending FINISHED event at t={time}")]
    MissingFinishEvent { app: String, time: f64 },
    #[error("active application {app} has no request observation to extend at t={time}")]
    MissingObservation { app: String, time: f64 },
}

/// One line of the append-only trace log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub kind: EventKind,
    pub app: String,
    pub time: f64,
    pub free_before: u64,
    pub free_after: u64,
    pub resident_after: u64,
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<8} @{:>10.1}  app={:<16} free {} -> {}  allocated={}",
            self.kind.to_string(),
            self.time,
            self.app,
            self.free_before,
            self.free_after,
            self.resident_after,
        )
    }
}

/// Run-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimCounters {
    pub events_processed: u64,
    /// STARTED events that ran the allocation algorithm.
    pub requests: u64,
    pub admitted: u64,
    pub missed: u64,
    /// Admissions served by the model that was already resident.
    pub warm_hits: u64,
    pub evictions: u64,
    /// STARTED events folded into an active service window.
    pub coalesced: u64,
}

/// Simulation context and event loop.
pub struct Scheduler {
    name: String,
    /// Virtual clock.
    pub clock: SimClock,
    /// Pending events.
    queue: EventQueue,
    memory: MemoryPool,
    registry: ApplicationRegistry,
    /// Handle of each active application's FINISHED event.
    pending_finish: HashMap<AppId, EventKey>,
    /// Pre-fetch lead window.
    window: f64,
    counters: SimCounters,
    trace: Vec<TraceRecord>,
}

impl Scheduler {
    /// Create a scheduler with a fresh registry built from `config`.
    pub fn new(config: &SimConfig) -> Self {
        Self::with_registry(
            config.simulation.name.clone(),
            config.memory.capacity,
            config.memory.window,
            config.registry(),
        )
    }

    pub fn with_registry(
        name: impl Into<String>,
        capacity: u64,
        window: f64,
        registry: ApplicationRegistry,
    ) -> Self {
        Self {
            name: name.into(),
            clock: SimClock::new(),
            queue: EventQueue::new(),
            memory: MemoryPool::new(capacity),
            registry,
            pending_finish: HashMap::new(),
            window,
            counters: SimCounters::default(),
            trace: Vec::new(),
        }
    }

    /// Seed the queue with one STARTED event per arrival, pulled ahead of the
    /// request time by the lead window.
    pub fn load_workload(&mut self, arrivals: &[Arrival]) -> Result<(), SimError> {
        for arrival in arrivals {
            let id = self.resolve(&arrival.app)?;
            self.schedule_event(Event::started(arrival.request_time - self.window, id));
        }
        tracing::debug!(
            arrivals = arrivals.len(),
            pending = self.queue.len(),
            "workload loaded"
        );
        Ok(())
    }

    /// Resolve an application name against the registry.
    pub fn resolve(&self, name: &str) -> Result<AppId, SimError> {
        self.registry
            .lookup(name)
            .ok_or_else(|| SimError::UnknownApplication {
                name: name.to_string(),
            })
    }

    /// Schedule an event.
    pub fn schedule_event(&mut self, event: Event) -> EventKey {
        self.queue.add(event)
    }

    /// Run the simulation until all events are processed.
    pub fn run(&mut self) -> Result<SimulationSummary, SimError> {
        tracing::info!(
            simulation = %self.name,
            capacity = self.memory.capacity(),
            window = self.window,
            pending = self.queue.len(),
            "simulation started"
        );
        while self.step()?.is_some() {}
        tracing::info!(
            events = self.counters.events_processed,
            admitted = self.counters.admitted,
            missed = self.counters.missed,
            evictions = self.counters.evictions,
            "simulation finished"
        );
        Ok(SimulationSummary::from_scheduler(self))
    }

    /// Process the earliest pending event. Returns `None` once the queue is
    /// drained.
    pub fn step(&mut self) -> Result<Option<&TraceRecord>, SimError> {
        let Some(event) = self.queue.pop_earliest() else {
            return Ok(None);
        };
        self.clock.advance_to(event.time);
        let free_before = self.memory.free();

        match event.kind {
            EventKind::Started => self.handle_started(event.app)?,
            EventKind::Finished => self.handle_finished(event.app),
        }

        let app = self.registry.get(event.app);
        let record = TraceRecord {
            kind: event.kind,
            app: app.name().to_string(),
            time: event.time,
            free_before,
            free_after: self.memory.free(),
            resident_after: app.resident_size(),
        };
        tracing::debug!("{}", record);
        self.counters.events_processed += 1;
        self.trace.push(record);
        Ok(self.trace.last())
    }

    fn handle_started(&mut self, id: AppId) -> Result<(), SimError> {
        let now = self.clock.now();
        if self.registry.get(id).status() != AppStatus::Aggressive {
            self.allocate(id, now)
        } else {
            self.extend_window(id, now)
        }
    }

    fn handle_finished(&mut self, id: AppId) {
        deactivate(self.registry.get_mut(id));
        self.pending_finish.remove(&id);
    }

    /// Fold a repeated request into the active service window.
    fn extend_window(&mut self, id: AppId, now: f64) -> Result<(), SimError> {
        let stale = self
            .pending_finish
            .remove(&id)
            .and_then(|key| self.queue.remove(key));
        if stale.is_none() {
            return Err(SimError::MissingFinishEvent {
                app: self.registry.get(id).name().to_string(),
                time: now,
            });
        }

        let finish = now + 2.0 * self.window;
        let app = self.registry.get_mut(id);
        app.finish_time = Some(finish);
        let last_finish = app.observations.iter_mut().rev().find_map(|o| match o {
            Observation::Requested { finish_time, .. } => Some(finish_time),
            Observation::Evicted { .. } => None,
        });
        match last_finish {
            Some(slot) => *slot = Some(finish),
            None => {
                return Err(SimError::MissingObservation {
                    app: app.name().to_string(),
                    time: now,
                })
            }
        }

        self.schedule_finish(id, finish);
        self.counters.coalesced += 1;
        Ok(())
    }

    /// Admit `id` with the largest variant that is resident or can be made
    /// to fit, or count a miss.
    fn allocate(&mut self, id: AppId, time: f64) -> Result<(), SimError> {
        let sizes = self.registry.get(id).model_sizes().to_vec();
        let mut admitted = false;

        for &candidate in sizes.iter().rev() {
            if candidate == self.registry.get(id).resident_size() {
                self.admit(id, time);
                self.counters.warm_hits += 1;
                admitted = true;
                break;
            }

            // The current variant is dropped before the candidate is known to
            // fit, so a full miss leaves nothing resident.
            self.release_resident(id, time)?;

            if self.memory.fits(candidate) || self.evict_for(candidate, time)? {
                self.memory
                    .allocate(candidate)
                    .map_err(|source| self.memory_fault(id, time, candidate, source))?;
                self.registry.get_mut(id).resident_size = candidate;
                self.admit(id, time);
                admitted = true;
                break;
            }
        }

        self.counters.requests += 1;
        if admitted {
            self.counters.admitted += 1;
        } else {
            self.counters.missed += 1;
            tracing::debug!(app = %self.registry.get(id).name(), time, "request missed");
        }

        let app = self.registry.get_mut(id);
        let observation = Observation::Requested {
            time,
            finish_time: app.finish_time,
            allocated: app.resident_size,
        };
        app.observations.push(observation);
        Ok(())
    }

    /// Reclaim warm applications, largest first, until `required` fits.
    /// Returns whether it fits afterwards.
    fn evict_for(&mut self, required: u64, time: f64) -> Result<bool, SimError> {
        let mut candidates: Vec<(AppId, u64)> = self
            .registry
            .iter()
            .filter(|(_, app)| app.is_warm())
            .map(|(id, app)| (id, app.resident_size()))
            .collect();
        // Stable: equal sizes keep registry order.
        candidates.sort_by_key(|&(_, size)| Reverse(size));

        for (victim, size) in candidates {
            self.memory
                .release(size)
                .map_err(|source| self.memory_fault(victim, time, size, source))?;
            evict(self.registry.get_mut(victim), time);
            self.counters.evictions += 1;
            tracing::trace!(app = %self.registry.get(victim).name(), size, time, "evicted");

            if self.memory.free() >= required {
                break;
            }
        }
        Ok(self.memory.free() >= required)
    }

    fn release_resident(&mut self, id: AppId, time: f64) -> Result<(), SimError> {
        let size = self.registry.get(id).resident_size();
        self.memory
            .release(size)
            .map_err(|source| self.memory_fault(id, time, size, source))?;
        self.registry.get_mut(id).resident_size = 0;
        Ok(())
    }

    fn admit(&mut self, id: AppId, time: f64) {
        let finish = time + 2.0 * self.window;
        activate(self.registry.get_mut(id), finish);
        self.schedule_finish(id, finish);
    }

    fn schedule_finish(&mut self, id: AppId, finish: f64) {
        let key = self.schedule_event(Event::finished(finish, id));
        self.pending_finish.insert(id, key);
    }

    fn memory_fault(&self, id: AppId, time: f64, size: u64, source: MemoryError) -> SimError {
        SimError::Memory {
            time,
            app: self.registry.get(id).name().to_string(),
            size,
            source,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn window(&self) -> f64 {
        self.window
    }

    pub fn memory(&self) -> &MemoryPool {
        &self.memory
    }

    pub fn registry(&self) -> &ApplicationRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn counters(&self) -> &SimCounters {
        &self.counters
    }

    /// Trace records of every dispatched event, in dispatch order.
    pub fn trace(&self) -> &[TraceRecord] {
        &self.trace
    }

    /// Number of pending events.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Pending FINISHED events for `id`.
    pub fn pending_finish_events(&self, id: AppId) -> Vec<Event> {
        self.queue
            .iter()
            .filter(|e| e.kind == EventKind::Finished && e.app == id)
            .copied()
            .collect()
    }
}

// --- State transitions ---
//
// Memory movement stays in the scheduler; these only touch the application.

fn activate(app: &mut Application, finish_time: f64) {
    app.status = AppStatus::Aggressive;
    app.finish_time = Some(finish_time);
}

fn deactivate(app: &mut Application) {
    app.status = AppStatus::Minimal;
}

fn evict(app: &mut Application, time: f64) {
    debug_assert_eq!(app.status, AppStatus::Minimal, "evicting an active application");
    app.resident_size = 0;
    app.evict_time = Some(time);
    app.observations.push(Observation::Evicted { time });
}
