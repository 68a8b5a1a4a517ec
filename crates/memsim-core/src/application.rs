//! Application model.
//!
//! Each [`Application`] can be served by one of several model variants of
//! increasing size. The scheduler decides which variant is resident at any
//! moment; this module only holds the state and its history. Status changes
//! live in [`crate::engine`] so the state machine stays in one place.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Index of an application in its [`ApplicationRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppId(pub usize);

/// Serving status of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppStatus {
    /// Idle. May still hold a warm model in memory.
    Minimal,
    /// Actively serving inside a service window.
    Aggressive,
}

/// One entry of an application's history, recorded on every state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    /// A request was dispatched, admitted or missed.
    Requested {
        time: f64,
        /// Finish time current after dispatch; stale on a miss.
        finish_time: Option<f64>,
        /// Resident size after dispatch (0 on a miss).
        allocated: u64,
    },
    /// The resident model was reclaimed. Allocated memory drops to 0.
    Evicted { time: f64 },
}

impl Observation {
    /// Timestamp the observation is ordered by in reports.
    pub fn time(&self) -> f64 {
        match self {
            Observation::Requested { time, .. } | Observation::Evicted { time } => *time,
        }
    }

    /// Memory held by the application right after this observation.
    pub fn allocated(&self) -> u64 {
        match self {
            Observation::Requested { allocated, .. } => *allocated,
            Observation::Evicted { .. } => 0,
        }
    }
}

/// Per-application simulation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub(crate) name: String,
    /// Candidate sizes, ascending. The last one is the best model.
    pub(crate) model_sizes: Vec<u64>,
    pub(crate) status: AppStatus,
    /// 0 or a member of `model_sizes`.
    pub(crate) resident_size: u64,
    pub(crate) finish_time: Option<f64>,
    pub(crate) evict_time: Option<f64>,
    pub(crate) observations: Vec<Observation>,
}

impl Application {
    /// Create an idle application with nothing resident.
    pub fn new(name: impl Into<String>, model_sizes: Vec<u64>) -> Self {
        Self {
            name: name.into(),
            model_sizes,
            status: AppStatus::Minimal,
            resident_size: 0,
            finish_time: None,
            evict_time: None,
            observations: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model_sizes(&self) -> &[u64] {
        &self.model_sizes
    }

    /// Largest model variant.
    pub fn best_model(&self) -> u64 {
        self.model_sizes.last().copied().unwrap_or(0)
    }

    pub fn status(&self) -> AppStatus {
        self.status
    }

    pub fn resident_size(&self) -> u64 {
        self.resident_size
    }

    pub fn finish_time(&self) -> Option<f64> {
        self.finish_time
    }

    pub fn evict_time(&self) -> Option<f64> {
        self.evict_time
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Idle with a model still resident.
    pub fn is_warm(&self) -> bool {
        self.status == AppStatus::Minimal && self.resident_size > 0
    }

    /// Whether the resident size respects the variant invariant.
    pub fn residency_is_valid(&self) -> bool {
        self.resident_size == 0 || self.model_sizes.contains(&self.resident_size)
    }
}

/// Name-indexed collection of every application in a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationRegistry {
    apps: Vec<Application>,
    by_name: HashMap<String, AppId>,
}

impl ApplicationRegistry {
    /// Build a registry. Later duplicates of a name shadow earlier ones in
    /// lookups; config validation rejects duplicates before this point.
    pub fn new(apps: Vec<Application>) -> Self {
        let by_name = apps
            .iter()
            .enumerate()
            .map(|(i, app)| (app.name.clone(), AppId(i)))
            .collect();
        Self { apps, by_name }
    }

    pub fn lookup(&self, name: &str) -> Option<AppId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: AppId) -> &Application {
        &self.apps[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: AppId) -> &mut Application {
        &mut self.apps[id.0]
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AppId, &Application)> {
        self.apps.iter().enumerate().map(|(i, app)| (AppId(i), app))
    }

    /// Sum of resident sizes across all applications.
    pub fn total_resident(&self) -> u64 {
        self.apps.iter().map(|a| a.resident_size).sum()
    }
}
