//! Reporting for simulation runs.
//!
//! Projects each application's observation history into flat report rows,
//! builds per-application memory usage step series, and aggregates the
//! run-wide [`SimulationSummary`].

use crate::application::{Application, Observation};
use crate::engine::{Scheduler, TraceRecord};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

/// One row of the tabular report. Requested rows carry the request and
/// finish columns; eviction rows carry only the eviction column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub app: String,
    pub requested_time: Option<f64>,
    pub finish_time: Option<f64>,
    pub evicted_time: Option<f64>,
    pub allocated_memory: u64,
    pub best_model: u64,
}

impl ReportRow {
    fn from_observation(app: &Application, observation: &Observation) -> Self {
        let (requested_time, finish_time, evicted_time) = match *observation {
            Observation::Requested {
                time, finish_time, ..
            } => (Some(time), finish_time, None),
            Observation::Evicted { time } => (None, None, Some(time)),
        };
        Self {
            app: app.name().to_string(),
            requested_time,
            finish_time,
            evicted_time,
            allocated_memory: observation.allocated(),
            best_model: app.best_model(),
        }
    }

    fn sort_time(&self) -> f64 {
        self.requested_time.or(self.evicted_time).unwrap_or(0.0)
    }
}

/// Rows for every observation of every application, stably ordered by the
/// time of the observation.
pub fn build_report(scheduler: &Scheduler) -> Vec<ReportRow> {
    let mut rows: Vec<ReportRow> = scheduler
        .registry()
        .iter()
        .flat_map(|(_, app)| {
            app.observations()
                .iter()
                .map(move |o| ReportRow::from_observation(app, o))
        })
        .collect();
    rows.sort_by(|a, b| a.sort_time().total_cmp(&b.sort_time()));
    rows
}

/// Latest request time across the whole report, or 0 if nothing was requested.
pub fn report_horizon(rows: &[ReportRow]) -> f64 {
    rows.iter()
        .filter_map(|r| r.requested_time)
        .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |m| m.max(t))))
        .unwrap_or(0.0)
}

/// Step series of an application's allocated memory: starts at `(0, 0)`,
/// one point per observation, closed at `horizon` with the final residency.
pub fn memory_usage_series(app: &Application, horizon: f64) -> Vec<(f64, u64)> {
    let mut series = Vec::with_capacity(app.observations().len() + 2);
    series.push((0.0, 0));
    series.extend(app.observations().iter().map(|o| (o.time(), o.allocated())));
    series.push((horizon, app.resident_size()));
    series
}

/// One point of an application's memory usage step series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsagePoint {
    pub app: String,
    pub time: f64,
    pub allocated: u64,
}

/// Usage series of every application, closed at the report horizon.
pub fn usage_report(scheduler: &Scheduler) -> Vec<UsagePoint> {
    let horizon = report_horizon(&build_report(scheduler));
    scheduler
        .registry()
        .iter()
        .flat_map(|(_, app)| {
            memory_usage_series(app, horizon)
                .into_iter()
                .map(move |(time, allocated)| UsagePoint {
                    app: app.name().to_string(),
                    time,
                    allocated,
                })
        })
        .collect()
}

/// Per-application aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSummary {
    pub name: String,
    pub best_model: u64,
    pub requests: u64,
    pub misses: u64,
    pub evictions: u64,
    pub final_resident: u64,
    /// Requests served by the best model.
    pub best_model_share: f64,
}

impl AppSummary {
    fn from_app(app: &Application) -> Self {
        let mut requests = 0u64;
        let mut misses = 0u64;
        let mut best = 0u64;
        let mut evictions = 0u64;
        for observation in app.observations() {
            match observation {
                Observation::Requested { allocated, .. } => {
                    requests += 1;
                    if *allocated == 0 {
                        misses += 1;
                    } else if *allocated == app.best_model() {
                        best += 1;
                    }
                }
                Observation::Evicted { .. } => evictions += 1,
            }
        }
        Self {
            name: app.name().to_string(),
            best_model: app.best_model(),
            requests,
            misses,
            evictions,
            final_resident: app.resident_size(),
            best_model_share: if requests > 0 {
                best as f64 / requests as f64
            } else {
                0.0
            },
        }
    }
}

/// Aggregated results for an entire simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub name: String,
    pub capacity: u64,
    pub window: f64,
    pub events_processed: u64,
    pub total_requests: u64,
    pub admitted: u64,
    pub missed: u64,
    pub miss_rate: f64,
    pub warm_hits: u64,
    pub evictions: u64,
    pub coalesced: u64,
    /// Memory in use when the queue drained.
    pub final_used: u64,
    /// Largest memory in use after any event.
    pub peak_used: u64,
    pub per_app: Vec<AppSummary>,
}

impl SimulationSummary {
    pub fn from_scheduler(scheduler: &Scheduler) -> Self {
        let counters = scheduler.counters();
        let capacity = scheduler.memory().capacity();
        let peak_free_low = scheduler
            .trace()
            .iter()
            .map(|r| r.free_after)
            .min()
            .unwrap_or(capacity);
        Self {
            name: scheduler.name().to_string(),
            capacity,
            window: scheduler.window(),
            events_processed: counters.events_processed,
            total_requests: counters.requests,
            admitted: counters.admitted,
            missed: counters.missed,
            miss_rate: if counters.requests > 0 {
                counters.missed as f64 / counters.requests as f64
            } else {
                0.0
            },
            warm_hits: counters.warm_hits,
            evictions: counters.evictions,
            coalesced: counters.coalesced,
            final_used: scheduler.memory().used(),
            peak_used: capacity - peak_free_low,
            per_app: scheduler
                .registry()
                .iter()
                .map(|(_, app)| AppSummary::from_app(app))
                .collect(),
        }
    }
}

/// Format a summary as a pretty-printed table string.
pub fn format_table(summary: &SimulationSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("\n{:=<70}\n", format!("  {} Results  ", summary.name)));
    out.push_str(&format!(
        "  Capacity: {} | Window: {:.1} | Events: {}\n",
        summary.capacity, summary.window, summary.events_processed
    ));
    out.push_str(&format!("{:-<70}\n", "  Requests  "));
    out.push_str(&format!(
        "  Total: {}  Admitted: {}  Missed: {} ({:.1}%)\n",
        summary.total_requests,
        summary.admitted,
        summary.missed,
        summary.miss_rate * 100.0
    ));
    out.push_str(&format!(
        "  Warm hits: {}  Coalesced: {}  Evictions: {}\n",
        summary.warm_hits, summary.coalesced, summary.evictions
    ));
    out.push_str(&format!("{:-<70}\n", "  Memory  "));
    out.push_str(&format!(
        "  Peak used: {}  Final used: {}\n",
        summary.peak_used, summary.final_used
    ));
    out.push_str(&format!("{:-<70}\n", "  Applications  "));
    out.push_str(&format!(
        "  {:<18} {:>6} {:>8} {:>7} {:>7} {:>8} {:>6}\n",
        "App", "Best", "Requests", "Missed", "Evicted", "Best%", "Final"
    ));
    for app in &summary.per_app {
        out.push_str(&format!(
            "  {:<18} {:>6} {:>8} {:>7} {:>7} {:>7.1}% {:>6}\n",
            app.name,
            app.best_model,
            app.requests,
            app.misses,
            app.evictions,
            app.best_model_share * 100.0,
            app.final_resident,
        ));
    }
    out.push_str(&format!("{:=<70}\n", ""));
    out
}

fn opt_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write report rows as CSV. Absent values are empty cells.
pub fn write_report_csv(rows: &[ReportRow], path: &Path) -> Result<(), ReportError> {
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    writeln!(
        writer,
        "app,requested_times,finish_times,evicted_times,allocated_memory,best_model"
    )?;
    for row in rows {
        writeln!(
            writer,
            "{},{},{},{},{},{}",
            row.app,
            opt_cell(row.requested_time),
            opt_cell(row.finish_time),
            opt_cell(row.evicted_time),
            row.allocated_memory,
            row.best_model,
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Write usage points as `app,time,allocated` CSV.
pub fn write_usage_csv(points: &[UsagePoint], path: &Path) -> Result<(), ReportError> {
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    writeln!(writer, "app,time,allocated")?;
    for point in points {
        writeln!(writer, "{},{},{}", point.app, point.time, point.allocated)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the summary as pretty JSON.
pub fn write_summary_json(summary: &SimulationSummary, path: &Path) -> Result<(), ReportError> {
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Write the trace log, one record per line.
pub fn write_trace_log(records: &[TraceRecord], path: &Path) -> Result<(), ReportError> {
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    for record in records {
        writeln!(writer, "{}", record)?;
    }
    writer.flush()?;
    Ok(())
}
