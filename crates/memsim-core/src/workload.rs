//! Workload ingestion and generation for MemSim.
//!
//! Supports two input formats:
//! - **CSV**: `app,request_time` per line, optionally preceded by exactly that
//!   header row.
//! - **Compact JSONL**: one `{"app": "...", "ts": 12.5}` object per line.
//!
//! Arrival order is kept as given; the event queue orders by time.

use crate::config::SimConfig;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkloadError {
    #[error("Failed to read workload file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse JSON at line {line}: {source}")]
    JsonParse {
        line: usize,
        source: serde_json::Error,
    },
    #[error("Malformed CSV at line {line}: {reason}")]
    CsvParse { line: usize, reason: String },
    #[error("Unsupported workload format: {0}")]
    UnsupportedFormat(String),
    #[error("Invalid generator parameters: {0}")]
    InvalidGenerator(String),
}

/// A single request for an application at a nominal time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arrival {
    pub app: String,
    pub request_time: f64,
}

/// A compact JSONL workload record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CompactRecord {
    app: String,
    ts: f64,
}

/// Load a workload from a file.
pub fn load_workload(path: &Path, format: &str) -> Result<Vec<Arrival>, WorkloadError> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    match format {
        "csv" => parse_csv(reader),
        "compact_jsonl" | "jsonl" => parse_compact_jsonl(reader),
        other => Err(WorkloadError::UnsupportedFormat(other.to_string())),
    }
}

const CSV_HEADER: [&str; 2] = ["app", "request_time"];

/// Parse a CSV workload from any reader.
pub fn parse_csv<R: Read>(reader: BufReader<R>) -> Result<Vec<Arrival>, WorkloadError> {
    let mut arrivals = Vec::new();
    let mut first_row = true;
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let is_first_row = std::mem::replace(&mut first_row, false);

        let mut fields = trimmed.split(',').map(str::trim);
        let (app, time) = match (fields.next(), fields.next()) {
            (Some(app), Some(time)) if !app.is_empty() => (app, time),
            _ => {
                return Err(WorkloadError::CsvParse {
                    line: line_num + 1,
                    reason: "expected `app,request_time`".to_string(),
                })
            }
        };

        match time.parse::<f64>() {
            Ok(request_time) if request_time.is_finite() => arrivals.push(Arrival {
                app: app.to_string(),
                request_time,
            }),
            Err(_) if is_first_row && is_csv_header(app, time) => continue,
            _ => {
                return Err(WorkloadError::CsvParse {
                    line: line_num + 1,
                    reason: format!("invalid request time `{}`", time),
                })
            }
        }
    }
    Ok(arrivals)
}

fn is_csv_header(app: &str, time: &str) -> bool {
    app.eq_ignore_ascii_case(CSV_HEADER[0]) && time.eq_ignore_ascii_case(CSV_HEADER[1])
}

/// Parse compact JSONL from any reader.
pub fn parse_compact_jsonl<R: Read>(reader: BufReader<R>) -> Result<Vec<Arrival>, WorkloadError> {
    let mut arrivals = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let record: CompactRecord =
            serde_json::from_str(trimmed).map_err(|e| WorkloadError::JsonParse {
                line: line_num + 1,
                source: e,
            })?;
        arrivals.push(Arrival {
            app: record.app,
            request_time: record.ts,
        });
    }
    Ok(arrivals)
}

/// Write arrivals as CSV with a header row.
pub fn write_csv(arrivals: &[Arrival], path: &Path) -> Result<(), WorkloadError> {
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    writeln!(writer, "{}", CSV_HEADER.join(","))?;
    for arrival in arrivals {
        writeln!(writer, "{},{}", arrival.app, arrival.request_time)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write arrivals as compact JSONL.
pub fn write_compact_jsonl(arrivals: &[Arrival], path: &Path) -> Result<(), WorkloadError> {
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    for arrival in arrivals {
        let record = serde_json::json!({
            "app": arrival.app,
            "ts": arrival.request_time,
        });
        serde_json::to_writer(&mut writer, &record)
            .map_err(|e| WorkloadError::JsonParse { line: 0, source: e })?;
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// Parameters for synthetic workload generation.
#[derive(Debug, Clone)]
pub struct GeneratorSpec {
    pub apps: Vec<String>,
    /// Mean requests per time unit, per application.
    pub rate: f64,
    /// Arrivals fall in `[0, duration)`.
    pub duration: f64,
}

impl GeneratorSpec {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            apps: config.app_names().into_iter().map(String::from).collect(),
            rate: config.workload.rate,
            duration: config.workload.duration,
        }
    }

    /// Reject parameters the sampling loop cannot terminate on.
    pub fn validate(&self) -> Result<(), WorkloadError> {
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return Err(WorkloadError::InvalidGenerator(format!(
                "rate must be positive and finite, got {}",
                self.rate
            )));
        }
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(WorkloadError::InvalidGenerator(format!(
                "duration must be non-negative and finite, got {}",
                self.duration
            )));
        }
        Ok(())
    }
}

/// Generate a Poisson workload: exponential inter-arrival gaps per
/// application, merged and sorted by request time. Times are rounded before
/// the bound check, so every arrival lies in `[0, duration)`.
pub fn generate<R: Rng>(
    spec: &GeneratorSpec,
    rng: &mut R,
) -> Result<Vec<Arrival>, WorkloadError> {
    spec.validate()?;
    let mut arrivals = Vec::new();
    for app in &spec.apps {
        let mut t = 0.0;
        loop {
            // 1 - U lies in (0, 1], so the log is finite.
            let u: f64 = rng.gen();
            t += -(1.0 - u).ln() / spec.rate;
            let request_time = round_time(t);
            if request_time >= spec.duration {
                break;
            }
            arrivals.push(Arrival {
                app: app.clone(),
                request_time,
            });
        }
    }
    arrivals.sort_by(|a, b| a.request_time.total_cmp(&b.request_time));
    Ok(arrivals)
}

/// Round to 3 decimals so generated files are stable across formats.
fn round_time(t: f64) -> f64 {
    (t * 1000.0).round() / 1000.0
}
