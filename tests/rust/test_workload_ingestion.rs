/// Integration tests for workload ingestion and reporting output.
use memsim_core::config::SimConfig;
use memsim_core::engine::Scheduler;
use memsim_core::report;
use memsim_core::workload::{self, Arrival, GeneratorSpec};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn sample_arrivals() -> Vec<Arrival> {
    vec![
        Arrival {
            app: "chat".to_string(),
            request_time: 1.5,
        },
        Arrival {
            app: "vision".to_string(),
            request_time: 0.25,
        },
    ]
}

fn sample_config() -> SimConfig {
    SimConfig::from_str(
        r#"
[simulation]
name = "ingestion-test"
seed = 9

[memory]
capacity = 8
window = 1.0

[[applications]]
name = "chat"
model_sizes = [2, 8]

[[applications]]
name = "vision"
model_sizes = [3, 6]

[workload]
rate = 0.2
duration = 40.0
"#,
    )
    .unwrap()
}

#[test]
fn test_write_and_read_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("workload.csv");

    workload::write_csv(&sample_arrivals(), &path).unwrap();
    let loaded = workload::load_workload(&path, "csv").unwrap();
    assert_eq!(loaded, sample_arrivals());
}

#[test]
fn test_write_and_read_compact_jsonl() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("workload.jsonl");

    workload::write_compact_jsonl(&sample_arrivals(), &path).unwrap();
    let loaded = workload::load_workload(&path, "compact_jsonl").unwrap();
    assert_eq!(loaded, sample_arrivals());
}

#[test]
fn test_invalid_format() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("workload.csv");
    workload::write_csv(&sample_arrivals(), &path).unwrap();
    assert!(workload::load_workload(&path, "parquet").is_err());
}

#[test]
fn test_missing_file() {
    let result = workload::load_workload(std::path::Path::new("does/not/exist.csv"), "csv");
    assert!(matches!(result, Err(workload::WorkloadError::Io(_))));
}

#[test]
fn test_generated_workload_runs() {
    let config = sample_config();
    let spec = GeneratorSpec::from_config(&config);
    let arrivals =
        workload::generate(&spec, &mut ChaCha8Rng::seed_from_u64(config.simulation.seed))
            .unwrap();
    assert!(arrivals.iter().all(|a| a.app == "chat" || a.app == "vision"));

    let summary = memsim_core::run_simulation(&config, &arrivals).unwrap();
    assert_eq!(
        summary.total_requests + summary.coalesced,
        arrivals.len() as u64
    );
}

#[test]
fn test_report_files_written() {
    let config = sample_config();
    let dir = tempfile::tempdir().unwrap();

    let mut scheduler = Scheduler::new(&config);
    scheduler
        .load_workload(&[
            Arrival {
                app: "chat".to_string(),
                request_time: 0.0,
            },
            Arrival {
                app: "vision".to_string(),
                request_time: 5.0,
            },
        ])
        .unwrap();
    let summary = scheduler.run().unwrap();

    let csv_path = dir.path().join("report.csv");
    let rows = report::build_report(&scheduler);
    report::write_report_csv(&rows, &csv_path).unwrap();
    let csv = std::fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
        lines[0],
        "app,requested_times,finish_times,evicted_times,allocated_memory,best_model"
    );
    // chat holds 8 until vision evicts it at 4 and takes its best model.
    assert_eq!(lines[1], "chat,-1,1,,8,8");
    assert_eq!(lines[2], "chat,,,4,0,8");
    assert_eq!(lines[3], "vision,4,6,,6,6");

    let json_path = dir.path().join("summary.json");
    report::write_summary_json(&summary, &json_path).unwrap();
    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(parsed["name"], "ingestion-test");
    assert_eq!(parsed["evictions"], 1);

    let log_path = dir.path().join("trace.log");
    report::write_trace_log(scheduler.trace(), &log_path).unwrap();
    let log = std::fs::read_to_string(&log_path).unwrap();
    assert_eq!(log.lines().count(), 4);
    assert!(log.lines().next().unwrap().starts_with("STARTED"));
}

#[test]
fn test_usage_series_written() {
    let config = sample_config();
    let dir = tempfile::tempdir().unwrap();

    let mut scheduler = Scheduler::new(&config);
    scheduler
        .load_workload(&[
            Arrival {
                app: "chat".to_string(),
                request_time: 0.0,
            },
            Arrival {
                app: "vision".to_string(),
                request_time: 5.0,
            },
        ])
        .unwrap();
    scheduler.run().unwrap();

    let path = dir.path().join("usage.csv");
    let points = report::usage_report(&scheduler);
    report::write_usage_csv(&points, &path).unwrap();

    let csv = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "app,time,allocated");
    // Horizon is the latest request (vision at 4).
    assert_eq!(
        &lines[1..],
        &[
            "chat,0,0",
            "chat,-1,8",
            "chat,4,0",
            "chat,4,0",
            "vision,0,0",
            "vision,4,6",
            "vision,4,6",
        ]
    );
}

#[test]
fn test_csv_with_typo_in_first_row_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("typo.csv");
    std::fs::write(&path, "chat,1O\nchat,2\n").unwrap();

    let result = workload::load_workload(&path, "csv");
    assert!(matches!(
        result,
        Err(workload::WorkloadError::CsvParse { line: 1, .. })
    ));
}
