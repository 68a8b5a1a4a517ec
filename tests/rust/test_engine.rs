/// Integration tests for the simulation engine.
use memsim_core::config::SimConfig;
use memsim_core::engine::Scheduler;
use memsim_core::workload::Arrival;
use memsim_core::{AppStatus, EventKind, Observation};

fn config(capacity: u64, window: f64, apps: &[(&str, &[u64])]) -> SimConfig {
    let mut toml = format!(
        "[simulation]\nname = \"integration-test\"\n\n[memory]\ncapacity = {}\nwindow = {:?}\n",
        capacity, window
    );
    for (name, sizes) in apps {
        toml.push_str(&format!(
            "\n[[applications]]\nname = \"{}\"\nmodel_sizes = {:?}\n",
            name, sizes
        ));
    }
    SimConfig::from_str(&toml).unwrap()
}

fn arrivals(items: &[(&str, f64)]) -> Vec<Arrival> {
    items
        .iter()
        .map(|(app, t)| Arrival {
            app: app.to_string(),
            request_time: *t,
        })
        .collect()
}

fn mixed_workload(n: usize) -> Vec<Arrival> {
    let apps = ["chat", "vision", "speech", "code"];
    (0..n)
        .map(|i| Arrival {
            app: apps[(i * 7 + i / 3) % apps.len()].to_string(),
            request_time: (i as f64) * 0.75,
        })
        .collect()
}

fn mixed_config() -> SimConfig {
    config(
        16,
        1.0,
        &[
            ("chat", &[2, 4, 8]),
            ("vision", &[3, 6]),
            ("speech", &[1, 2, 4]),
            ("code", &[4, 10]),
        ],
    )
}

#[test]
fn test_scenario_a_best_model_fits() {
    let cfg = config(10, 2.0, &[("app", &[4, 8])]);
    let mut sched = Scheduler::new(&cfg);
    sched.load_workload(&arrivals(&[("app", 5.0)])).unwrap();
    sched.step().unwrap();

    let id = sched.resolve("app").unwrap();
    let app = sched.registry().get(id);
    assert_eq!(app.resident_size(), 8);
    assert_eq!(app.status(), AppStatus::Aggressive);

    let pending = sched.pending_finish_events(id);
    assert_eq!(pending.len(), 1);
    // STARTED at 5 - 2 = 3, FINISHED at 3 + 2 * 2.
    assert_eq!(pending[0].time, 7.0);
}

#[test]
fn test_scenario_a_falls_back_when_best_does_not_fit() {
    let cfg = config(10, 1.0, &[("pinned", &[3]), ("app", &[4, 8])]);
    let mut sched = Scheduler::new(&cfg);
    sched
        .load_workload(&arrivals(&[("pinned", 0.0), ("app", 0.5)]))
        .unwrap();
    sched.step().unwrap();
    sched.step().unwrap();

    let app = sched.registry().get(sched.resolve("app").unwrap());
    assert_eq!(app.resident_size(), 4);
    assert_eq!(app.status(), AppStatus::Aggressive);
    assert_eq!(sched.memory().free(), 3);
}

#[test]
fn test_scenario_b_active_application_is_never_evicted() {
    let cfg = config(10, 1.0, &[("app1", &[8]), ("app2", &[1, 6])]);
    let mut sched = Scheduler::new(&cfg);
    sched
        .load_workload(&arrivals(&[("app1", 0.0), ("app2", 0.5)]))
        .unwrap();
    sched.step().unwrap();
    sched.step().unwrap();

    let reg = sched.registry();
    let app1 = reg.get(reg.lookup("app1").unwrap());
    let app2 = reg.get(reg.lookup("app2").unwrap());
    assert_eq!(app1.resident_size(), 8);
    assert_eq!(app1.status(), AppStatus::Aggressive);
    assert!(app1.observations().iter().all(|o| !matches!(o, Observation::Evicted { .. })));
    assert_eq!(app2.resident_size(), 1);
    assert_eq!(sched.counters().evictions, 0);
}

#[test]
fn test_scenario_b_records_miss_when_nothing_fits() {
    let cfg = config(10, 1.0, &[("app1", &[8]), ("app2", &[3, 6])]);
    let mut sched = Scheduler::new(&cfg);
    sched
        .load_workload(&arrivals(&[("app1", 0.0), ("app2", 0.5)]))
        .unwrap();
    let summary = sched.run().unwrap();

    assert_eq!(summary.missed, 1);
    let app2 = sched.registry().get(sched.resolve("app2").unwrap());
    assert_eq!(app2.resident_size(), 0);
    assert_eq!(app2.status(), AppStatus::Minimal);
}

#[test]
fn test_scenario_c_warm_application_is_evicted() {
    let cfg = config(8, 1.0, &[("app1", &[8]), ("app2", &[8])]);
    let mut sched = Scheduler::new(&cfg);
    sched
        .load_workload(&arrivals(&[("app1", 0.0), ("app2", 10.0)]))
        .unwrap();
    sched.run().unwrap();

    let reg = sched.registry();
    let app1 = reg.get(reg.lookup("app1").unwrap());
    let app2 = reg.get(reg.lookup("app2").unwrap());
    assert_eq!(app1.resident_size(), 0);
    assert_eq!(app1.evict_time(), Some(9.0));
    assert_eq!(
        app1.observations().last(),
        Some(&Observation::Evicted { time: 9.0 })
    );
    assert_eq!(app1.observations().last().unwrap().allocated(), 0);
    assert_eq!(app2.resident_size(), 8);
    assert_eq!(sched.memory().free(), 0);
}

#[test]
fn test_scenario_d_repeat_request_extends_window() {
    let cfg = config(10, 2.0, &[("app1", &[4])]);
    let mut sched = Scheduler::new(&cfg);
    // First STARTED at 0, finish T = 4. Second STARTED at T - 1 = 3.
    sched
        .load_workload(&arrivals(&[("app1", 2.0), ("app1", 5.0)]))
        .unwrap();
    sched.step().unwrap();
    let id = sched.resolve("app1").unwrap();
    assert_eq!(sched.registry().get(id).finish_time(), Some(4.0));

    let free_before = sched.memory().free();
    let record = sched.step().unwrap().unwrap().clone();
    assert_eq!(record.kind, EventKind::Started);
    assert_eq!(record.time, 3.0);

    let app = sched.registry().get(id);
    assert_eq!(app.status(), AppStatus::Aggressive);
    assert_eq!(app.finish_time(), Some(7.0));
    assert_eq!(sched.memory().free(), free_before);

    let pending = sched.pending_finish_events(id);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].time, 7.0);

    // Overwritten, not appended.
    assert_eq!(
        app.observations(),
        &[Observation::Requested {
            time: 0.0,
            finish_time: Some(7.0),
            allocated: 4
        }]
    );
    assert_eq!(sched.counters().coalesced, 1);
}

#[test]
fn test_finished_for_idle_application_only_touches_status() {
    let cfg = config(10, 1.0, &[("app", &[4])]);
    let mut sched = Scheduler::new(&cfg);
    let id = sched.resolve("app").unwrap();
    sched.schedule_event(memsim_core::Event::finished(1.0, id));
    sched.step().unwrap();

    let app = sched.registry().get(id);
    assert_eq!(app.status(), AppStatus::Minimal);
    assert_eq!(app.resident_size(), 0);
    assert!(app.observations().is_empty());
    assert_eq!(sched.memory().free(), 10);
}

#[test]
fn test_replay_is_deterministic() {
    let cfg = mixed_config();
    let workload = mixed_workload(200);

    let mut first = Scheduler::new(&cfg);
    first.load_workload(&workload).unwrap();
    let summary_a = first.run().unwrap();

    let mut second = Scheduler::new(&cfg);
    second.load_workload(&workload).unwrap();
    let summary_b = second.run().unwrap();

    assert_eq!(first.trace(), second.trace());
    for ((_, a), (_, b)) in first.registry().iter().zip(second.registry().iter()) {
        assert_eq!(a.observations(), b.observations());
    }
    assert_eq!(summary_a.missed, summary_b.missed);
    assert_eq!(first.counters(), second.counters());
}

#[test]
fn test_every_arrival_is_accounted_for() {
    let cfg = mixed_config();
    let workload = mixed_workload(300);
    let summary = memsim_core::run_simulation(&cfg, &workload).unwrap();
    assert_eq!(
        summary.total_requests + summary.coalesced,
        workload.len() as u64
    );
    assert_eq!(summary.admitted + summary.missed, summary.total_requests);
    assert!(summary.events_processed >= workload.len() as u64);
}

#[test]
fn test_unknown_application_aborts() {
    let cfg = mixed_config();
    let result = memsim_core::run_simulation(&cfg, &arrivals(&[("nope", 1.0)]));
    assert!(matches!(
        result,
        Err(memsim_core::SimError::UnknownApplication { .. })
    ));
}

#[test]
fn test_format_table_after_run() {
    let summary = memsim_core::run_simulation(&mixed_config(), &mixed_workload(40)).unwrap();
    let table = memsim_core::report::format_table(&summary);
    assert!(table.contains("integration-test"));
    assert!(table.contains("Evictions"));
}
