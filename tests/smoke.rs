use std::path::PathBuf;

use chrono::NaiveDate;
use serde_json::json;

use livesync::config::Config;
use livesync::engine::{SyncEngine, SyncState};
use livesync::filter::{self, RangeSelector};
use livesync::record::Person;
use livesync::report::{PersonSync, Report, ReportMetadata};
use livesync::transport::TransportKind;

fn config_in(dir: &tempfile::TempDir, endpoint: Option<&str>) -> Config {
    Config {
        endpoint: endpoint.map(str::to_string),
        cache_dir: dir.path().join("cache"),
        ..Config::default()
    }
}

#[test]
fn file_endpoint_runs_offline() {
    let dir = tempfile::tempdir().unwrap();
    let engine = SyncEngine::from_config(&config_in(&dir, Some("file:///srv/index.html"))).unwrap();
    assert!(!engine.is_remote_enabled());

    let report = tokio_test::block_on(async {
        engine.bootstrap();
        engine
            .record_live(Person::Oumiya, &json!({"date": "2024-03-06", "viewers": "15"}))
            .await;
        engine.sync_all().await
    });
    assert!(report.skipped);
    assert_eq!(engine.state(Person::Oumiya), SyncState::Stale);
    assert!(dir.path().join("cache/liveData_local_fallback_v1.json").exists());
}

#[test]
fn http_endpoint_enables_configured_transport() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(&dir, Some("https://script.example/exec"));
    config.transport = TransportKind::CallbackBridge;
    let engine = SyncEngine::from_config(&config).unwrap();
    assert!(engine.is_remote_enabled());
    assert_eq!(engine.transport_name(), Some("callback_bridge"));
}

#[test]
fn config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path: PathBuf = dir.path().join("livesync.toml");
    std::fs::write(
        &path,
        "endpoint = \"http://127.0.0.1:8080/exec\"\ntransport = \"post\"\ntimeout_ms = 2500\n",
    )
    .unwrap();
    let config = Config::from_file(&path).unwrap().unwrap();
    assert_eq!(config.transport, TransportKind::Post);
    assert_eq!(config.timeout().as_millis(), 2500);
    assert!(Config::from_file(&dir.path().join("missing.toml")).unwrap().is_none());
}

#[test]
fn dashboard_report_serializes() {
    let dir = tempfile::tempdir().unwrap();
    let engine = SyncEngine::from_config(&config_in(&dir, None)).unwrap();
    engine.bootstrap();
    tokio_test::block_on(engine.record_live(
        Person::Abdoulaye,
        &json!({"date": "2024-03-05", "time": "20:00", "revenue": 12.345}),
    ));

    let today = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();
    let range = filter::range_for(RangeSelector::Week, None, None, today);
    let view = filter::dashboard(&engine.snapshot(), range, &[Person::Abdoulaye]);
    let report = Report::success(
        view,
        ReportMetadata {
            command: "dashboard".to_string(),
            transport: engine.transport_name(),
            sync: vec![PersonSync {
                person: Person::Abdoulaye,
                state: engine.state(Person::Abdoulaye),
            }],
            notices: Vec::new(),
            duration_seconds: 0.25,
        },
    );

    let parsed: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();
    assert_eq!(parsed["status"], "success");
    assert_eq!(parsed["data"]["entries"].as_array().unwrap().len(), 1);
    assert_eq!(parsed["data"]["entries"][0]["totals"]["revenue"], 12.345);
    assert_eq!(parsed["metadata"]["transport"], serde_json::Value::Null);
    assert_eq!(parsed["metadata"]["sync"][0]["state"], "stale");
    assert!(parsed["metadata"]["duration_seconds"].is_f64());
}
