use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use aris_controller::config::ControllerConfig;
use aris_controller::PixelRect;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "ARIS_CONFIG",
        "ARIS_CHANNEL_ADDR",
        "ARIS_CAMERA_URL",
        "ARIS_CONFIDENCE",
        "ARIS_STOP_DISTANCE",
        "ARIS_PROCEED_TIMEOUT_SECS",
        "ARIS_ZONES",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_match_the_workcell_layout() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = ControllerConfig::load().expect("load defaults");

    assert_eq!(cfg.channel.addr, "0.0.0.0:20002");
    assert_eq!(cfg.camera.url, "stub://workcell");
    assert_eq!(cfg.confidence, 0.7);
    let names: Vec<&str> = cfg.zones.iter().map(|zone| zone.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B", "C"]);
    assert_eq!(cfg.zones[0].region, PixelRect::new(455.0, 65.0, 550.0, 160.0));
    assert_eq!(cfg.zones[0].dwell, Duration::from_secs(2));
    assert_eq!(cfg.seal_region, PixelRect::new(450.0, 230.0, 560.0, 340.0));
    assert_eq!(cfg.trash_region, PixelRect::new(100.0, 20.0, 520.0, 210.0));
    assert_eq!(cfg.safety.stop_distance, 50.0);
    assert_eq!(cfg.safety.sentinel_distance, 300.0);
    assert_eq!(cfg.task.proceed_timeout, Duration::from_secs(60));
    assert!(cfg.calibration.fit().is_ok());

    clear_env();
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "channel": { "addr": "127.0.0.1:21000", "read_timeout_secs": 4 },
        "camera": { "url": "stub://bench", "target_fps": 10, "width": 800, "height": 600 },
        "detector": { "confidence": 0.5 },
        "zones": [
            { "name": "A", "x": 400, "y": 60, "w": 100, "h": 100, "dwell_secs": 1.5 },
            { "name": "B", "x": 300, "y": 60, "w": 100, "h": 100 }
        ],
        "trash_region": { "x1": 0, "y1": 0, "x2": 640, "y2": 200 },
        "safety": { "stop_distance": 40, "sentinel_distance": 250 },
        "task": { "sealing_timeout_secs": 8, "poll_interval_ms": 50 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("ARIS_CONFIG", file.path());
    std::env::set_var("ARIS_CAMERA_URL", "stub://override");
    std::env::set_var("ARIS_PROCEED_TIMEOUT_SECS", "30");
    std::env::set_var("ARIS_ZONES", "B");
    std::env::set_var("ARIS_CONFIDENCE", "  ");

    let cfg = ControllerConfig::load().expect("load config");

    assert_eq!(cfg.channel.addr, "127.0.0.1:21000");
    assert_eq!(cfg.channel.read_timeout, Duration::from_secs(4));
    assert_eq!(cfg.camera.url, "stub://override");
    assert_eq!(cfg.camera.target_fps, 10);
    assert_eq!(cfg.camera.width, 800);
    assert_eq!(cfg.confidence, 0.5);
    assert_eq!(cfg.zones.len(), 1);
    assert_eq!(cfg.zones[0].name, "B");
    assert_eq!(cfg.zones[0].dwell, Duration::from_secs(2));
    assert_eq!(cfg.trash_region, PixelRect::new(0.0, 0.0, 640.0, 200.0));
    assert_eq!(cfg.safety.stop_distance, 40.0);
    assert_eq!(cfg.task.proceed_timeout, Duration::from_secs(30));
    assert_eq!(cfg.task.sealing_timeout, Duration::from_secs(8));
    assert_eq!(cfg.task.poll_interval, Duration::from_millis(50));
    assert_eq!(cfg.build_zones().len(), 1);

    clear_env();
}

#[test]
fn toml_files_are_accepted() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let body = r#"
[channel]
addr = "127.0.0.1:20100"

[[zones]]
name = "slot_1"
x = 10.0
y = 10.0
w = 50.0
h = 50.0
dwell_secs = 0.5

[calibration]
pixel = [[0.0, 0.0], [100.0, 0.0], [100.0, 100.0], [0.0, 100.0]]
world = [[0.0, 0.0], [50.0, 0.0], [50.0, 50.0], [0.0, 50.0]]
"#;
    std::io::Write::write_all(&mut file, body.as_bytes()).expect("write config");
    std::env::set_var("ARIS_CONFIG", file.path());

    let cfg = ControllerConfig::load().expect("load toml config");
    assert_eq!(cfg.channel.addr, "127.0.0.1:20100");
    assert_eq!(cfg.zones[0].name, "slot_1");
    assert_eq!(cfg.zones[0].dwell, Duration::from_millis(500));
    assert_eq!(cfg.calibration.pixel.len(), 4);

    clear_env();
}

#[test]
fn rejects_invalid_settings() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cases = [
        r#"{ "detector": { "confidence": 1.5 } }"#,
        r#"{ "safety": { "stop_distance": 300, "sentinel_distance": 300 } }"#,
        r#"{ "zones": [] }"#,
        r#"{ "zones": [ { "name": "bad zone", "x": 0, "y": 0, "w": 10, "h": 10 } ] }"#,
        r#"{ "zones": [ { "name": "A", "x": 0, "y": 0, "w": 10, "h": 10 },
                        { "name": "A", "x": 20, "y": 0, "w": 10, "h": 10 } ] }"#,
        r#"{ "trash_region": { "x1": 50, "y1": 50, "x2": 10, "y2": 10 } }"#,
        r#"{ "calibration": { "pixel": [[0, 0], [1, 1], [2, 2]], "world": [[0, 0], [1, 1], [2, 2]] } }"#,
        r#"{ "channel": { "addr": "not-an-address" } }"#,
        r#"{ "task": { "proceed_timeout_secs": -1 } }"#,
    ];
    for body in cases {
        let mut file = NamedTempFile::new().expect("temp config");
        std::io::Write::write_all(&mut file, body.as_bytes()).expect("write config");
        std::env::set_var("ARIS_CONFIG", file.path());
        assert!(ControllerConfig::load().is_err(), "accepted {}", body);
    }

    clear_env();
}

#[test]
fn rejects_bad_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("ARIS_CONFIDENCE", "high");
    assert!(ControllerConfig::load().is_err());
    clear_env();

    std::env::set_var("ARIS_ZONES", "A,D");
    let err = ControllerConfig::load().unwrap_err();
    assert!(err.to_string().contains("unknown zone 'D'"));

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("ARIS_CONFIG", "/nonexistent/aris.json");
    let err = ControllerConfig::load().unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));

    clear_env();
}
