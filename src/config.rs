use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::calibration::{CalibrationSet, MIN_CALIBRATION_POINTS};
use crate::channel::ChannelConfig;
use crate::ingest::SourceConfig;
use crate::perception::{PresenceLatch, ProximityGuard, TrashTracker, Zone};
use crate::task::TaskConfig;
use crate::{PixelPoint, PixelRect, WorldPoint};

const DEFAULT_CHANNEL_ADDR: &str = "0.0.0.0:20002";
const DEFAULT_READ_TIMEOUT_SECS: f64 = 10.0;
const DEFAULT_SEND_RETRIES: u32 = 3;
const DEFAULT_CAMERA_URL: &str = "stub://workcell";
const DEFAULT_CAMERA_FPS: u32 = 15;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CONFIDENCE: f32 = 0.7;
const DEFAULT_DWELL_SECS: f64 = 2.0;
/// Capsule slots A, B, C as (x, y, w, h).
const DEFAULT_ZONES: [(&str, f64, f64, f64, f64); 3] = [
    ("A", 455.0, 65.0, 95.0, 95.0),
    ("B", 360.0, 65.0, 95.0, 95.0),
    ("C", 265.0, 65.0, 95.0, 95.0),
];
const DEFAULT_SEAL_REGION: (f64, f64, f64, f64) = (450.0, 230.0, 110.0, 110.0);
/// Trash region as corner coordinates (x1, y1, x2, y2).
const DEFAULT_TRASH_REGION: (f64, f64, f64, f64) = (100.0, 20.0, 520.0, 210.0);
const DEFAULT_STOP_DISTANCE: f64 = 50.0;
const DEFAULT_SENTINEL_DISTANCE: f64 = 300.0;
const DEFAULT_STABILITY_RADIUS: f64 = 10.0;
const DEFAULT_STABILITY_SECS: f64 = 1.0;
const DEFAULT_PROCEED_TIMEOUT_SECS: f64 = 60.0;
const DEFAULT_SEALING_TIMEOUT_SECS: f64 = 5.0;
const DEFAULT_CAPSULE_TIMEOUT_SECS: f64 = 10.0;
const DEFAULT_TRASH_TIMEOUT_SECS: f64 = 5.0;
const DEFAULT_POLL_INTERVAL_MS: u64 = 200;

#[derive(Debug, Deserialize, Default)]
struct ControllerConfigFile {
    channel: Option<ChannelConfigFile>,
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    zones: Option<Vec<ZoneConfigFile>>,
    seal_region: Option<RectConfigFile>,
    trash_region: Option<RectConfigFile>,
    safety: Option<SafetyConfigFile>,
    trash: Option<TrashConfigFile>,
    calibration: Option<CalibrationConfigFile>,
    task: Option<TaskConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ChannelConfigFile {
    addr: Option<String>,
    read_timeout_secs: Option<f64>,
    send_retries: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ZoneConfigFile {
    name: String,
    x: f64,
    y: f64,
    w: f64,
    h: f64,
    dwell_secs: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RectConfigFile {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
}

#[derive(Debug, Deserialize, Default)]
struct SafetyConfigFile {
    stop_distance: Option<f64>,
    sentinel_distance: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct TrashConfigFile {
    stability_radius: Option<f64>,
    stability_secs: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CalibrationConfigFile {
    pixel: Vec<[f64; 2]>,
    world: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize, Default)]
struct TaskConfigFile {
    proceed_timeout_secs: Option<f64>,
    sealing_timeout_secs: Option<f64>,
    capsule_timeout_secs: Option<f64>,
    trash_timeout_secs: Option<f64>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneSettings {
    pub name: String,
    pub region: PixelRect,
    pub dwell: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SafetySettings {
    pub stop_distance: f64,
    pub sentinel_distance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrashSettings {
    pub stability_radius: f64,
    pub stability_window: Duration,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub channel: ChannelConfig,
    pub camera: SourceConfig,
    pub confidence: f32,
    pub zones: Vec<ZoneSettings>,
    pub seal_region: PixelRect,
    pub trash_region: PixelRect,
    pub safety: SafetySettings,
    pub trash: TrashSettings,
    pub calibration: CalibrationSet,
    pub task: TaskConfig,
}

impl ControllerConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ARIS_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ControllerConfigFile) -> Result<Self> {
        let channel_file = file.channel.unwrap_or_default();
        let channel = ChannelConfig {
            addr: channel_file
                .addr
                .unwrap_or_else(|| DEFAULT_CHANNEL_ADDR.to_string()),
            read_timeout: secs(
                "channel.read_timeout_secs",
                channel_file
                    .read_timeout_secs
                    .unwrap_or(DEFAULT_READ_TIMEOUT_SECS),
            )?,
            send_retries: channel_file.send_retries.unwrap_or(DEFAULT_SEND_RETRIES),
            ..ChannelConfig::default()
        };

        let camera_file = file.camera.unwrap_or_default();
        let camera = SourceConfig {
            url: camera_file
                .url
                .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
            target_fps: camera_file.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            width: camera_file.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
        };

        let confidence = file
            .detector
            .and_then(|detector| detector.confidence)
            .unwrap_or(DEFAULT_CONFIDENCE);

        let zones = match file.zones {
            Some(zones) => zones
                .into_iter()
                .map(|zone| {
                    let dwell = zone.dwell_secs.unwrap_or(DEFAULT_DWELL_SECS);
                    Ok(ZoneSettings {
                        region: PixelRect::from_xywh(zone.x, zone.y, zone.w, zone.h),
                        dwell: secs(&format!("zone {} dwell_secs", zone.name), dwell)?,
                        name: zone.name,
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            None => DEFAULT_ZONES
                .iter()
                .map(|&(name, x, y, w, h)| ZoneSettings {
                    name: name.to_string(),
                    region: PixelRect::from_xywh(x, y, w, h),
                    dwell: Duration::from_secs_f64(DEFAULT_DWELL_SECS),
                })
                .collect(),
        };

        let seal_region = match file.seal_region {
            Some(rect) => PixelRect::new(rect.x1, rect.y1, rect.x2, rect.y2),
            None => {
                let (x, y, w, h) = DEFAULT_SEAL_REGION;
                PixelRect::from_xywh(x, y, w, h)
            }
        };
        let trash_region = match file.trash_region {
            Some(rect) => PixelRect::new(rect.x1, rect.y1, rect.x2, rect.y2),
            None => {
                let (x1, y1, x2, y2) = DEFAULT_TRASH_REGION;
                PixelRect::new(x1, y1, x2, y2)
            }
        };

        let safety_file = file.safety.unwrap_or_default();
        let safety = SafetySettings {
            stop_distance: safety_file.stop_distance.unwrap_or(DEFAULT_STOP_DISTANCE),
            sentinel_distance: safety_file
                .sentinel_distance
                .unwrap_or(DEFAULT_SENTINEL_DISTANCE),
        };

        let trash_file = file.trash.unwrap_or_default();
        let trash = TrashSettings {
            stability_radius: trash_file
                .stability_radius
                .unwrap_or(DEFAULT_STABILITY_RADIUS),
            stability_window: secs(
                "trash.stability_secs",
                trash_file.stability_secs.unwrap_or(DEFAULT_STABILITY_SECS),
            )?,
        };

        let calibration = match file.calibration {
            Some(calibration) => CalibrationSet {
                pixel: calibration
                    .pixel
                    .iter()
                    .map(|&[x, y]| PixelPoint::new(x, y))
                    .collect(),
                world: calibration
                    .world
                    .iter()
                    .map(|&[x, y]| WorldPoint::new(x, y))
                    .collect(),
            },
            None => CalibrationSet::default(),
        };

        let task_file = file.task.unwrap_or_default();
        let task = TaskConfig {
            proceed_timeout: secs(
                "task.proceed_timeout_secs",
                task_file
                    .proceed_timeout_secs
                    .unwrap_or(DEFAULT_PROCEED_TIMEOUT_SECS),
            )?,
            sealing_timeout: secs(
                "task.sealing_timeout_secs",
                task_file
                    .sealing_timeout_secs
                    .unwrap_or(DEFAULT_SEALING_TIMEOUT_SECS),
            )?,
            capsule_timeout: secs(
                "task.capsule_timeout_secs",
                task_file
                    .capsule_timeout_secs
                    .unwrap_or(DEFAULT_CAPSULE_TIMEOUT_SECS),
            )?,
            trash_timeout: secs(
                "task.trash_timeout_secs",
                task_file
                    .trash_timeout_secs
                    .unwrap_or(DEFAULT_TRASH_TIMEOUT_SECS),
            )?,
            poll_interval: Duration::from_millis(
                task_file.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
        };

        Ok(Self {
            channel,
            camera,
            confidence,
            zones,
            seal_region,
            trash_region,
            safety,
            trash,
            calibration,
            task,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_value("ARIS_CHANNEL_ADDR") {
            self.channel.addr = addr;
        }
        if let Some(url) = env_value("ARIS_CAMERA_URL") {
            self.camera.url = url;
        }
        if let Some(confidence) = env_value("ARIS_CONFIDENCE") {
            self.confidence = confidence
                .parse()
                .map_err(|_| anyhow!("ARIS_CONFIDENCE must be a number between 0 and 1"))?;
        }
        if let Some(distance) = env_value("ARIS_STOP_DISTANCE") {
            self.safety.stop_distance = distance
                .parse()
                .map_err(|_| anyhow!("ARIS_STOP_DISTANCE must be a number of pixels"))?;
        }
        if let Some(timeout) = env_value("ARIS_PROCEED_TIMEOUT_SECS") {
            let seconds: f64 = timeout.parse().map_err(|_| {
                anyhow!("ARIS_PROCEED_TIMEOUT_SECS must be a number of seconds")
            })?;
            self.task.proceed_timeout = secs("ARIS_PROCEED_TIMEOUT_SECS", seconds)?;
        }
        if let Some(zones) = env_value("ARIS_ZONES") {
            let enabled = split_csv(&zones);
            for name in &enabled {
                if !self.zones.iter().any(|zone| &zone.name == name) {
                    return Err(anyhow!("ARIS_ZONES names unknown zone '{}'", name));
                }
            }
            if !enabled.is_empty() {
                self.zones.retain(|zone| enabled.contains(&zone.name));
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.channel
            .addr
            .parse::<SocketAddr>()
            .map_err(|e| anyhow!("invalid channel address '{}': {}", self.channel.addr, e))?;

        if !(self.confidence > 0.0 && self.confidence <= 1.0) {
            return Err(anyhow!(
                "detector confidence must be in (0, 1], got {}",
                self.confidence
            ));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be non-zero"));
        }

        if self.zones.is_empty() {
            return Err(anyhow!("at least one capsule zone must be configured"));
        }
        let mut seen = HashSet::new();
        for zone in &self.zones {
            crate::validate_zone_name(&zone.name)?;
            if !seen.insert(zone.name.as_str()) {
                return Err(anyhow!("duplicate zone name '{}'", zone.name));
            }
            check_region(&format!("zone {}", zone.name), &zone.region)?;
            if zone.dwell.is_zero() {
                return Err(anyhow!("zone {} dwell must be greater than zero", zone.name));
            }
        }
        check_region("seal_region", &self.seal_region)?;
        check_region("trash_region", &self.trash_region)?;

        check_positive("safety.stop_distance", self.safety.stop_distance)?;
        check_positive("safety.sentinel_distance", self.safety.sentinel_distance)?;
        if self.safety.sentinel_distance <= self.safety.stop_distance {
            return Err(anyhow!(
                "safety.sentinel_distance ({}) must exceed stop_distance ({})",
                self.safety.sentinel_distance,
                self.safety.stop_distance
            ));
        }
        check_positive("trash.stability_radius", self.trash.stability_radius)?;
        if self.trash.stability_window.is_zero() {
            return Err(anyhow!("trash.stability_secs must be greater than zero"));
        }

        let calibration = &self.calibration;
        if calibration.pixel.len() != calibration.world.len() {
            return Err(anyhow!(
                "calibration has {} pixel points but {} world points",
                calibration.pixel.len(),
                calibration.world.len()
            ));
        }
        if calibration.pixel.len() < MIN_CALIBRATION_POINTS {
            return Err(anyhow!(
                "calibration needs at least {} point pairs, got {}",
                MIN_CALIBRATION_POINTS,
                calibration.pixel.len()
            ));
        }

        if self.task.poll_interval.is_zero() {
            return Err(anyhow!("task.poll_interval_ms must be greater than zero"));
        }
        Ok(())
    }

    /// Fresh debounce state for every configured zone.
    pub fn build_zones(&self) -> Vec<Zone> {
        self.zones
            .iter()
            .map(|zone| Zone::new(zone.name.clone(), zone.region, zone.dwell))
            .collect()
    }

    pub fn seal_latch(&self) -> PresenceLatch {
        PresenceLatch::new(self.seal_region)
    }

    pub fn trash_tracker(&self) -> TrashTracker {
        TrashTracker::new(self.trash.stability_radius, self.trash.stability_window)
    }

    pub fn proximity_guard(&self) -> ProximityGuard {
        ProximityGuard::new(self.safety.stop_distance, self.safety.sentinel_distance)
    }
}

fn read_config_file(path: &Path) -> Result<ControllerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn secs(field: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| anyhow!("{} must be a non-negative number of seconds, got {}", field, value))
}

fn check_positive(field: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(anyhow!("{} must be positive, got {}", field, value))
    }
}

fn check_region(field: &str, region: &PixelRect) -> Result<()> {
    if !region.is_finite() || region.area() <= 0.0 {
        return Err(anyhow!("{} must be a non-empty rectangle", field));
    }
    Ok(())
}

/// Trimmed value of `key`; unset and blank are treated alike.
fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
