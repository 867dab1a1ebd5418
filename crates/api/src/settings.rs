//! Layered settings: defaults, optional TOML file, environment

use camera_capture::CameraConfig;
use config::{Config, ConfigError, Environment, File};
use plate_detector::DetectorConfig;
use scan_pipeline::ScannerConfig;
use serde::{Deserialize, Serialize};
use vehicle_registry::RegistryConfig;

use crate::rate_limit::RateLimitConfig;

/// Settings file looked up when none is given
pub const DEFAULT_SETTINGS_FILE: &str = "plate-scanner";
/// Environment prefix; nested keys use `__`, e.g. `PLATE_SCANNER__SERVER__ADDR`
pub const ENV_PREFIX: &str = "PLATE_SCANNER";

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub addr: String,
    pub log_level: String,
    pub json_logs: bool,
    pub lookup_rate_limit: RateLimitConfig,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            lookup_rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Full application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scanner: ScannerConfig,
    pub camera: CameraConfig,
    pub detector: DetectorConfig,
    pub registry: RegistryConfig,
    pub server: ServerSettings,
}

impl Settings {
    /// Load settings; a missing file is not an error
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path.unwrap_or(DEFAULT_SETTINGS_FILE)).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::load(Some("/nonexistent/plate-scanner")).unwrap();
        assert_eq!(settings.scanner.tick_interval_ms, 1500);
        assert_eq!(settings.camera.width, 1280);
        assert_eq!(settings.registry.timeout_ms, 5000);
        assert_eq!(settings.server.addr, "0.0.0.0:8080");
        assert!(settings.detector.primary_detector_model.is_none());
    }

    #[test]
    fn test_toml_file_overrides() {
        let dir = std::env::temp_dir().join(format!("plate-scanner-settings-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("scanner.toml");
        std::fs::write(
            &path,
            r#"
[scanner]
tick_interval_ms = 750
stop_on_accept = true

[scanner.tier_thresholds.primary]
detection_min = 0.8
text_min = 0.85

[detector]
recognizer_model = "models/recognizer.onnx"

[server]
addr = "127.0.0.1:9000"
"#,
        )
        .unwrap();

        let settings = Settings::load(path.to_str()).unwrap();
        assert_eq!(settings.scanner.tick_interval_ms, 750);
        assert!(settings.scanner.stop_on_accept);
        assert_eq!(settings.scanner.attempt_history, 10);
        assert_eq!(
            settings.scanner.tier_thresholds.primary.map(|t| t.text_min),
            Some(0.85)
        );
        assert!(settings.detector.recognizer_model.is_some());
        assert_eq!(settings.server.addr, "127.0.0.1:9000");

        std::fs::remove_dir_all(dir).ok();
    }
}
