use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::system::backend::native::DEFAULT_PROBE_WORKERS;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub native: NativeConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub interval_ms: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig { interval_ms: 1000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NativeConfig {
    pub enabled: bool,
    /// Skips discovery when set.
    pub library_path: Option<PathBuf>,
    /// Platform prefix and suffix are added (`procmon` -> `procmon.dll`).
    pub library_name: String,
    pub probe_workers: usize,
}

impl Default for NativeConfig {
    fn default() -> Self {
        NativeConfig {
            enabled: true,
            library_path: None,
            library_name: "procmon".to_string(),
            probe_workers: DEFAULT_PROBE_WORKERS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_str_config(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub top: usize,
    pub include_system: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            format: OutputFormat::Text,
            top: 10,
            include_system: true,
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("procpulse").join("config.toml"))
}

pub fn load_config() -> Config {
    match config_path() {
        Some(path) if path.exists() => load_config_from_path(&path),
        _ => Config::default(),
    }
}

pub fn load_config_from_path(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents).unwrap_or_default(),
        Err(_) => Config::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert_eq!(config.general.interval_ms, 1000);
        assert!(config.native.enabled);
        assert_eq!(config.native.library_name, "procmon");
        assert_eq!(config.native.probe_workers, 4);
        assert!(config.native.library_path.is_none());
        assert_eq!(config.output.format, OutputFormat::Text);
        assert_eq!(config.output.top, 10);
    }

    #[test]
    fn parse_partial_toml() {
        let toml_str = r#"
[general]
interval_ms = 500
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.interval_ms, 500);
        // Other fields should be defaults
        assert!(config.native.enabled);
        assert_eq!(config.output.top, 10);
    }

    #[test]
    fn parse_full_toml() {
        let toml_str = r#"
[general]
interval_ms = 2000

[native]
enabled = false
library_path = "C:/tools/procmon.dll"
probe_workers = 8

[output]
format = "json"
top = 3
include_system = false
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.interval_ms, 2000);
        assert!(!config.native.enabled);
        assert_eq!(
            config.native.library_path.as_deref(),
            Some(Path::new("C:/tools/procmon.dll"))
        );
        assert_eq!(config.native.library_name, "procmon");
        assert_eq!(config.native.probe_workers, 8);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.output.top, 3);
        assert!(!config.output.include_system);
    }

    #[test]
    fn output_format_from_cli_string() {
        assert_eq!(OutputFormat::from_str_config("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str_config("text"), Some(OutputFormat::Text));
        assert_eq!(OutputFormat::from_str_config("yaml"), None);
    }

    #[test]
    fn missing_file_returns_default() {
        let config = load_config_from_path(Path::new("/nonexistent/path/config.toml"));
        assert_eq!(config.general.interval_ms, 1000);
    }

    #[test]
    fn invalid_toml_returns_default() {
        let temp = std::env::temp_dir().join("procpulse_test_invalid.toml");
        std::fs::write(&temp, "this is not valid toml {{{{").unwrap();
        let config = load_config_from_path(&temp);
        assert_eq!(config.general.interval_ms, 1000);
        let _ = std::fs::remove_file(&temp);
    }
}
