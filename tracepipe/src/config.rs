//! Global configuration: the `enable_trace` kill switch, the embedded
//! sub-engine's default flush/grace cadence, and the recognized telemetry
//! sink name used for credential propagation (spec §4.3 step 5). Loaded
//! from a TOML file with an environment-variable override, following the
//! same `Config::load` shape as every `cognitod` config file.

use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

const DEFAULT_CONFIG_PATH: &str = "/etc/tracepipe/tracepipe.toml";
const ENV_CONFIG_PATH: &str = "TRACEPIPE_CONFIG";

/// The string identifying the recognized telemetry sink (spec §6):
/// when `output_kind` names this sink, `trace::context::new_context` copies
/// its properties from an existing instance in the outer engine instead of
/// the caller-supplied `output_properties`.
pub const DEFAULT_TELEMETRY_SINK: &str = "calyptia";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Global kill switch (spec §4.3 step 1 / §7 `Disabled`). When false,
    /// `context_new` returns `Err(TraceError::Disabled)` without touching
    /// the gate.
    pub enable_trace: bool,
    /// The embedded engine's flush cadence (spec §4.3 step 2: "flush=1s").
    pub flush_interval_secs: u64,
    /// The embedded engine's grace period on shutdown (spec §4.3 step 2:
    /// "grace=1s").
    pub grace_period_secs: u64,
    /// The sink name compared against `output_kind` for credential
    /// propagation (spec §4.3 step 5, §6).
    pub telemetry_sink_name: String,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_trace: true,
            flush_interval_secs: 1,
            grace_period_secs: 1,
            telemetry_sink_name: DEFAULT_TELEMETRY_SINK.to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file. The path can be overridden with the
    /// `TRACEPIPE_CONFIG` environment variable. If the file is missing or
    /// fails to parse, defaults are returned.
    pub fn load() -> Self {
        let path =
            std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let path = PathBuf::from(path);
        match fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_default(),
            Err(_) => Config::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `env_logger` filter string, e.g. `"info"` or `"tracepipe=debug"`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_match_the_spec() {
        let cfg = Config::default();
        assert!(cfg.enable_trace);
        assert_eq!(cfg.flush_interval_secs, 1);
        assert_eq!(cfg.grace_period_secs, 1);
        assert_eq!(cfg.telemetry_sink_name, "calyptia");
    }

    #[test]
    fn parses_a_partial_file_falling_back_to_defaults() {
        let toml = r#"
enable_trace = false
telemetry_sink_name = "acme-telemetry"
"#;
        let cfg: Config = toml::from_str(toml).unwrap();
        assert!(!cfg.enable_trace);
        assert_eq!(cfg.telemetry_sink_name, "acme-telemetry");
        assert_eq!(cfg.flush_interval_secs, 1);
    }

    #[test]
    fn env_override_points_at_a_different_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "enable_trace = false").unwrap();
        unsafe {
            std::env::set_var(ENV_CONFIG_PATH, file.path());
        }
        let cfg = Config::load();
        assert!(!cfg.enable_trace);
        unsafe {
            std::env::remove_var(ENV_CONFIG_PATH);
        }
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        unsafe {
            std::env::set_var(ENV_CONFIG_PATH, "/nonexistent/tracepipe.toml");
        }
        let cfg = Config::load();
        assert!(cfg.enable_trace);
        unsafe {
            std::env::remove_var(ENV_CONFIG_PATH);
        }
    }
}
