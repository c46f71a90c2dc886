use std::path::PathBuf;

use config::{Config, Environment, File};
pub use config::ConfigError;
use serde::Deserialize;

use crate::ladder::config::{LadderConfig, SessionConfig};
use crate::ladder::errors::LadderResult;
use crate::ladder::paper::PaperConfig;

/// Main configuration struct
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Slot ladder parameters
    pub ladder: LadderConfig,
    /// Session window
    #[serde(default)]
    pub session: SessionConfig,
    /// Market feed source
    #[serde(default)]
    pub feed: FeedConfig,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
    /// Snapshot persistence
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    /// Paper venue behaviour
    #[serde(default)]
    pub paper: PaperConfig,
}

#[derive(Debug, Deserialize)]
pub struct FeedConfig {
    /// JSON-lines recording to replay
    #[serde(default = "default_feed_path")]
    pub path: PathBuf,
    /// Pause between replayed items
    #[serde(default)]
    pub replay_delay_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            path: default_feed_path(),
            replay_delay_ms: 0,
        }
    }
}

fn default_feed_path() -> PathBuf {
    PathBuf::from("feed.jsonl")
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize)]
pub struct SnapshotConfig {
    /// Where to write the monitoring snapshot; disabled when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_snapshot_interval")]
    pub interval_secs: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: None,
            interval_secs: default_snapshot_interval(),
        }
    }
}

fn default_snapshot_interval() -> u64 {
    30
}

impl Settings {
    /// Load settings from a configuration file
    pub fn new(config_path: &str) -> Result<Self, ConfigError> {
        Self::build(
            config_path,
            // e.g. APP_LADDER__VOLUME=2 or APP_SESSION__CUTOFF=20:00:00
            Environment::with_prefix("APP").prefix_separator("_").separator("__"),
        )
    }

    fn build(config_path: &str, env: Environment) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(config_path))
            // Environment overrides the file
            .add_source(env)
            .build()?;

        s.try_deserialize()
    }

    /// Load and validate every section
    pub fn load(config_path: &str) -> LadderResult<Self> {
        let settings = Self::new(config_path)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> LadderResult<()> {
        self.ladder.validate()?;
        self.session.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use rust_decimal_macros::dec;
    use std::io::Write;

    const SETTINGS: &str = r#"
[ladder]
volume = "1"
stop_loss_pips = "50"
take_profit_pips = "100"
slots_per_side = 4

[session]
start = "07:00:00"
cutoff = "20:00:00"

[feed]
path = "data/eurusd.jsonl"
replay_delay_ms = 5

[log]
level = "debug"
"#;

    fn write_settings(dir: &tempfile::TempDir) -> String {
        let path = dir.path().join("settings.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(SETTINGS.as_bytes()).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn no_env() -> Environment {
        Environment::with_prefix("APP")
            .prefix_separator("_")
            .separator("__")
            .source(Some(config::Map::new()))
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::build(&write_settings(&dir), no_env()).unwrap();

        assert_eq!(settings.ladder.volume, dec!(1));
        assert_eq!(settings.ladder.slots_per_side, 4);
        assert_eq!(settings.session.cutoff, NaiveTime::from_hms_opt(20, 0, 0).unwrap());
        assert_eq!(settings.feed.replay_delay_ms, 5);
        assert_eq!(settings.log.level, "debug");
        assert!(settings.snapshot.path.is_none());
        assert!(settings.paper.fill_on_touch);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut vars = config::Map::new();
        vars.insert("APP_LADDER__SLOTS_PER_SIDE".to_string(), "2".to_string());
        vars.insert("APP_LOG__LEVEL".to_string(), "warn".to_string());
        let env = no_env().source(Some(vars));

        let settings = Settings::build(&write_settings(&dir), env).unwrap();

        assert_eq!(settings.ladder.slots_per_side, 2);
        assert_eq!(settings.log.level, "warn");
    }

    #[test]
    fn test_missing_log_section_defaults_to_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("minimal.toml");
        std::fs::write(
            &path,
            "[ladder]\nvolume = \"1\"\nstop_loss_pips = \"50\"\ntake_profit_pips = \"100\"\n",
        )
        .unwrap();

        let settings = Settings::build(&path.to_string_lossy(), no_env()).unwrap();

        assert_eq!(settings.log.level, "info");
        assert_eq!(LogConfig::default().level, "info");
        assert_eq!(settings.snapshot.interval_secs, 30);
    }

    #[test]
    fn test_missing_file_fails() {
        assert!(Settings::build("/nonexistent/settings", no_env()).is_err());
    }
}
