//! Tunable timings and policy switches of the player.
//!
//! Values come from, in increasing priority:
//! 1. the embedded `pmoplayback.yaml` defaults,
//! 2. an optional YAML file (explicit path, or the `PMOPLAYBACK_CONFIG`
//!    environment variable),
//! 3. `PMOPLAYBACK_CONFIG__<KEY>` environment variables, e.g.
//!    `PMOPLAYBACK_CONFIG__LOAD_TIMEOUT_MS=20000`.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::{debug, info};

const DEFAULT_CONFIG: &str = include_str!("pmoplayback.yaml");

const ENV_CONFIG_FILE: &str = "PMOPLAYBACK_CONFIG";
const ENV_PREFIX: &str = "PMOPLAYBACK_CONFIG__";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// `previous()` restarts the current track past this elapsed time.
    pub previous_restart_threshold_ms: u64,
    pub initialize_timeout_ms: u64,
    pub load_timeout_ms: u64,
    /// Budget of the seek correction loop after a dynamic service switch.
    pub seek_timeout_ms: u64,
    pub seek_poll_interval_ms: u64,
    /// Accepted distance between the requested and observed position.
    pub seek_tolerance_ms: u64,
    pub reconcile_interval_ms: u64,
    /// Time a paused/playing mismatch must persist before it is corrected.
    pub reconcile_cooldown_ms: u64,
    /// No reconciliation happens this close to the end of a track.
    pub end_guard_ms: u64,
    /// Validate published arguments against event schemas.
    pub validate_events: bool,
    pub initial_volume: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            previous_restart_threshold_ms: 3000,
            initialize_timeout_ms: 10_000,
            load_timeout_ms: 15_000,
            seek_timeout_ms: 5000,
            seek_poll_interval_ms: 100,
            seek_tolerance_ms: 1500,
            reconcile_interval_ms: 250,
            reconcile_cooldown_ms: 1000,
            end_guard_ms: 1500,
            validate_events: true,
            initial_volume: 1.0,
        }
    }
}

/// Recursively merges `overlay` into `base`, mappings key by key.
fn merge_yaml(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (k, v) in overlay_map {
                match base_map.get_mut(k) {
                    Some(existing) => merge_yaml(existing, v),
                    None => {
                        base_map.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

fn convert_env_value(value: &str) -> Value {
    serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

impl PlaybackConfig {
    /// Loads the configuration from `path`, or from the file named by
    /// `PMOPLAYBACK_CONFIG`, or from the embedded defaults only.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => env::var(ENV_CONFIG_FILE).ok().map(Into::into),
        };

        let yaml = match file {
            Some(file) => {
                let data = fs::read_to_string(&file)
                    .with_context(|| format!("reading {}", file.display()))?;
                info!(config_file = %file.display(), "Loaded playback config file");
                Some(data)
            }
            None => {
                debug!("No playback config file, using embedded defaults");
                None
            }
        };

        Self::from_sources(yaml.as_deref(), env::vars())
    }

    /// Builds a configuration from an optional YAML document and a set of
    /// `(key, value)` environment pairs.
    pub fn from_sources<I>(yaml: Option<&str>, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        if let Some(yaml) = yaml {
            let external: Value = serde_yaml::from_str(yaml)?;
            if !external.is_null() {
                merge_yaml(&mut value, &external);
            }
        }

        for (key, raw) in vars {
            if let Some(name) = key.strip_prefix(ENV_PREFIX) {
                if let Value::Mapping(map) = &mut value {
                    map.insert(
                        Value::String(name.to_lowercase()),
                        convert_env_value(&raw),
                    );
                }
            }
        }

        let config: PlaybackConfig = serde_yaml::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("seek_poll_interval_ms", self.seek_poll_interval_ms),
            ("reconcile_interval_ms", self.reconcile_interval_ms),
            ("initialize_timeout_ms", self.initialize_timeout_ms),
            ("load_timeout_ms", self.load_timeout_ms),
        ];
        for (name, ms) in intervals {
            if ms == 0 {
                return Err(anyhow!("{name} must be greater than 0"));
            }
        }
        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(anyhow!(
                "initial_volume must be within [0, 1], got {}",
                self.initial_volume
            ));
        }
        Ok(())
    }

    /// Serializes the configuration back to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn previous_restart_threshold(&self) -> Duration {
        Duration::from_millis(self.previous_restart_threshold_ms)
    }

    pub fn initialize_timeout(&self) -> Duration {
        Duration::from_millis(self.initialize_timeout_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn seek_timeout(&self) -> Duration {
        Duration::from_millis(self.seek_timeout_ms)
    }

    pub fn seek_poll_interval(&self) -> Duration {
        Duration::from_millis(self.seek_poll_interval_ms)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    pub fn reconcile_cooldown(&self) -> Duration {
        Duration::from_millis(self.reconcile_cooldown_ms)
    }

    pub fn end_guard(&self) -> Duration {
        Duration::from_millis(self.end_guard_ms)
    }
}
