use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::{PollBounds, Signal, UnitId, parse_signal};

/// Environment override for the session-wide graceful preference. When set,
/// it wins over the config file; the value is fixed for the session.
pub const GRACEFUL_ENV: &str = "STACKCTL_GRACEFUL_SHUTDOWN";

/// Descriptor for one supervised process, in launch order. The command is an
/// opaque invocation owned by whoever writes the config.
#[derive(Debug, Clone)]
pub struct UnitConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
    /// Readiness marker. The unit is not ready until this path exists.
    pub pid_file: Option<PathBuf>,
    /// Signal for a graceful stop. When absent, graceful == forceful.
    pub graceful_signal: Option<Signal>,
    pub forceful_signal: Signal,
    /// Marker-wait bounds.
    pub startup: PollBounds,
    /// Died-before-marker bounds, independent of `startup`.
    pub liveness: PollBounds,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            command: String::new(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            pid_file: None,
            graceful_signal: None,
            forceful_signal: Signal::SIGTERM,
            startup: PollBounds::default(),
            liveness: PollBounds::default(),
        }
    }
}

// Raw deserialization struct for UnitConfig
#[derive(Debug, Deserialize)]
struct UnitConfigRaw {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub pid_file: Option<PathBuf>,
    #[serde(default)]
    pub graceful_signal: Option<String>,
    #[serde(default)]
    pub forceful_signal: Option<String>,
    #[serde(default)]
    pub startup_poll_ms: Option<u64>,
    #[serde(default)]
    pub startup_attempts: Option<u32>,
    #[serde(default)]
    pub liveness_poll_ms: Option<u64>,
    #[serde(default)]
    pub liveness_attempts: Option<u32>,
}

impl TryFrom<UnitConfigRaw> for UnitConfig {
    type Error = crate::Error;

    fn try_from(raw: UnitConfigRaw) -> crate::Result<Self> {
        // If args weren't provided, parse them out of the command string.
        let (command, args) = if let Some(args) = raw.args {
            (raw.command, args)
        } else {
            match shell_words::split(&raw.command) {
                Ok(parts) if !parts.is_empty() => {
                    let command = parts[0].clone();
                    let args = parts.into_iter().skip(1).collect();
                    (command, args)
                }
                _ => (raw.command, Vec::new()),
            }
        };

        let forceful_signal = match raw.forceful_signal.as_deref() {
            Some(name) => parse_signal(name)?,
            None => Signal::SIGTERM,
        };
        let graceful_signal = raw
            .graceful_signal
            .as_deref()
            .map(parse_signal)
            .transpose()?;

        let defaults = PollBounds::default();
        let startup = PollBounds::new(
            Duration::from_millis(
                raw.startup_poll_ms
                    .unwrap_or(defaults.interval.as_millis() as u64),
            ),
            raw.startup_attempts.unwrap_or(defaults.max_attempts),
        );
        let liveness = PollBounds::new(
            Duration::from_millis(
                raw.liveness_poll_ms
                    .unwrap_or(defaults.interval.as_millis() as u64),
            ),
            raw.liveness_attempts.unwrap_or(defaults.max_attempts),
        );

        Ok(UnitConfig {
            name: raw.name,
            command,
            args,
            env: raw.env.unwrap_or_default(),
            cwd: raw.cwd,
            pid_file: raw.pid_file,
            graceful_signal,
            forceful_signal,
            startup,
            liveness,
        })
    }
}

impl<'de> Deserialize<'de> for UnitConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = UnitConfigRaw::deserialize(deserializer)?;
        raw.try_into().map_err(serde::de::Error::custom)
    }
}

/// One supervision session's full configuration: the ordered unit list
/// (insertion order == launch order), the graceful preference, and the log
/// files to multiplex.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub units: Vec<UnitConfig>,
    #[serde(default = "default_graceful")]
    pub graceful_shutdown: bool,
    #[serde(default)]
    pub log_globs: Vec<String>,
    #[serde(default = "default_log_poll_ms")]
    pub log_poll_ms: u64,
}

fn default_graceful() -> bool {
    true
}

fn default_log_poll_ms() -> u64 {
    250
}

impl SessionConfig {
    pub async fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            crate::Error::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        let mut config: SessionConfig = serde_json::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("failed to parse config: {e}")))?;

        if let Ok(raw) = std::env::var(GRACEFUL_ENV)
            && let Some(flag) = parse_bool_flag(&raw)
        {
            config.graceful_shutdown = flag;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.units.is_empty() {
            return Err(crate::Error::Config("no units defined".to_string()));
        }

        let mut seen = HashSet::new();
        for unit in &self.units {
            if unit.command.trim().is_empty() {
                return Err(crate::Error::Config(format!(
                    "unit {} has no command",
                    unit.name
                )));
            }
            let id = UnitId::new(&unit.name)?;
            if !seen.insert(id) {
                return Err(crate::Error::Config(format!(
                    "duplicate unit name: {}",
                    unit.name
                )));
            }
        }
        Ok(())
    }
}

pub fn parse_bool_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
