//! Configuration – reads/writes `~/.mockrobot/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mockrobot_driver::DriverConfig;
use mockrobot_driver::config::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_HOME_TIMEOUT, DEFAULT_OPERATION_TIMEOUT, DEFAULT_POLL_INTERVAL,
    DEFAULT_PORT,
};

/// Timing overrides, in whole seconds.  The defaults are the values the
/// robot vendor specifies; only change them for simulators or test rigs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_home_timeout")]
    pub home_timeout_secs: u64,
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_secs()
}
fn default_home_timeout() -> u64 {
    DEFAULT_HOME_TIMEOUT.as_secs()
}
fn default_operation_timeout() -> u64 {
    DEFAULT_OPERATION_TIMEOUT.as_secs()
}
fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            home_timeout_secs: default_home_timeout(),
            operation_timeout_secs: default_operation_timeout(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

/// Persisted user configuration stored in `~/.mockrobot/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Address `/open` connects to when none is given.
    #[serde(default = "default_robot_ip")]
    pub robot_ip: String,

    /// TCP port of the onboard software.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Append logs to this file instead of stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    #[serde(default)]
    pub timing: TimingConfig,
}

fn default_robot_ip() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            robot_ip: default_robot_ip(),
            port: default_port(),
            log_file: None,
            timing: TimingConfig::default(),
        }
    }
}

impl Config {
    /// Driver settings derived from this config.
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            port: self.port,
            connect_timeout: Duration::from_secs(self.timing.connect_timeout_secs),
            home_timeout: Duration::from_secs(self.timing.home_timeout_secs),
            operation_timeout: Duration::from_secs(self.timing.operation_timeout_secs),
            poll_interval: Duration::from_secs(self.timing.poll_interval_secs),
            ..DriverConfig::default()
        }
    }
}

/// Return the path to `~/.mockrobot/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".mockrobot").join("config.toml")
}

/// Load the config from disk and apply environment overrides.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `MOCKROBOT_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `MOCKROBOT_IP` | `robot_ip` |
/// | `MOCKROBOT_PORT` | `port` |
/// | `MOCKROBOT_POLL_INTERVAL_SECS` | `timing.poll_interval_secs` |
///
/// Unparsable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("MOCKROBOT_IP") {
        cfg.robot_ip = v;
    }
    if let Ok(v) = std::env::var("MOCKROBOT_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.port = port;
    }
    if let Ok(v) = std::env::var("MOCKROBOT_POLL_INTERVAL_SECS")
        && let Ok(secs) = v.parse::<u64>()
    {
        cfg.timing.poll_interval_secs = secs;
    }
}

/// Save the config to disk, creating `~/.mockrobot/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}
