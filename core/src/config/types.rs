use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub shutdown: ShutdownConfig,

    #[serde(default)]
    pub channel: ChannelConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the worker executable lives and how it is started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_dir")]
    pub dir: PathBuf,

    /// File name inside `dir`; the platform default when unset.
    #[serde(default)]
    pub executable: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    /// Version the installation's `metadata.json` should report.
    #[serde(default)]
    pub expected_version: Option<String>,
}

fn default_server_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("archivist")
        .join("server")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            dir: default_server_dir(),
            executable: None,
            args: Vec::new(),
            expected_version: None,
        }
    }
}

/// Bounds of the three shutdown stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    #[serde(default = "default_terminate_grace_ms")]
    pub terminate_grace_ms: u64,

    #[serde(default = "default_signal_grace_ms")]
    pub signal_grace_ms: u64,

    #[serde(default = "default_kill_wait_ms")]
    pub kill_wait_ms: u64,
}

fn default_terminate_grace_ms() -> u64 {
    3_000
}

fn default_signal_grace_ms() -> u64 {
    5_000
}

fn default_kill_wait_ms() -> u64 {
    2_000
}

impl ShutdownConfig {
    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    pub fn signal_grace(&self) -> Duration {
        Duration::from_millis(self.signal_grace_ms)
    }

    pub fn kill_wait(&self) -> Duration {
        Duration::from_millis(self.kill_wait_ms)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            terminate_grace_ms: default_terminate_grace_ms(),
            signal_grace_ms: default_signal_grace_ms(),
            kill_wait_ms: default_kill_wait_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Longest line preview written to debug logs.
    #[serde(default = "default_preview_bytes")]
    pub preview_bytes: usize,
}

fn default_preview_bytes() -> usize {
    240
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            preview_bytes: default_preview_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Daily-rolling log files are written here when set.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}
