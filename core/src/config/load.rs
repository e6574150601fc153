use std::path::{Path, PathBuf};

use super::types::AppConfig;
use crate::error::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "archivist.toml";

/// `archivist.toml` from the working directory if present, defaults
/// otherwise, then environment overrides.
pub fn load_default() -> Result<AppConfig, ConfigError> {
    load_from(None)
}

/// Like [`load_default`], but an explicit `path` must exist.
pub fn load_from(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut cfg = match path {
        Some(p) if !p.exists() => return Err(ConfigError::NotFound(p.to_path_buf())),
        Some(p) => read_file(p)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => read_file(Path::new(DEFAULT_CONFIG_FILE))?,
        None => AppConfig::default(),
    };
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    Ok(cfg)
}

pub fn parse(s: &str) -> Result<AppConfig, ConfigError> {
    toml::from_str::<AppConfig>(s).map_err(ConfigError::Parse)
}

fn read_file(path: &Path) -> Result<AppConfig, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&s)
}

pub(crate) fn apply_env_overrides(
    cfg: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = var("ARCHIVIST_SERVER_DIR") {
        cfg.server.dir = PathBuf::from(v);
    }
    if let Some(v) = var("ARCHIVIST_SERVER_EXE") {
        cfg.server.executable = Some(v);
    }
    if let Some(v) = var("ARCHIVIST_LOG_DIR") {
        cfg.logging.dir = Some(PathBuf::from(v));
    }
    if let Some(v) = var("ARCHIVIST_TERMINATE_GRACE_MS") {
        cfg.shutdown.terminate_grace_ms =
            v.trim().parse().map_err(|_| ConfigError::EnvInvalid {
                key: "ARCHIVIST_TERMINATE_GRACE_MS".to_string(),
            })?;
    }
    Ok(())
}
