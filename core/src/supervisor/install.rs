use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::ServerConfig;
use crate::error::SupervisorError;

pub const METADATA_FILE: &str = "metadata.json";

/// Platform file name of the worker executable.
pub fn executable_name() -> &'static str {
    if cfg!(windows) {
        "server.exe"
    } else {
        "server"
    }
}

pub fn executable_path(cfg: &ServerConfig) -> PathBuf {
    cfg.dir
        .join(cfg.executable.as_deref().unwrap_or(executable_name()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallationStatus {
    Missing,
    Invalid { reason: String },
    Outdated { found: String, expected: String },
    UpToDate { version: String },
}

impl fmt::Display for InstallationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallationStatus::Missing => f.write_str("no server installation found"),
            InstallationStatus::Invalid { reason } => {
                write!(f, "invalid server installation: {reason}")
            }
            InstallationStatus::Outdated { found, expected } => {
                write!(f, "outdated server installation [{found} < {expected}]")
            }
            InstallationStatus::UpToDate { version } => {
                write!(f, "server installation is up-to-date [{version}]")
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct Metadata {
    version: String,
}

/// Inspect `dir/metadata.json` against the version this build expects.
pub fn check_installation(dir: &Path, expected: Option<&str>) -> InstallationStatus {
    if !dir.exists() {
        return InstallationStatus::Missing;
    }
    let raw = match std::fs::read_to_string(dir.join(METADATA_FILE)) {
        Ok(raw) => raw,
        Err(e) => {
            return InstallationStatus::Invalid {
                reason: format!("{METADATA_FILE}: {e}"),
            }
        }
    };
    let metadata: Metadata = match serde_json::from_str(&raw) {
        Ok(m) => m,
        Err(e) => {
            return InstallationStatus::Invalid {
                reason: format!("{METADATA_FILE}: {e}"),
            }
        }
    };
    let Some(found) = parse_version(&metadata.version) else {
        return InstallationStatus::Invalid {
            reason: format!("unparseable version {:?}", metadata.version),
        };
    };
    if let Some(expected) = expected {
        let Some(wanted) = parse_version(expected) else {
            return InstallationStatus::Invalid {
                reason: format!("unparseable expected version {expected:?}"),
            };
        };
        if compare_versions(&found, &wanted) == Ordering::Less {
            return InstallationStatus::Outdated {
                found: metadata.version,
                expected: expected.to_string(),
            };
        }
    }
    InstallationStatus::UpToDate {
        version: metadata.version,
    }
}

fn parse_version(v: &str) -> Option<Vec<u64>> {
    v.trim()
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}

/// Numeric comparison; missing trailing components count as zero.
fn compare_versions(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Locate the executable and make sure its owner may run it.
pub(crate) fn ensure_executable(cfg: &ServerConfig) -> Result<PathBuf, SupervisorError> {
    let path = executable_path(cfg);
    if !path.is_file() {
        return Err(SupervisorError::ExecutableNotFound { path });
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let perm_err = |source| SupervisorError::Permissions {
            path: path.clone(),
            source,
        };
        let mut perms = std::fs::metadata(&path).map_err(perm_err)?.permissions();
        if perms.mode() & 0o100 == 0 {
            perms.set_mode(perms.mode() | 0o100);
            std::fs::set_permissions(&path, perms).map_err(perm_err)?;
        }
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_metadata(json: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(METADATA_FILE), json).unwrap();
        dir
    }

    #[test]
    fn missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("server");
        assert_eq!(check_installation(&gone, None), InstallationStatus::Missing);
    }

    #[test]
    fn missing_or_garbled_metadata_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            check_installation(dir.path(), None),
            InstallationStatus::Invalid { .. }
        ));

        let dir = with_metadata("{\"release\": 3}");
        assert!(matches!(
            check_installation(dir.path(), None),
            InstallationStatus::Invalid { .. }
        ));

        let dir = with_metadata("{\"version\": \"1.x\"}");
        assert!(matches!(
            check_installation(dir.path(), None),
            InstallationStatus::Invalid { .. }
        ));
    }

    #[test]
    fn version_comparison_is_numeric() {
        let dir = with_metadata("{\"version\": \"1.10.0\"}");
        assert_eq!(
            check_installation(dir.path(), Some("1.9.2")),
            InstallationStatus::UpToDate {
                version: "1.10.0".into()
            }
        );
        assert_eq!(
            check_installation(dir.path(), Some("1.10")),
            InstallationStatus::UpToDate {
                version: "1.10.0".into()
            }
        );
        assert_eq!(
            check_installation(dir.path(), Some("2.0.0")),
            InstallationStatus::Outdated {
                found: "1.10.0".into(),
                expected: "2.0.0".into()
            }
        );
    }

    #[test]
    fn executable_override_is_joined_to_dir() {
        let cfg = ServerConfig {
            dir: PathBuf::from("/opt/worker"),
            executable: Some("worker.bin".into()),
            ..Default::default()
        };
        assert_eq!(executable_path(&cfg), PathBuf::from("/opt/worker/worker.bin"));
    }

    #[cfg(unix)]
    #[test]
    fn ensure_executable_sets_owner_exec_bit() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join(executable_name());
        std::fs::write(&exe, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o644)).unwrap();

        let cfg = ServerConfig {
            dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert_eq!(ensure_executable(&cfg).unwrap(), exe);
        let mode = std::fs::metadata(&exe).unwrap().permissions().mode();
        assert_eq!(mode & 0o100, 0o100);
    }

    #[test]
    fn ensure_executable_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ServerConfig {
            dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert!(matches!(
            ensure_executable(&cfg),
            Err(SupervisorError::ExecutableNotFound { .. })
        ));
    }
}
