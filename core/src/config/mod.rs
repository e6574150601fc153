mod load;
mod types;

pub use load::{load_default, load_from, parse, DEFAULT_CONFIG_FILE};
pub use types::{AppConfig, ChannelConfig, LoggingConfig, ServerConfig, ShutdownConfig};

#[cfg(test)]
mod tests {
    use super::load::apply_env_overrides;
    use super::*;
    use crate::error::ConfigError;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.shutdown.terminate_grace(), Duration::from_secs(3));
        assert_eq!(cfg.shutdown.signal_grace(), Duration::from_secs(5));
        assert_eq!(cfg.shutdown.kill_wait(), Duration::from_secs(2));
        assert_eq!(cfg.channel.preview_bytes, 240);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.server.dir.ends_with("archivist/server"));
        assert!(cfg.server.executable.is_none());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let cfg = parse(
            r#"
            [server]
            dir = "/opt/archivist/server"
            args = ["--headless"]
            expected_version = "1.4.0"

            [shutdown]
            terminate_grace_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.dir, PathBuf::from("/opt/archivist/server"));
        assert_eq!(cfg.server.args, vec!["--headless"]);
        assert_eq!(cfg.server.expected_version.as_deref(), Some("1.4.0"));
        assert_eq!(cfg.shutdown.terminate_grace_ms, 500);
        assert_eq!(cfg.shutdown.signal_grace_ms, 5_000);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            parse("[shutdown]\nterminate_grace_ms = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn env_overrides_apply_and_blank_values_are_ignored() {
        let env: HashMap<&str, &str> = [
            ("ARCHIVIST_SERVER_DIR", "/srv/worker"),
            ("ARCHIVIST_SERVER_EXE", "   "),
            ("ARCHIVIST_LOG_DIR", "/var/log/archivist"),
        ]
        .into_iter()
        .collect();
        let mut cfg = AppConfig::default();
        apply_env_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(cfg.server.dir, PathBuf::from("/srv/worker"));
        assert!(cfg.server.executable.is_none());
        assert_eq!(cfg.logging.dir, Some(PathBuf::from("/var/log/archivist")));
    }

    #[test]
    fn non_numeric_grace_override_is_rejected() {
        let mut cfg = AppConfig::default();
        let err = apply_env_overrides(&mut cfg, |k| {
            (k == "ARCHIVIST_TERMINATE_GRACE_MS").then(|| "later".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::EnvInvalid { ref key } if key == "ARCHIVIST_TERMINATE_GRACE_MS"));
    }

    #[test]
    fn explicit_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            load_from(Some(missing.as_path())),
            Err(ConfigError::NotFound(p)) if p == missing
        ));
    }
}
