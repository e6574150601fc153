use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref VERSION_MISMATCH: Regex = Regex::new(
        r"(?is)chromedriver.*?version (\d+(?:\.\d+)*).*?browser version is (\d+(?:\.\d+)*)"
    )
    .expect("version mismatch pattern compiles");
}

const UNKNOWN_VERSION: &str = "Unknown";

/// Why the browser driver of a worker failed to come up, read from the
/// stacktrace carried by `CHROMEDRIVER_ERROR`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverFailure {
    NetworkUnreachable,
    OutdatedBrowser {
        driver_version: String,
        browser_version: String,
    },
    Other {
        stacktrace: String,
    },
}

impl DriverFailure {
    pub fn classify(stacktrace: &str) -> Self {
        let lower = stacktrace.to_lowercase();
        if lower.contains("network is unreachable") {
            return DriverFailure::NetworkUnreachable;
        }
        if lower.contains("this version of chromedriver only supports") {
            let (driver_version, browser_version) = match VERSION_MISMATCH.captures(stacktrace) {
                Some(caps) => (
                    caps[1].to_string(),
                    caps[2].to_string(),
                ),
                None => (UNKNOWN_VERSION.to_string(), UNKNOWN_VERSION.to_string()),
            };
            return DriverFailure::OutdatedBrowser {
                driver_version,
                browser_version,
            };
        }
        DriverFailure::Other {
            stacktrace: stacktrace.to_string(),
        }
    }
}

impl fmt::Display for DriverFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverFailure::NetworkUnreachable => {
                f.write_str("ChromeDriver could not reach the network. Check your connection.")
            }
            DriverFailure::OutdatedBrowser {
                driver_version,
                browser_version,
            } => write!(
                f,
                "Chrome is outdated: ChromeDriver {driver_version} needs a newer browser than {browser_version}."
            ),
            DriverFailure::Other { .. } => f.write_str("ChromeDriver failed to start."),
        }
    }
}
