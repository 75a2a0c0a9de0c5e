// App configuration read from `fishscale_config.json` in the data dir.
//
// Every field is optional in the file; accessors fall back to the shipped
// defaults. Tests overwrite the file before constructing the app.

use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "fishscale_config.json";

const DEFAULT_CONFIG_ENDPOINT: &str = "https://fishscalelog.com/config.php";
const DEFAULT_ATTRIBUTION_ENDPOINT: &str = "https://api.fishscalelog.com/v1/organic";
const DEFAULT_PROGRAM_ID: &str = "6757082634";
const DEFAULT_AUTH_KEY: &str = "XRAvU73MakDNxA4JFj6Wc7";
const DEFAULT_BUNDLE_ID: &str = "com.fishscalelog.app";
const DEFAULT_STORE_ID: &str = "id6757082634";
const DEFAULT_OS_TAG: &str = "iOS";
const DEFAULT_LOCALE: &str = "en_US";
const DEFAULT_PROBE_ADDR: &str = "1.1.1.1:443";
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 10;

// Resolution is inert before this date; launches earlier are forced into the
// decoy UI.
const DEFAULT_AVAILABILITY_THRESHOLD: &str = "2026-01-12";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub disable_network: Option<bool>,
    pub config_endpoint: Option<String>,
    pub attribution_endpoint: Option<String>,
    pub attribution_program_id: Option<String>,
    pub attribution_auth_key: Option<String>,
    pub bundle_id: Option<String>,
    pub store_id: Option<String>,
    pub firebase_project_id: Option<String>,
    pub os_tag: Option<String>,
    pub locale: Option<String>,
    /// `YYYY-MM-DD`; resolution before this date forces the decoy UI.
    pub availability_threshold: Option<String>,
    pub reachability_probe_addr: Option<String>,
    pub reachability_interval_secs: Option<u64>,
}

pub fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE);
    match std::fs::read_to_string(&path) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(%e, "invalid app config; using defaults");
                AppConfig::default()
            }
        },
        Err(_) => AppConfig::default(),
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

impl AppConfig {
    pub fn network_enabled(&self) -> bool {
        self.disable_network != Some(true)
    }

    pub fn config_endpoint(&self) -> &str {
        non_empty(self.config_endpoint.as_ref()).unwrap_or(DEFAULT_CONFIG_ENDPOINT)
    }

    pub fn attribution_endpoint(&self) -> &str {
        non_empty(self.attribution_endpoint.as_ref()).unwrap_or(DEFAULT_ATTRIBUTION_ENDPOINT)
    }

    pub fn attribution_program_id(&self) -> &str {
        non_empty(self.attribution_program_id.as_ref()).unwrap_or(DEFAULT_PROGRAM_ID)
    }

    pub fn attribution_auth_key(&self) -> &str {
        non_empty(self.attribution_auth_key.as_ref()).unwrap_or(DEFAULT_AUTH_KEY)
    }

    pub fn bundle_id(&self) -> &str {
        non_empty(self.bundle_id.as_ref()).unwrap_or(DEFAULT_BUNDLE_ID)
    }

    pub fn store_id(&self) -> &str {
        non_empty(self.store_id.as_ref()).unwrap_or(DEFAULT_STORE_ID)
    }

    pub fn firebase_project_id(&self) -> Option<&str> {
        non_empty(self.firebase_project_id.as_ref())
    }

    pub fn os_tag(&self) -> &str {
        non_empty(self.os_tag.as_ref()).unwrap_or(DEFAULT_OS_TAG)
    }

    pub fn locale(&self) -> &str {
        non_empty(self.locale.as_ref()).unwrap_or(DEFAULT_LOCALE)
    }

    pub fn availability_threshold(&self) -> NaiveDate {
        non_empty(self.availability_threshold.as_ref())
            .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
            .unwrap_or_else(|| {
                NaiveDate::parse_from_str(DEFAULT_AVAILABILITY_THRESHOLD, "%Y-%m-%d")
                    .expect("default threshold date parses")
            })
    }

    pub fn reachability_probe_addr(&self) -> &str {
        non_empty(self.reachability_probe_addr.as_ref()).unwrap_or(DEFAULT_PROBE_ADDR)
    }

    pub fn reachability_interval_secs(&self) -> u64 {
        self.reachability_interval_secs
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_PROBE_INTERVAL_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_app_config(&dir.path().to_string_lossy());
        assert!(config.network_enabled());
        assert_eq!(config.config_endpoint(), DEFAULT_CONFIG_ENDPOINT);
        assert_eq!(config.availability_threshold().to_string(), "2026-01-12");
    }

    #[test]
    fn file_overrides_win_and_blank_fields_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let v = serde_json::json!({
            "disable_network": true,
            "config_endpoint": "http://127.0.0.1:9/config",
            "locale": "   ",
            "availability_threshold": "2020-01-01",
        });
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            serde_json::to_vec(&v).unwrap(),
        )
        .unwrap();

        let config = load_app_config(&dir.path().to_string_lossy());
        assert!(!config.network_enabled());
        assert_eq!(config.config_endpoint(), "http://127.0.0.1:9/config");
        assert_eq!(config.locale(), DEFAULT_LOCALE);
        assert_eq!(config.availability_threshold().to_string(), "2020-01-01");
    }
}
