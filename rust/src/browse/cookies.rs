// Cross-session cookie continuity. The jar is keyed domain → cookie name →
// attributes and written whole on every update so a persisted snapshot is
// never partially visible.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const COOKIES_FILE: &str = "cookies.json";

#[derive(uniffi::Record, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub expires_at: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
}

#[derive(Debug)]
pub(crate) struct CookieJar {
    file: PathBuf,
    domains: BTreeMap<String, BTreeMap<String, CookieRecord>>,
}

impl CookieJar {
    pub(crate) fn open(data_dir: &str) -> Self {
        let file = Path::new(data_dir).join(COOKIES_FILE);
        let domains = std::fs::read_to_string(&file)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        Self { file, domains }
    }

    /// Flatten the persisted jar for restoration into a fresh surface.
    pub(crate) fn restore(&self) -> Vec<CookieRecord> {
        self.domains
            .values()
            .flat_map(|by_name| by_name.values().cloned())
            .collect()
    }

    /// Replace the jar with the given snapshot and persist it whole.
    pub(crate) fn replace_snapshot(&mut self, cookies: &[CookieRecord]) {
        let mut domains: BTreeMap<String, BTreeMap<String, CookieRecord>> = BTreeMap::new();
        for cookie in cookies {
            domains
                .entry(cookie.domain.clone())
                .or_default()
                .insert(cookie.name.clone(), cookie.clone());
        }
        self.domains = domains;
        self.save();
    }

    fn save(&self) {
        match serde_json::to_vec_pretty(&self.domains) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.file, json) {
                    tracing::warn!(%e, path = %self.file.display(), "failed to persist cookie jar");
                }
            }
            Err(e) => tracing::warn!(%e, "failed to serialise cookie jar"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie(domain: &str, name: &str, value: &str) -> CookieRecord {
        CookieRecord {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: "/".into(),
            expires_at: None,
            secure: true,
            http_only: false,
        }
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_string_lossy().to_string();

        let mut jar = CookieJar::open(&data_dir);
        jar.replace_snapshot(&[
            cookie("dest.example", "sid", "abc"),
            cookie("dest.example", "theme", "dark"),
            cookie("cdn.example", "edge", "fra"),
        ]);

        let reopened = CookieJar::open(&data_dir);
        let restored = reopened.restore();
        assert_eq!(restored.len(), 3);
        assert!(restored
            .iter()
            .any(|c| c.domain == "dest.example" && c.name == "sid" && c.value == "abc"));
    }

    #[test]
    fn replace_is_whole_snapshot_not_a_merge() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_string_lossy().to_string();

        let mut jar = CookieJar::open(&data_dir);
        jar.replace_snapshot(&[cookie("dest.example", "sid", "abc")]);
        jar.replace_snapshot(&[cookie("dest.example", "sid", "def")]);

        let restored = jar.restore();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].value, "def");
    }
}
