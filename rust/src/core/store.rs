// Persisted resolver state.
//
// One JSON file (`app_state.json`) holds every field that must survive a
// process restart; each accessor rewrites the whole snapshot so a write is
// never partially visible. Other components go through these accessors,
// never through raw file access.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use serde::{Deserialize, Serialize};

const STATE_FILE: &str = "app_state.json";
const INSTALL_ID_FILE: &str = "install_id.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppCondition {
    LogView,
    Inactive,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    executed_previously: bool,
    #[serde(default)]
    app_condition: Option<AppCondition>,
    #[serde(default)]
    stored_destination: Option<String>,
    #[serde(default)]
    consent_approved: bool,
    #[serde(default)]
    consent_declined: bool,
    /// Unix seconds of the last consent prompt decision (or skip).
    #[serde(default)]
    consent_decided_at: Option<i64>,
    #[serde(default)]
    temp_push_url: Option<String>,
    /// One-shot guard: the attribution merge-and-dispatch already ran for
    /// this install.
    #[serde(default)]
    metrics_dispatched: bool,
    #[serde(default)]
    push_token: Option<String>,
}

#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: Mutex<PersistedState>,
}

impl StateStore {
    pub fn open(data_dir: &str) -> Self {
        let path = Path::new(data_dir).join(STATE_FILE);
        let initial = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        Self {
            path,
            state: Mutex::new(initial),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&PersistedState) -> T) -> T {
        let guard = match self.state.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        f(&guard)
    }

    fn write(&self, f: impl FnOnce(&mut PersistedState)) {
        let mut guard = match self.state.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        f(&mut guard);
        match serde_json::to_vec_pretty(&*guard) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    tracing::warn!(%e, path = %self.path.display(), "failed to persist app state");
                }
            }
            Err(e) => tracing::warn!(%e, "failed to serialise app state"),
        }
    }

    pub fn is_initial_execution(&self) -> bool {
        self.read(|s| !s.executed_previously)
    }

    pub fn mark_execution_completed(&self) {
        self.write(|s| s.executed_previously = true);
    }

    pub fn app_condition(&self) -> Option<AppCondition> {
        self.read(|s| s.app_condition)
    }

    pub fn assign_app_condition(&self, condition: AppCondition) {
        self.write(|s| s.app_condition = Some(condition));
    }

    pub fn stored_destination(&self) -> Option<String> {
        self.read(|s| s.stored_destination.clone())
    }

    pub fn persist_destination(&self, url: &str) {
        self.write(|s| s.stored_destination = Some(url.to_string()));
    }

    pub fn is_consent_approved(&self) -> bool {
        self.read(|s| s.consent_approved)
    }

    pub fn is_consent_declined(&self) -> bool {
        self.read(|s| s.consent_declined)
    }

    pub fn approve_consent(&self, approved: bool) {
        self.write(|s| s.consent_approved = approved);
    }

    pub fn decline_consent(&self, declined: bool) {
        self.write(|s| s.consent_declined = declined);
    }

    pub fn consent_decided_at(&self) -> Option<i64> {
        self.read(|s| s.consent_decided_at)
    }

    pub fn update_consent_decided_at(&self, at: i64) {
        self.write(|s| s.consent_decided_at = Some(at));
    }

    pub fn temp_push_url(&self) -> Option<String> {
        self.read(|s| s.temp_push_url.clone())
    }

    pub fn set_temp_push_url(&self, url: &str) {
        self.write(|s| s.temp_push_url = Some(url.to_string()));
    }

    pub fn metrics_dispatched(&self) -> bool {
        self.read(|s| s.metrics_dispatched)
    }

    pub fn mark_metrics_dispatched(&self) {
        self.write(|s| s.metrics_dispatched = true);
    }

    pub fn push_token(&self) -> Option<String> {
        self.read(|s| s.push_token.clone())
    }

    pub fn set_push_token(&self, token: &str) {
        self.write(|s| s.push_token = Some(token.to_string()));
    }
}

/// Hosts hand us a container path that may not exist yet on first launch.
pub fn ensure_data_dir(data_dir: &str) -> anyhow::Result<()> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to prepare data dir {data_dir}"))
}

/// Stable per-install tracker id, generated once and reused across launches.
pub fn load_or_create_install_id(data_dir: &str) -> String {
    let path = Path::new(data_dir).join(INSTALL_ID_FILE);
    if let Ok(id) = std::fs::read_to_string(&path) {
        let id = id.trim().to_string();
        if !id.is_empty() {
            return id;
        }
    }
    let id = uuid::Uuid::new_v4().to_string();
    let _ = std::fs::write(&path, &id);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_string_lossy().to_string();

        let store = StateStore::open(&data_dir);
        assert!(store.is_initial_execution());
        store.persist_destination("https://dest.example/a");
        store.assign_app_condition(AppCondition::LogView);
        store.mark_execution_completed();
        store.set_temp_push_url("https://push.example/p");
        store.mark_metrics_dispatched();

        let reopened = StateStore::open(&data_dir);
        assert!(!reopened.is_initial_execution());
        assert_eq!(
            reopened.stored_destination().as_deref(),
            Some("https://dest.example/a")
        );
        assert_eq!(reopened.app_condition(), Some(AppCondition::LogView));
        assert_eq!(
            reopened.temp_push_url().as_deref(),
            Some("https://push.example/p")
        );
        assert!(reopened.metrics_dispatched());
    }

    #[test]
    fn install_id_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_string_lossy().to_string();
        let first = load_or_create_install_id(&data_dir);
        let second = load_or_create_install_id(&data_dir);
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }
}
