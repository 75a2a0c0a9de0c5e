// Consent gate: whether the notification prompt must be shown before a
// resolved destination is surfaced.

use super::store::StateStore;

/// A prompt decision (or skip) suppresses re-prompting for three days.
pub const CONSENT_REPROMPT_COOLOFF_SECS: i64 = 259_200;

/// The prompt is needed iff consent is still undecided and the last prompt
/// interaction (if any) is outside the cool-off window.
pub fn consent_prompt_needed(store: &StateStore, now: i64) -> bool {
    if store.is_consent_approved() || store.is_consent_declined() {
        return false;
    }
    if let Some(prior) = store.consent_decided_at() {
        if now - prior < CONSENT_REPROMPT_COOLOFF_SECS {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(&dir.path().to_string_lossy());
        (dir, store)
    }

    #[test]
    fn undecided_without_timestamp_needs_prompt() {
        let (_dir, store) = fresh_store();
        assert!(consent_prompt_needed(&store, 1_000_000));
    }

    #[test]
    fn approved_or_declined_never_prompts() {
        let (_dir, store) = fresh_store();
        store.approve_consent(true);
        assert!(!consent_prompt_needed(&store, 1_000_000));

        let (_dir2, store2) = fresh_store();
        store2.decline_consent(true);
        assert!(!consent_prompt_needed(&store2, 1_000_000));
    }

    #[test]
    fn skip_suppresses_for_three_days_exactly() {
        let (_dir, store) = fresh_store();
        let skipped_at = 1_000_000;
        store.update_consent_decided_at(skipped_at);

        assert!(!consent_prompt_needed(
            &store,
            skipped_at + CONSENT_REPROMPT_COOLOFF_SECS - 1
        ));
        assert!(consent_prompt_needed(
            &store,
            skipped_at + CONSENT_REPROMPT_COOLOFF_SECS
        ));
    }
}
