// Shared state snapshot types exposed over FFI.

pub fn now_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Top-level resolution phase. `Deprecated` is the single "show the decoy
/// logbook UI" signal for the shell.
#[derive(uniffi::Enum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Bootstrapping,
    Operational,
    Deprecated,
    Unreachable,
}

#[derive(uniffi::Enum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentState {
    Unset,
    Approved,
    Declined,
}

/// Full snapshot streamed to the shell on every change.
///
/// MVP tradeoff (same as the reconciliation story on iOS/Android): always a
/// whole snapshot, no granular diffs.
#[derive(uniffi::Record, Debug, Clone)]
pub struct AppState {
    pub rev: u64,
    pub phase: Phase,
    /// Resolved destination URL, present once phase is `Operational`.
    pub destination: Option<String>,
    /// The shell must show the notification-consent prompt when set.
    pub reveal_consent_prompt: bool,
    pub consent: ConsentState,
    pub network_satisfied: bool,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            phase: Phase::Bootstrapping,
            destination: None,
            reveal_consent_prompt: false,
            consent: ConsentState::Unset,
            network_satisfied: true,
        }
    }
}
