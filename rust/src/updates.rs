use crate::core::{FetchFault, Metrics};
use crate::state::AppState;
use crate::AppAction;

#[derive(uniffi::Enum, Clone, Debug)]
pub enum AppUpdate {
    /// Primary update stream: always send a full state snapshot.
    FullState(AppState),
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

#[derive(Debug)]
pub enum InternalEvent {
    // Scheduled timers. Every timer carries the token it was armed with so a
    // stale firing (token bumped since) is ignored.
    FallbackElapsed { token: u64 },
    DeprecationDelayElapsed { token: u64 },
    BootstrapDelayElapsed { token: u64 },
    AttributionMergeElapsed { token: u64 },

    // Async fetch results.
    OrganicMetricsFetched { result: Result<Metrics, FetchFault> },
    DestinationConfigFetched { result: Result<String, FetchFault> },

    // Connectivity transitions from the reachability monitor.
    ReachabilityChanged { satisfied: bool },
}
