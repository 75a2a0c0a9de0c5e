// Destination resolution core: the single-threaded app actor.
//
// All resolver state lives here and is only touched from the actor loop.
// Network fetches, timers, and the reachability probe run on the private
// tokio runtime and report back as `InternalEvent`s.

mod config;
mod consent;
mod fetch;
mod reachability;
mod store;

pub use fetch::{FetchFault, Metrics};

use std::sync::{Arc, RwLock};
use std::time::Duration;

use flume::Sender;
use serde_json::Value;

use crate::actions::AppAction;
use crate::state::{now_seconds, AppState, ConsentState, Phase};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

use store::{AppCondition, StateStore};

const FALLBACK_TIMEOUT: Duration = Duration::from_secs(30);
const BOOTSTRAP_DELAY: Duration = Duration::from_secs(5);
const DEPRECATION_DELAY: Duration = Duration::from_millis(500);
const ATTRIBUTION_MERGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Fold the current inputs into a phase. Pure: same inputs, same answer.
fn evaluate_phase(
    acquisition_metrics: &Metrics,
    app_condition: Option<AppCondition>,
    is_initial_execution: bool,
    temp_push_url: Option<&str>,
) -> Phase {
    if acquisition_metrics.is_empty() {
        return Phase::Deprecated;
    }
    if app_condition == Some(AppCondition::Inactive) {
        return Phase::Deprecated;
    }
    if is_initial_execution
        && acquisition_metrics.get("af_status").and_then(Value::as_str) == Some("Organic")
    {
        return Phase::Bootstrapping;
    }
    if temp_push_url.is_some() {
        return Phase::Operational;
    }
    Phase::Bootstrapping
}

/// Push payload contract: a flat map carrying `url` at the top level or
/// nested under `data`. First match wins.
fn extract_push_url(payload: &Value) -> Option<String> {
    if let Some(link) = payload.get("url").and_then(Value::as_str) {
        return Some(link.to_string());
    }
    payload
        .get("data")
        .and_then(|sub| sub.get("url"))
        .and_then(Value::as_str)
        .map(|link| link.to_string())
}

fn parse_metrics(json: &str) -> Metrics {
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(map)) => map,
        _ => {
            tracing::warn!("non-object metrics payload; treating as empty");
            Metrics::new()
        }
    }
}

pub struct AppCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    config: config::AppConfig,
    runtime: tokio::runtime::Runtime,
    store: StateStore,
    http_client: reqwest::Client,
    install_id: String,

    // Attribution intake: the one-shot merge of conversion + deep-link data.
    conversion_metrics: Option<Metrics>,
    deeplink_metrics: Option<Metrics>,
    metrics_dispatch_done: bool,
    merge_timer_token: u64,

    // Resolver session state.
    acquisition_metrics: Metrics,
    destination: Option<String>,
    config_fetch_in_flight: bool,
    fallback_token: u64,
    deprecation_token: u64,
    bootstrap_token: u64,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<AppState>>,
    ) -> Self {
        if let Err(e) = store::ensure_data_dir(&data_dir) {
            tracing::warn!(%e, "data dir unavailable; persistence will be best-effort");
        }
        let config = config::load_app_config(&data_dir);
        let state = AppState::empty();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");

        let store = StateStore::open(&data_dir);
        let install_id = store::load_or_create_install_id(&data_dir);

        let mut this = Self {
            state,
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            store,
            http_client: reqwest::Client::new(),
            install_id,
            conversion_metrics: None,
            deeplink_metrics: None,
            metrics_dispatch_done: false,
            merge_timer_token: 0,
            acquisition_metrics: Metrics::new(),
            destination: None,
            config_fetch_in_flight: false,
            fallback_token: 0,
            deprecation_token: 0,
            bootstrap_token: 0,
        };

        this.sync_consent_state();
        this.arm_fallback_timer();

        if this.config.network_enabled() {
            reachability::spawn_monitor(
                &this.runtime,
                this.core_sender.clone(),
                this.config.reachability_probe_addr().to_string(),
                Duration::from_secs(this.config.reachability_interval_secs()),
            );
        }

        // Ensure LogbookApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(ref action) => {
                // Never log the action payloads: they carry attribution data
                // and push tokens.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action.clone());
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::ConversionDataReceived { metrics_json } => {
                self.handle_conversion_data(parse_metrics(&metrics_json))
            }
            AppAction::ConversionDataFailed => self.handle_conversion_failed(),
            AppAction::DeepLinkResolved { metrics_json } => {
                self.handle_deep_link(parse_metrics(&metrics_json))
            }
            AppAction::PushTokenReceived { token } => {
                tracing::info!("push: registration token received");
                self.store.set_push_token(&token);
            }
            AppAction::PushPayloadReceived { payload_json } => {
                self.handle_push_payload(&payload_json)
            }
            AppAction::ConsentPromptAccepted { authorized } => {
                self.handle_consent_accepted(authorized)
            }
            AppAction::ConsentPromptDismissed => self.handle_consent_skip(),
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::FallbackElapsed { token } => self.handle_fallback_elapsed(token),
            InternalEvent::DeprecationDelayElapsed { token } => {
                self.handle_deprecation_delay_elapsed(token)
            }
            InternalEvent::BootstrapDelayElapsed { token } => {
                self.handle_bootstrap_delay_elapsed(token)
            }
            InternalEvent::AttributionMergeElapsed { token } => {
                self.handle_attribution_merge_elapsed(token)
            }
            InternalEvent::OrganicMetricsFetched { result } => {
                self.handle_organic_metrics_fetched(result)
            }
            InternalEvent::DestinationConfigFetched { result } => {
                self.handle_destination_config_fetched(result)
            }
            InternalEvent::ReachabilityChanged { satisfied } => {
                self.handle_reachability_changed(satisfied)
            }
        }
    }

    // --- attribution intake -------------------------------------------------

    fn handle_conversion_data(&mut self, metrics: Metrics) {
        self.conversion_metrics = Some(metrics);
        if self.deeplink_metrics.is_some() {
            self.merge_and_dispatch();
            return;
        }
        // A deep link may still resolve; give it a bounded window before
        // dispatching conversion data alone.
        self.merge_timer_token += 1;
        let token = self.merge_timer_token;
        self.schedule(ATTRIBUTION_MERGE_TIMEOUT, move || {
            InternalEvent::AttributionMergeElapsed { token }
        });
    }

    fn handle_conversion_failed(&mut self) {
        tracing::warn!("conversion data unavailable; resolving with empty metrics");
        self.acquisition_metrics_received(Metrics::new());
    }

    fn handle_deep_link(&mut self, metrics: Metrics) {
        // The persisted one-shot flag also gates the deep-link path so a
        // replayed link after restart cannot re-trigger a merge.
        if self.store.metrics_dispatched() {
            return;
        }
        self.deeplink_metrics = Some(metrics);
        self.merge_timer_token += 1;
        if self.conversion_metrics.is_some() {
            self.merge_and_dispatch();
        }
    }

    fn handle_attribution_merge_elapsed(&mut self, token: u64) {
        if token != self.merge_timer_token || self.metrics_dispatch_done {
            return;
        }
        self.merge_and_dispatch();
    }

    fn merge_and_dispatch(&mut self) {
        if self.metrics_dispatch_done {
            return;
        }
        self.metrics_dispatch_done = true;
        self.merge_timer_token += 1;

        let conversion = self.conversion_metrics.clone().unwrap_or_default();
        let deeplink = self.deeplink_metrics.clone().unwrap_or_default();
        let merged = fetch::merge_metrics(conversion, &deeplink);

        self.store.mark_metrics_dispatched();
        self.acquisition_metrics_received(merged);
    }

    fn acquisition_metrics_received(&mut self, metrics: Metrics) {
        self.fallback_token += 1;
        self.acquisition_metrics = metrics;
        self.revise_phase();
    }

    // --- push ---------------------------------------------------------------

    fn handle_push_payload(&mut self, payload_json: &str) {
        let payload: Value = match serde_json::from_str(payload_json) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(%e, "unreadable push payload");
                return;
            }
        };
        if let Some(link) = extract_push_url(&payload) {
            tracing::info!("push: payload delivered a destination");
            self.store.set_temp_push_url(&link);
        }
    }

    // --- consent ------------------------------------------------------------

    fn handle_consent_accepted(&mut self, authorized: bool) {
        self.store.approve_consent(authorized);
        if !authorized {
            self.store.decline_consent(true);
        }
        self.store.update_consent_decided_at(now_seconds());
        self.state.reveal_consent_prompt = false;
        self.sync_consent_state();

        if self.destination.is_some() {
            self.designate_phase(Phase::Operational);
        } else {
            self.emit_state();
            self.invoke_config_acquisition();
        }
    }

    fn handle_consent_skip(&mut self) {
        self.store.update_consent_decided_at(now_seconds());
        self.state.reveal_consent_prompt = false;
        self.emit_state();
        self.invoke_config_acquisition();
    }

    // --- resolver -----------------------------------------------------------

    fn revise_phase(&mut self) {
        if !self.is_operational_period() {
            self.deprecation_token += 1;
            let token = self.deprecation_token;
            self.schedule(DEPRECATION_DELAY, move || {
                InternalEvent::DeprecationDelayElapsed { token }
            });
            return;
        }
        self.handle_metrics_presence();
    }

    fn handle_metrics_presence(&mut self) {
        if self.acquisition_metrics.is_empty() {
            self.load_cached_destination();
            return;
        }
        self.check_app_condition();
    }

    fn check_app_condition(&mut self) {
        if self.store.app_condition() == Some(AppCondition::Inactive) {
            self.activate_deprecated();
            self.designate_phase(Phase::Deprecated);
            return;
        }
        self.evaluate_and_proceed();
    }

    fn evaluate_and_proceed(&mut self) {
        let assessed = evaluate_phase(
            &self.acquisition_metrics,
            self.store.app_condition(),
            self.store.is_initial_execution(),
            self.store.temp_push_url().as_deref(),
        );
        if assessed == Phase::Bootstrapping && self.store.is_initial_execution() {
            self.commence_bootstrapping();
            return;
        }
        self.handle_provisional_url();
    }

    fn handle_provisional_url(&mut self) {
        if self.destination.is_none() {
            if let Some(provisional) = self.store.temp_push_url() {
                if url::Url::parse(&provisional).is_ok() {
                    self.destination = Some(provisional);
                    self.designate_phase(Phase::Operational);
                    return;
                }
            }
        }
        self.check_destination_presence();
    }

    fn check_destination_presence(&mut self) {
        if self.destination.is_some() {
            self.designate_phase(Phase::Operational);
            return;
        }
        if consent::consent_prompt_needed(&self.store, now_seconds()) {
            self.state.reveal_consent_prompt = true;
            self.emit_state();
        } else {
            self.invoke_config_acquisition();
        }
    }

    fn commence_bootstrapping(&mut self) {
        self.bootstrap_token += 1;
        let token = self.bootstrap_token;
        self.schedule(BOOTSTRAP_DELAY, move || InternalEvent::BootstrapDelayElapsed {
            token,
        });
    }

    fn handle_bootstrap_delay_elapsed(&mut self, token: u64) {
        if token != self.bootstrap_token {
            return;
        }
        self.acquire_organic_metrics();
    }

    fn acquire_organic_metrics(&mut self) {
        let client = self.http_client.clone();
        let endpoint = self.config.attribution_endpoint().to_string();
        let program_id = self.config.attribution_program_id().to_string();
        let auth_key = self.config.attribution_auth_key().to_string();
        let device_id = self.install_id.clone();
        let entry = self.deeplink_metrics.clone().unwrap_or_default();
        let tx = self.core_sender.clone();

        self.runtime.spawn(async move {
            let result =
                fetch::fetch_organic_metrics(&client, &endpoint, &program_id, &auth_key, &device_id)
                    .await
                    .map(|m| fetch::merge_metrics(m, &entry));
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::OrganicMetricsFetched { result },
            )));
        });
    }

    fn handle_organic_metrics_fetched(&mut self, result: Result<Metrics, FetchFault>) {
        match result {
            Ok(unified) => {
                self.acquisition_metrics = unified;
                self.invoke_config_acquisition();
            }
            Err(fault) => {
                tracing::warn!(%fault, "organic metrics retrieval failed");
                self.activate_deprecated();
                self.designate_phase(Phase::Deprecated);
            }
        }
    }

    fn invoke_config_acquisition(&mut self) {
        if self.config_fetch_in_flight {
            return;
        }
        self.config_fetch_in_flight = true;

        let client = self.http_client.clone();
        let endpoint = self.config.config_endpoint().to_string();
        let payload = self.build_setup_payload();
        let tx = self.core_sender.clone();

        self.runtime.spawn(async move {
            let result = fetch::fetch_destination_config(&client, &endpoint, &payload).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::DestinationConfigFetched { result },
            )));
        });
    }

    fn build_setup_payload(&self) -> Value {
        let mut data = self.acquisition_metrics.clone();
        data.insert("os".into(), Value::from(self.config.os_tag()));
        data.insert("af_id".into(), Value::from(self.install_id.as_str()));
        data.insert("bundle_id".into(), Value::from(self.config.bundle_id()));
        data.insert(
            "firebase_project_id".into(),
            self.config
                .firebase_project_id()
                .map(Value::from)
                .unwrap_or(Value::Null),
        );
        data.insert("store_id".into(), Value::from(self.config.store_id()));
        data.insert(
            "push_token".into(),
            self.store
                .push_token()
                .map(Value::from)
                .unwrap_or(Value::Null),
        );
        data.insert("locale".into(), Value::from(self.config.locale()));
        Value::Object(data)
    }

    fn handle_destination_config_fetched(&mut self, result: Result<String, FetchFault>) {
        self.config_fetch_in_flight = false;
        match result {
            Ok(dest) => {
                self.store.persist_destination(&dest);
                self.store.assign_app_condition(AppCondition::LogView);
                self.store.mark_execution_completed();
                self.destination = Some(dest);

                if consent::consent_prompt_needed(&self.store, now_seconds()) {
                    // Hold the destination until the prompt resolves.
                    self.state.reveal_consent_prompt = true;
                    self.emit_state();
                } else {
                    self.designate_phase(Phase::Operational);
                }
            }
            Err(fault) => {
                tracing::warn!(%fault, "destination config acquisition failed");
                self.handle_config_failure();
            }
        }
    }

    fn handle_config_failure(&mut self) {
        match self.store.stored_destination() {
            Some(cached) => {
                self.destination = Some(cached);
                self.designate_phase(Phase::Operational);
            }
            None => {
                self.activate_deprecated();
                self.designate_phase(Phase::Deprecated);
            }
        }
    }

    fn load_cached_destination(&mut self) {
        match self.store.stored_destination() {
            Some(cached) => {
                self.destination = Some(cached);
                self.designate_phase(Phase::Operational);
            }
            None => {
                self.activate_deprecated();
                self.designate_phase(Phase::Deprecated);
            }
        }
    }

    // --- timers -------------------------------------------------------------

    fn arm_fallback_timer(&mut self) {
        self.fallback_token += 1;
        let token = self.fallback_token;
        self.schedule(FALLBACK_TIMEOUT, move || InternalEvent::FallbackElapsed {
            token,
        });
    }

    fn handle_fallback_elapsed(&mut self, token: u64) {
        if token != self.fallback_token {
            return;
        }
        if self.acquisition_metrics.is_empty()
            && self.deeplink_metrics.is_none()
            && self.state.phase == Phase::Bootstrapping
        {
            tracing::info!("no attribution input within the fallback window");
            self.activate_deprecated();
            self.designate_phase(Phase::Deprecated);
        }
    }

    fn handle_deprecation_delay_elapsed(&mut self, token: u64) {
        if token != self.deprecation_token {
            return;
        }
        self.activate_deprecated();
        self.designate_phase(Phase::Deprecated);
    }

    // --- reachability -------------------------------------------------------

    fn handle_reachability_changed(&mut self, satisfied: bool) {
        self.state.network_satisfied = satisfied;
        if !satisfied {
            if self.store.app_condition() == Some(AppCondition::LogView) {
                self.designate_phase(Phase::Unreachable);
            } else {
                self.activate_deprecated();
                self.designate_phase(Phase::Deprecated);
            }
            return;
        }
        if self.state.phase == Phase::Unreachable {
            // Connectivity is back while a destination session was active:
            // re-run resolution rather than staying stranded.
            self.emit_state();
            self.revise_phase();
        } else {
            self.emit_state();
        }
    }

    // --- shared plumbing ----------------------------------------------------

    fn is_operational_period(&self) -> bool {
        self.config
            .availability_threshold()
            .and_hms_opt(0, 0, 0)
            .map(|threshold| chrono::Utc::now().naive_utc() >= threshold)
            .unwrap_or(false)
    }

    fn activate_deprecated(&mut self) {
        self.store.assign_app_condition(AppCondition::Inactive);
        self.store.mark_execution_completed();
    }

    fn designate_phase(&mut self, phase: Phase) {
        self.state.phase = phase;
        self.state.destination = self.destination.clone();
        self.emit_state();
    }

    fn sync_consent_state(&mut self) {
        self.state.consent = if self.store.is_consent_approved() {
            ConsentState::Approved
        } else if self.store.is_consent_declined() {
            ConsentState::Declined
        } else {
            ConsentState::Unset
        };
    }

    fn schedule(
        &self,
        delay: Duration,
        make: impl FnOnce() -> InternalEvent + Send + 'static,
    ) {
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(make())));
        });
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }
}
