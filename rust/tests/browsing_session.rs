//! End-to-end: a resolved destination drives a browsing session, and a
//! redirect storm on it recovers to the last committed URL.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use fishscale_core::{
    AppAction, BrowserHost, BrowserSession, CookieRecord, LogbookApp, Phase, PRIMARY_SURFACE,
    REDIRECT_STORM_THRESHOLD,
};
use tempfile::tempdir;

#[path = "support/mod.rs"]
mod support;

#[derive(Debug, Clone, PartialEq)]
enum HostCall {
    Load(u32, String),
    Stop(u32),
    OpenExternal(String),
    RunScript(u32),
}

struct TestHost {
    calls: Arc<Mutex<Vec<HostCall>>>,
}

impl BrowserHost for TestHost {
    fn load_url(&self, surface: u32, url: String) {
        self.calls.lock().unwrap().push(HostCall::Load(surface, url));
    }
    fn stop_loading(&self, surface: u32) {
        self.calls.lock().unwrap().push(HostCall::Stop(surface));
    }
    fn go_back(&self, _surface: u32) {}
    fn open_external(&self, url: String) {
        self.calls.lock().unwrap().push(HostCall::OpenExternal(url));
    }
    fn present_popup(&self, _surface: u32) {}
    fn dismiss_popup(&self, _surface: u32) {}
    fn apply_cookies(&self, _cookies: Vec<CookieRecord>) {}
    fn run_script(&self, surface: u32, _script: String) {
        self.calls.lock().unwrap().push(HostCall::RunScript(surface));
    }
}

fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

#[test]
fn resolved_destination_survives_a_redirect_storm() {
    let config_stub = support::serve_json(
        200,
        serde_json::json!({"ok": true, "url": "https://dest.example/a"}),
    );

    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_string_lossy().to_string();
    std::fs::write(
        Path::new(&data_dir).join("fishscale_config.json"),
        serde_json::to_vec(&serde_json::json!({
            "disable_network": true,
            "config_endpoint": config_stub.url,
        }))
        .unwrap(),
    )
    .unwrap();
    std::fs::write(
        Path::new(&data_dir).join("app_state.json"),
        serde_json::to_vec(&serde_json::json!({
            "executed_previously": true,
            "app_condition": "LogView",
            "consent_approved": true,
        }))
        .unwrap(),
    )
    .unwrap();

    let app = LogbookApp::new(data_dir.clone());
    app.dispatch(AppAction::ConversionDataReceived {
        metrics_json: r#"{"af_status":"Non-organic"}"#.to_string(),
    });
    app.dispatch(AppAction::DeepLinkResolved {
        metrics_json: "{}".to_string(),
    });

    wait_until("destination resolved", Duration::from_secs(10), || {
        app.state().phase == Phase::Operational
    });
    let destination = app.state().destination.unwrap();

    // The shell builds the webview and hands its callbacks to a session.
    let calls = Arc::new(Mutex::new(Vec::new()));
    let session = BrowserSession::new(
        data_dir,
        destination.clone(),
        Box::new(TestHost {
            calls: calls.clone(),
        }),
    );

    session.start();
    session.record_committed(PRIMARY_SURFACE, destination.clone());
    session.record_finished(PRIMARY_SURFACE);
    calls.lock().unwrap().clear();

    for i in 0..(REDIRECT_STORM_THRESHOLD + 1) {
        session.record_redirect(
            PRIMARY_SURFACE,
            format!("https://dest.example/hop/{i}"),
            vec![],
        );
    }

    let calls = calls.lock().unwrap();
    assert_eq!(calls[0], HostCall::Stop(PRIMARY_SURFACE));
    assert_eq!(calls[1], HostCall::Load(PRIMARY_SURFACE, destination));
}
