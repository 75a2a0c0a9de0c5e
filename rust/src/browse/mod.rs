// Embedded browsing session controller.
//
// Owns navigation policy, the redirect-loop breaker, the popup stack, and
// cookie continuity for a resolved destination. The host webview forwards
// its delegate callbacks here and is driven back through `BrowserHost`.
//
// Delegate callbacks can arrive on any host thread, so all session state
// sits behind one mutex. Host callbacks are always invoked with the lock
// released; a synchronous host re-entry must not deadlock.

mod cookies;
mod policy;

use std::sync::Mutex;

pub use cookies::CookieRecord;
use cookies::CookieJar;

pub const PRIMARY_SURFACE: u32 = 0;

/// Server-redirect hops tolerated within one navigation attempt before the
/// loop breaker stops the load and falls back to the last committed URL.
pub const REDIRECT_STORM_THRESHOLD: u32 = 70;

/// Injected after every navigation finish: forces a non-scalable viewport,
/// disables pinch/gesture zoom at the DOM level, and keeps form inputs at a
/// legible size. Safe to run repeatedly on the same document.
const PAGE_HARDENING_SCRIPT: &str = r#"(function () {
  var meta = document.querySelector('meta[name=viewport]');
  if (!meta) {
    meta = document.createElement('meta');
    meta.name = 'viewport';
    document.head.appendChild(meta);
  }
  meta.setAttribute('content', 'width=device-width, initial-scale=1.0, maximum-scale=1.0, user-scalable=no');
  ['gesturestart', 'gesturechange', 'gestureend'].forEach(function (name) {
    document.addEventListener(name, function (e) { e.preventDefault(); }, { passive: false });
  });
  if (!document.getElementById('__fsl_input_fix')) {
    var style = document.createElement('style');
    style.id = '__fsl_input_fix';
    style.textContent = 'input, select, textarea { font-size: 16px !important; }';
    document.head.appendChild(style);
  }
})();"#;

/// Fixed configuration every surface (primary and popups alike) is built
/// with.
#[derive(uniffi::Record, Debug, Clone, PartialEq, Eq)]
pub struct SurfaceConfiguration {
    pub javascript_enabled: bool,
    pub inline_media_playback: bool,
    pub media_requires_user_gesture: bool,
}

#[derive(uniffi::Enum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationDecision {
    Allow,
    Cancel,
}

#[derive(uniffi::Enum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustVerdict {
    Accept,
    Reject,
}

#[derive(uniffi::Enum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDisposition {
    Present,
    Suppress,
}

/// Host-side webview operations the controller drives.
#[uniffi::export(callback_interface)]
pub trait BrowserHost: Send + Sync + 'static {
    fn load_url(&self, surface: u32, url: String);
    fn stop_loading(&self, surface: u32);
    fn go_back(&self, surface: u32);
    fn open_external(&self, url: String);
    /// The popup must fully overlay the parent surface's bounds and carry a
    /// left-edge swipe recogniser routed to `back_gesture`.
    fn present_popup(&self, surface: u32);
    fn dismiss_popup(&self, surface: u32);
    fn apply_cookies(&self, cookies: Vec<CookieRecord>);
    fn run_script(&self, surface: u32, script: String);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NavState {
    Idle,
    Loading,
    Committed,
    Redirecting,
    Finished,
    Recovering,
}

#[derive(Debug)]
struct Surface {
    id: u32,
    nav: NavState,
    redirect_count: u32,
    redirected_in_attempt: bool,
    origin_url: Option<String>,
    last_committed: Option<String>,
    candidate: Option<String>,
    /// Popups only: URL the parent reloads when this surface is popped.
    fallback_url: Option<String>,
}

impl Surface {
    fn new(id: u32, origin_url: Option<String>) -> Self {
        Self {
            id,
            nav: NavState::Idle,
            redirect_count: 0,
            redirected_in_attempt: false,
            origin_url,
            last_committed: None,
            candidate: None,
            fallback_url: None,
        }
    }

    /// Last committed URL, else the latest recorded candidate, else the URL
    /// the surface was opened with.
    fn recovery_url(&self) -> Option<String> {
        self.last_committed
            .clone()
            .or_else(|| self.candidate.clone())
            .or_else(|| self.origin_url.clone())
    }
}

#[derive(Debug)]
struct SessionInner {
    primary: Surface,
    popups: Vec<Surface>,
    next_popup_id: u32,
    jar: CookieJar,
}

impl SessionInner {
    fn surface_mut(&mut self, id: u32) -> Option<&mut Surface> {
        if self.primary.id == id {
            return Some(&mut self.primary);
        }
        self.popups.iter_mut().find(|s| s.id == id)
    }
}

#[derive(uniffi::Object)]
pub struct BrowserSession {
    host: Box<dyn BrowserHost>,
    inner: Mutex<SessionInner>,
}

#[uniffi::export]
impl BrowserSession {
    #[uniffi::constructor]
    pub fn new(data_dir: String, destination: String, host: Box<dyn BrowserHost>) -> std::sync::Arc<Self> {
        let inner = SessionInner {
            primary: Surface::new(PRIMARY_SURFACE, Some(destination)),
            popups: Vec::new(),
            next_popup_id: PRIMARY_SURFACE + 1,
            jar: CookieJar::open(&data_dir),
        };
        std::sync::Arc::new(Self {
            host,
            inner: Mutex::new(inner),
        })
    }

    /// Configuration for building any surface of this session. Popups
    /// inherit it unchanged.
    pub fn surface_configuration(&self) -> SurfaceConfiguration {
        SurfaceConfiguration {
            javascript_enabled: true,
            inline_media_playback: true,
            media_requires_user_gesture: false,
        }
    }

    /// Restore persisted cookies into the surface and load the destination.
    pub fn start(&self) {
        let (cookies, destination) = {
            let mut inner = self.lock();
            inner.primary.nav = NavState::Loading;
            (inner.jar.restore(), inner.primary.origin_url.clone())
        };
        if !cookies.is_empty() {
            self.host.apply_cookies(cookies);
        }
        if let Some(destination) = destination {
            self.host.load_url(PRIMARY_SURFACE, destination);
        }
    }

    /// Policy for a navigation request. The candidate URL is recorded
    /// whatever the outcome; foreign schemes go to the OS-level opener and
    /// the in-app load is cancelled.
    pub fn decide_navigation(&self, surface: u32, url: String) -> NavigationDecision {
        let allowed = policy::is_in_app_navigation(&url);
        {
            let mut inner = self.lock();
            if let Some(s) = inner.surface_mut(surface) {
                s.candidate = Some(url.clone());
            }
        }
        if allowed {
            NavigationDecision::Allow
        } else {
            tracing::info!(surface, "handing foreign scheme to external opener");
            self.host.open_external(url);
            NavigationDecision::Cancel
        }
    }

    pub fn record_started(&self, surface: u32) {
        let mut inner = self.lock();
        if let Some(s) = inner.surface_mut(surface) {
            tracing::debug!(surface, from = ?s.nav, "navigation started");
            s.nav = NavState::Loading;
            s.redirected_in_attempt = false;
        }
    }

    pub fn record_committed(&self, surface: u32, url: String) {
        let mut inner = self.lock();
        if let Some(s) = inner.surface_mut(surface) {
            s.nav = NavState::Committed;
            s.last_committed = Some(url);
        }
    }

    /// A server redirect hop. Beyond the storm threshold the load is stopped
    /// and the surface falls back to its last committed URL; otherwise the
    /// cookie snapshot is persisted and the hop recorded as the candidate.
    pub fn record_redirect(&self, surface: u32, url: String, cookies: Vec<CookieRecord>) {
        let storm = {
            let mut inner = self.lock();
            let storm = {
                let Some(s) = inner.surface_mut(surface) else {
                    return;
                };
                s.nav = NavState::Redirecting;
                s.redirected_in_attempt = true;
                s.redirect_count += 1;
                if s.redirect_count >= REDIRECT_STORM_THRESHOLD {
                    s.redirect_count = 0;
                    s.nav = NavState::Recovering;
                    tracing::warn!(surface, "redirect storm; recovering to last good URL");
                    Some(s.recovery_url())
                } else {
                    s.candidate = Some(url);
                    None
                }
            };
            if storm.is_none() {
                inner.jar.replace_snapshot(&cookies);
            }
            storm
        };
        if let Some(recovery) = storm {
            self.host.stop_loading(surface);
            if let Some(url) = recovery {
                self.host.load_url(surface, url);
            }
        }
    }

    pub fn record_finished(&self, surface: u32) {
        {
            let mut inner = self.lock();
            if let Some(s) = inner.surface_mut(surface) {
                s.nav = NavState::Finished;
                if !s.redirected_in_attempt {
                    s.redirect_count = 0;
                }
                s.redirected_in_attempt = false;
            }
        }
        self.host
            .run_script(surface, PAGE_HARDENING_SCRIPT.to_string());
    }

    /// Provisional-navigation failure. Only the too-many-redirects class is
    /// recovered; every other failure is left alone.
    pub fn record_failed(&self, surface: u32, too_many_redirects: bool) {
        if !too_many_redirects {
            return;
        }
        let recovery = {
            let mut inner = self.lock();
            let Some(s) = inner.surface_mut(surface) else {
                return;
            };
            s.nav = NavState::Recovering;
            s.redirect_count = 0;
            s.recovery_url()
        };
        if let Some(url) = recovery {
            self.host.load_url(surface, url);
        }
    }

    /// Window-open style request. A child surface is created only for true
    /// new-window requests, and loaded only when the target is a real URL.
    pub fn open_popup(
        &self,
        url: String,
        targets_existing_frame: bool,
        fallback_url: Option<String>,
    ) -> Option<u32> {
        if targets_existing_frame {
            return None;
        }
        let should_load = !url.is_empty() && url != "about:blank";
        let id = {
            let mut inner = self.lock();
            let id = inner.next_popup_id;
            inner.next_popup_id += 1;
            let mut surface = Surface::new(id, should_load.then(|| url.clone()));
            surface.fallback_url = fallback_url;
            if should_load {
                surface.nav = NavState::Loading;
            }
            inner.popups.push(surface);
            id
        };
        self.host.present_popup(id);
        if should_load {
            self.host.load_url(id, url);
        }
        Some(id)
    }

    /// Left-edge swipe: back in the surface's own history when possible,
    /// else pop the surface off the popup stack.
    pub fn back_gesture(&self, surface: u32, can_go_back: bool) {
        if can_go_back {
            self.host.go_back(surface);
            return;
        }
        let (popped, parent) = {
            let mut inner = self.lock();
            if inner.popups.last().map(|s| s.id) != Some(surface) {
                return;
            }
            let Some(popped) = inner.popups.pop() else {
                return;
            };
            let parent = inner.popups.last().map(|s| s.id).unwrap_or(PRIMARY_SURFACE);
            (popped, parent)
        };
        self.host.dismiss_popup(popped.id);
        if let Some(fallback) = popped.fallback_url {
            self.host.load_url(parent, fallback);
        }
    }

    /// TLS server-trust challenges are always accepted (no pinning).
    pub fn resolve_server_trust(&self) -> TrustVerdict {
        TrustVerdict::Accept
    }

    /// JS alerts are acknowledged without being displayed.
    pub fn alert_disposition(&self) -> AlertDisposition {
        AlertDisposition::Suppress
    }
}

impl BrowserSession {
    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }
}
