// Navigation policy: which requests stay inside the embedded surface and
// which are handed to the OS-level opener.

use url::Url;

const ALLOWED_SCHEMES: &[&str] = &["http", "https", "about", "blob", "data", "javascript", "file"];
const ALLOWED_PATH_PREFIXES: &[&str] = &["srcdoc", "about:blank", "about:srcdoc"];

pub(crate) fn is_in_app_navigation(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(parsed) => {
            if ALLOWED_SCHEMES.contains(&parsed.scheme()) {
                return true;
            }
            let path = parsed.path();
            path == "about:blank"
                || ALLOWED_PATH_PREFIXES
                    .iter()
                    .any(|prefix| path.starts_with(prefix))
        }
        // Scheme-less frame internals (srcdoc and friends) do not parse as
        // absolute URLs; match them on the raw string.
        Err(_) => {
            raw == "about:blank"
                || ALLOWED_PATH_PREFIXES
                    .iter()
                    .any(|prefix| raw.starts_with(prefix))
        }
    }
}
