#[derive(uniffi::Enum, Debug, Clone)]
pub enum AppAction {
    // Attribution SDK callbacks forwarded by the shell.
    ConversionDataReceived { metrics_json: String },
    ConversionDataFailed,
    DeepLinkResolved { metrics_json: String },

    // Push plumbing.
    PushTokenReceived { token: String },
    PushPayloadReceived { payload_json: String },

    // Notification-consent prompt outcomes. `authorized` carries the OS
    // permission dialog result after the user accepted our prompt.
    ConsentPromptAccepted { authorized: bool },
    ConsentPromptDismissed,
}

impl AppAction {
    /// Log-safe action tag (never includes metrics payloads or push tokens).
    pub fn tag(&self) -> &'static str {
        match self {
            AppAction::ConversionDataReceived { .. } => "ConversionDataReceived",
            AppAction::ConversionDataFailed => "ConversionDataFailed",
            AppAction::DeepLinkResolved { .. } => "DeepLinkResolved",
            AppAction::PushTokenReceived { .. } => "PushTokenReceived",
            AppAction::PushPayloadReceived { .. } => "PushPayloadReceived",
            AppAction::ConsentPromptAccepted { .. } => "ConsentPromptAccepted",
            AppAction::ConsentPromptDismissed => "ConsentPromptDismissed",
        }
    }
}
