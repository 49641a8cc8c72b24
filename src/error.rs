/// Unified error type for the reporter.
///
/// The variants map to how a failure is handled: `Config` is fatal at
/// startup, `Auth` aborts the fetch it occurred in, `Fetch` degrades a
/// single resource section, `Delivery` ends the cycle without retry.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Failed to fetch {resource}: {reason}")]
    Fetch { resource: &'static str, reason: String },

    #[error("Telegram delivery failed: {0}")]
    Delivery(String),
}

impl ReportError {
    pub fn fetch(resource: &'static str, reason: impl Into<String>) -> Self {
        Self::Fetch {
            resource,
            reason: reason.into(),
        }
    }
}
