use miette::Diagnostic;
use std::io;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    #[diagnostic(
        code(qward::config::validation),
        help("Run `qward validate` for detailed validation errors")
    )]
    Validation(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Panel request for '{server}' failed: {reason}")]
    #[diagnostic(
        code(qward::panel::transient),
        help("The panel is slow or briefly unavailable; the action will be retried with backoff")
    )]
    PanelTransient { server: String, reason: String },

    #[error("Panel rejected request for '{server}': {reason}")]
    #[diagnostic(
        code(qward::panel::terminal),
        help("Check the API key and the panel_id mapping for this server in queuewarden.yaml")
    )]
    PanelTerminal { server: String, reason: String },

    #[error("Panel request for '{server}' timed out after {timeout_secs}s")]
    #[diagnostic(code(qward::panel::timeout))]
    PanelTimeout { server: String, timeout_secs: u64 },

    #[error("Rate limit deadline expired before a panel call slot was free")]
    RateDeadline,

    #[error("Server '{0}' is not present in the configuration")]
    #[diagnostic(
        code(qward::server::unknown),
        help("Add the server under `servers:` in queuewarden.yaml to manage its power state")
    )]
    UnknownServer(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the retry/backoff path applies to this failure.
    ///
    /// Transient failures feed bounded re-attempts; everything else is
    /// surfaced immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::PanelTransient { .. } | Error::PanelTimeout { .. } | Error::RateDeadline => true,
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::UnknownServer(name) => Some(format!(
                "Add '{}' to the `servers:` section of queuewarden.yaml, or check the queue subsystem's server naming.",
                name
            )),
            Error::PanelTerminal { server, .. } => Some(format!(
                "Verify the panel API key and that the panel_id configured for '{}' still exists on the panel.",
                server
            )),
            Error::Config(_) | Error::Validation(_) => {
                Some("Validate your config with: qward validate".to_string())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::PanelTransient {
            server: "lobby".into(),
            reason: "502 Bad Gateway".into()
        }
        .is_transient());
        assert!(Error::PanelTimeout {
            server: "lobby".into(),
            timeout_secs: 30
        }
        .is_transient());
        assert!(Error::RateDeadline.is_transient());

        assert!(!Error::PanelTerminal {
            server: "lobby".into(),
            reason: "401 Unauthorized".into()
        }
        .is_transient());
        assert!(!Error::UnknownServer("lobby".into()).is_transient());
        assert!(!Error::Config("bad".into()).is_transient());
    }
}
