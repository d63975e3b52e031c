use thiserror::Error;

use crate::capability::Operation;

/// Error taxonomy for the bridge, the session manager and the drivers.
///
/// The variants are grouped by where they originate: protocol errors never
/// leave the bridge layer, session errors trigger recovery before they are
/// surfaced, and operation errors are what the agent ultimately sees.
#[derive(Debug, Error)]
pub enum AutomationError {
    // -- protocol layer ------------------------------------------------------

    /// A parameter was missing, empty, or of the wrong shape.
    #[error("{0}")]
    InvalidParams(String),

    /// The request body was not syntactically valid JSON. Distinct from
    /// `InvalidParams` so the agent can tell a typo from a schema mistake.
    #[error("malformed JSON body: {0}")]
    MalformedBody(String),

    /// The request body exceeded the size ceiling.
    #[error("request body exceeds the {0} byte limit")]
    BodyTooLarge(usize),

    // -- capability gating ---------------------------------------------------

    /// The active driver does not implement an optional operation.
    #[error("{op} is not supported by the connected browser driver")]
    Unsupported { op: Operation },

    /// No handler has been registered on the bridge yet.
    #[error("no browser handler registered on the bridge")]
    HandlerUnavailable,

    // -- session -------------------------------------------------------------

    /// The transport to the browser could not be established.
    #[error("browser connection failed: {0}")]
    ConnectionFailed(String),

    /// Connected, but no open page matched the target URL.
    #[error("could not find a matching page: {0}")]
    PageNotFound(String),

    /// A previously working connection or page went away mid-operation.
    #[error("browser connection lost: {0}")]
    ConnectionLost(String),

    // -- operation level -----------------------------------------------------

    /// The selector is syntactically invalid and will never match. Never
    /// retried.
    #[error("invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// The selector matched nothing on this attempt. Retried, and converted
    /// into a descriptive `Timeout` once the retry budget is spent.
    #[error("element {0:?} not found")]
    ElementNotFound(String),

    /// An operation exceeded its budget. The message names the operation,
    /// the target and the configured timeout.
    #[error("{0}")]
    Timeout(String),

    /// A remote script ran but produced output the pipeline could not parse.
    #[error("script evaluation failed: {0}")]
    Script(String),

    /// Anything else. Logged and surfaced as a generic failure.
    #[error("{0}")]
    Unexpected(String),
}

impl AutomationError {
    /// Whether the session manager should retry the operation after a short
    /// delay. Element lookups are retried to tolerate in-flight renders;
    /// lost connections are retried after a recovery pass.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            AutomationError::ElementNotFound(_) | AutomationError::ConnectionLost(_)
        )
    }

    /// Whether the error indicates the session itself needs recovery
    /// (relocate the page, or reconnect the transport) before retrying.
    pub fn is_session_recoverable(&self) -> bool {
        matches!(
            self,
            AutomationError::ConnectionLost(_) | AutomationError::PageNotFound(_)
        )
    }

    /// Classify a driver-level failure message into the taxonomy. Transport
    /// failures become `ConnectionLost` so the session manager knows to
    /// recover; anything unrecognised stays `Unexpected`.
    pub fn from_driver(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        const LOST_SUBSTRINGS: &[&str] = &[
            "connection closed",
            "browser closed",
            "target crashed",
            "target closed",
            "context destroyed",
            "no such session",
            "disconnected",
            "websocket",
            "channel closed",
        ];
        if LOST_SUBSTRINGS.iter().any(|needle| lower.contains(needle)) {
            AutomationError::ConnectionLost(message)
        } else {
            AutomationError::Unexpected(message)
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AutomationError>;
