use thiserror::Error;

/// Classification of a failed batch submit, used by the handler's retry loop.
///
/// Scylla surfaces most failures as opaque driver errors; `classify` below
/// turns those into the three buckets the retry algorithm actually branches on.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("no host available for batch submit: {0}")]
    Unavailable(String),

    #[error("batch too large: {0}")]
    BatchTooLarge(String),

    #[error("batch submit failed: {0}")]
    Other(String),
}

impl SubmitError {
    /// Best-effort classification from a driver error's display text.
    ///
    /// The driver crate doesn't expose a typed "batch too large" variant -
    /// Scylla/Cassandra return it as a generic invalid-request error with a
    /// recognizable message, so we sniff it here, once, at the boundary.
    pub fn classify(message: impl Into<String>, is_unavailable: bool) -> Self {
        let message = message.into();
        if is_unavailable {
            return SubmitError::Unavailable(message);
        }
        let lower = message.to_lowercase();
        if lower.contains("batch too large") || lower.contains("batch is too large") {
            SubmitError::BatchTooLarge(message)
        } else {
            SubmitError::Other(message)
        }
    }
}

/// User-facing error context, attached to an `anyhow::Error` chain so the
/// top-level binary can surface an operator-friendly message distinct from
/// the full debug chain logged at `error!`.
#[derive(Error, Debug, Clone)]
#[error("{msg}")]
pub struct UserError {
    pub msg: String,
}

impl UserError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

const DEFAULT_USER_ERROR_MESSAGE: &str = "An unknown error occurred";

pub fn get_user_message(error: &anyhow::Error) -> &str {
    for cause in error.chain() {
        if let Some(user_error) = cause.downcast_ref::<UserError>() {
            return &user_error.msg;
        }
    }
    DEFAULT_USER_ERROR_MESSAGE
}
