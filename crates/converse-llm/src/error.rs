use thiserror::Error;

/// Errors produced while streaming a chat response
#[derive(Debug, Error)]
pub enum LlmError {
    /// The caller cancelled the request
    #[error("request aborted")]
    Aborted,

    /// Network, DNS or TLS failure before or during the response
    #[error("transport error: {0}")]
    Transport(String),

    /// Upstream answered with a non-success status
    #[error("provider returned {status}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Full response body
        body: String,
    },

    /// Upstream reported an error inside an otherwise successful stream
    #[error("stream error: {0}")]
    Stream(String),

    /// Provider kind could not be mapped to a supported vendor protocol
    #[error("unsupported provider type '{provider_type}' for provider '{provider}'")]
    UnsupportedProvider {
        /// Provider identifier
        provider: String,
        /// Declared provider kind
        provider_type: String,
    },

    /// Request parameters are unusable
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The tool executor failed
    #[error("tool '{tool}' failed: {message}")]
    ToolExecution {
        /// Tool name
        tool: String,
        /// Executor error message
        message: String,
    },

    /// An image attachment could not be resolved
    #[error("failed to load image {path}: {message}")]
    Image {
        /// Path as given by the caller
        path: String,
        /// Underlying error
        message: String,
    },

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LlmError {
    /// Whether this error is the result of cancellation
    ///
    /// Callers use this to avoid reporting intentional cancellation as a
    /// failure.
    pub const fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

/// Whether an arbitrary error is an [`LlmError::Aborted`]
///
/// Walks the source chain, so an abort wrapped by a caller's own error type
/// is still recognized.
pub fn is_abort_error(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(err) = current {
        if err.downcast_ref::<LlmError>().is_some_and(LlmError::is_abort) {
            return true;
        }
        current = err.source();
    }
    false
}
