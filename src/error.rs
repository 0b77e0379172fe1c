//! Error types for sscn.
//!
//! Errors are strongly typed using thiserror and split by how the resolution
//! engine reacts to them:
//!
//! - [`ContentError`]: a candidate cannot produce a field right now. The
//!   dispatch loop treats it as "try the next candidate".
//! - [`ContractError`]: a page plugin or source declaration violates its own
//!   declared contract. Never swallowed.
//! - [`ValidationError`]: bad input from the caller.

use thiserror::Error;

/// Validation errors that occur during input validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No standard code found in the text.
    #[error("\"{code}\" is not a valid standard code")]
    MalformedCode {
        /// The offending code.
        code: String,
    },

    /// The code lacks a prefix, mandatory flag or year.
    #[error("Standard code \"{code}\" is not concrete (prefix, mandatory flag and year are required)")]
    NotConcrete {
        /// The offending code.
        code: String,
    },

    /// A settings document failed to parse or validate.
    #[error("Invalid settings: {reason}")]
    InvalidSettings {
        /// What went wrong.
        reason: String,
    },
}

/// Failures reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request timed out.
    #[error("Request to {url} timed out after {timeout_ms}ms")]
    Timeout {
        /// Requested URL.
        url: String,
        /// Timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The request failed for another transport reason.
    #[error("Connection to {url} failed: {message}")]
    Connection {
        /// Requested URL.
        url: String,
        /// Underlying error message.
        message: String,
    },

    /// The request or client could not be built.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Underlying error message.
        message: String,
    },
}

impl TransportError {
    /// Returns true if this is a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// A field cannot be produced by a candidate.
///
/// `NotFound` and `StandardNotFound` are structural and never retried.
/// `Request` is retried by the page up to `Settings::max_page_retry`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    /// The candidate cannot answer right now.
    #[error("Content unavailable: {reason}")]
    Unavailable {
        /// What went wrong.
        reason: String,
    },

    /// The candidate has nothing to fetch for this standard.
    #[error("Content not found: {reason}")]
    NotFound {
        /// What went wrong.
        reason: String,
    },

    /// A listing had no entry for the standard.
    #[error("Standard not found in `{origin}`")]
    StandardNotFound {
        /// Source name.
        origin: String,
    },

    /// The transport failed.
    #[error("Request error: {0}")]
    Request(#[from] TransportError),
}

impl ContentError {
    /// Creates a generic content-unavailable error.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Creates a content-not-found error.
    #[must_use]
    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::NotFound {
            reason: reason.into(),
        }
    }

    /// Returns true for `NotFound` and its `StandardNotFound` refinement.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::StandardNotFound { .. })
    }

    /// Returns true if this error was caused by the transport.
    #[must_use]
    pub const fn is_request(&self) -> bool {
        matches!(self, Self::Request(_))
    }
}

/// Violations of a page's or source's declared field contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    /// A declared field was missing from a fetch result.
    #[error("Field `{field}` is declared by page `{page}` but its fetch didn't return it")]
    MissingDeclaredField {
        /// Page name.
        page: String,
        /// Field name.
        field: String,
    },

    /// A fetch returned a field its page does not declare.
    #[error("Page `{page}` returned field `{field}`, but it's not declared by the page")]
    UnregisteredField {
        /// Page name.
        page: String,
        /// Field name.
        field: String,
    },

    /// A field is declared both public and source-only.
    #[error("Page `{page}` declares field `{field}` as both public and source-only")]
    ConflictingDeclaration {
        /// Page name.
        page: String,
        /// Field name.
        field: String,
    },

    /// A preferred field is not declared by its page.
    #[error("Page `{page}` prefers field `{field}` without declaring it")]
    UndeclaredPreferredField {
        /// Page name.
        page: String,
        /// Field name.
        field: String,
    },

    /// Two pages of one source share a name.
    #[error("Source `{source_name}` composes page `{page}` more than once")]
    DuplicatePage {
        /// Source name.
        source_name: String,
        /// Page name.
        page: String,
    },

    /// Two sources share a name.
    #[error("Source `{source_name}` is registered more than once")]
    DuplicateSource {
        /// Source name.
        source_name: String,
    },

    /// A source composes no pages.
    #[error("Source `{source_name}` composes no pages")]
    EmptySource {
        /// Source name.
        source_name: String,
    },
}

/// Errors raised by the background resolver runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The job queue is at capacity.
    #[error("Resolver queue is full (capacity {capacity})")]
    QueueFull {
        /// Queue capacity.
        capacity: usize,
    },

    /// A worker went away without answering.
    #[error("Resolver worker disconnected")]
    Disconnected,

    /// Waiting for a result timed out.
    #[error("Resolution timed out after {duration_ms}ms")]
    Timeout {
        /// Time waited in milliseconds.
        duration_ms: u64,
    },
}

/// Failures a page plugin may report from `target` or `extract`.
///
/// `Content` errors propagate unchanged; `Contract` errors raised by nested
/// lookups stop resolution; `Other` is wrapped into a generic
/// [`ContentError::Unavailable`] by the page state machine.
#[derive(Debug, Error)]
pub enum PageError {
    /// A content error from the plugin or a nested lookup.
    #[error(transparent)]
    Content(#[from] ContentError),

    /// A contract violation from a nested lookup.
    #[error(transparent)]
    Contract(#[from] ContractError),

    /// Any other plugin failure.
    #[error("{0}")]
    Other(String),
}

impl PageError {
    /// Creates an unexpected plugin failure.
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Top-level error type for sscn.
#[derive(Debug, Error)]
pub enum SscnError {
    /// Bad caller input.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A page or source broke its declarations.
    #[error("Contract violation: {0}")]
    Contract(#[from] ContractError),

    /// Transport failure outside page resolution.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Background runtime failure.
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Filesystem or thread spawn failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected internal state.
    #[error("Internal error: {message}")]
    Internal {
        /// Underlying error message.
        message: String,
    },
}

impl SscnError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a contract violation.
    #[must_use]
    pub const fn is_contract(&self) -> bool {
        matches!(self, Self::Contract(_))
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Contract(_) | Self::Internal { .. } => false,
            Self::Transport(e) => matches!(
                e,
                TransportError::Timeout { .. } | TransportError::Connection { .. }
            ),
            Self::Execution(e) => matches!(
                e,
                ExecutionError::QueueFull { .. } | ExecutionError::Timeout { .. }
            ),
            Self::Io(_) => false,
        }
    }
}

/// Result type alias for sscn operations.
pub type SscnResult<T> = Result<T, SscnError>;
