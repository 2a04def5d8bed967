//! # Error Handling
//!
//! Error types for the scan capture library: one [`EnhancerError`] enum whose
//! variants each carry an [`ErrorContext`] with timestamp, operation, recovery
//! suggestion, severity and free-form metadata.
//!
//! ## Taxonomy
//!
//! - `InvalidGeometry`: malformed or degenerate region, bad layout dimensions
//! - `BufferEmpty`: read against an empty buffer or an index past its end
//! - `CaptureUnavailable`: a tick ran while the source was not ready. The
//!   acquisition loop absorbs this as a skip; it is never surfaced per tick.
//! - `StaleOperation`: an open/play request superseded by a newer one. Public
//!   APIs resolve this as a no-op instead of returning it.
//!
//! Synchronous failures (`InvalidGeometry`, `BufferEmpty`) never modify stored
//! state: the previous region or buffer contents are retained.
//!
//! ## Classification
//!
//! - `Retryable`: errors worth another attempt, with a suggested delay
//! - `HasSeverity` / `HasRecoverySuggestion`: metadata accessors
//! - [`classify`]: fatal/silent helpers used by the loop and the observer
//!
//! ## Usage
//!
//! ```rust
//! use scan_capture::error::{EnhancerError, HasRecoverySuggestion};
//!
//! let error = EnhancerError::buffer_empty(Some(4), 2)
//!     .with_operation("get_frame_from_buffer")
//!     .with_recovery_suggestion("Check number_of_frames_in_buffer() before reading");
//!
//! assert_eq!(error.category(), "buffer_empty");
//! assert!(error.recovery_suggestion().is_some());
//! ```

use std::{error::Error as StdError, fmt, time::SystemTime};

use scan_geometry::GeometryError;
use scan_geometry::cpu::ScaleError;

/// Severity levels for errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Expected conditions that only matter when debugging
    Debug,
    /// Informational errors
    Info,
    /// Warnings that may indicate potential issues
    Warning,
    /// Errors that affect operation but can be recovered from
    Error,
    /// Critical errors that require immediate attention
    Critical,
    /// Fatal errors that cannot be recovered from
    Fatal,
}

/// Metadata about when and where an error occurred
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// When the error occurred
    pub timestamp: SystemTime,
    /// The operation being performed when the error occurred
    pub operation: Option<String>,
    /// Additional context about the error
    pub context: Option<String>,
    /// Suggested recovery action
    pub recovery_suggestion: Option<String>,
    /// Error severity level
    pub severity: ErrorSeverity,
    /// Whether this error is retryable
    pub retryable: bool,
    /// Additional metadata as key-value pairs
    pub metadata: std::collections::HashMap<String, String>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            timestamp: SystemTime::now(),
            operation: None,
            context: None,
            recovery_suggestion: None,
            severity: ErrorSeverity::Error,
            retryable: false,
            metadata: std::collections::HashMap::new(),
        }
    }
}

impl ErrorContext {
    /// Create a new error context
    pub fn new() -> Self {
        Self::default()
    }

    /// Context with a non-default severity
    pub fn with_severity(severity: ErrorSeverity) -> Self {
        Self {
            severity,
            ..Self::default()
        }
    }
}

/// Base error type for the scan capture library
#[derive(Debug)]
pub enum EnhancerError {
    /// Malformed/degenerate region or unusable layout dimensions
    InvalidGeometry {
        operation: String,
        source: Option<GeometryError>,
        reason: String,
        context: ErrorContext,
    },
    /// Read against an empty buffer or out-of-range index
    BufferEmpty {
        index: Option<usize>,
        len: usize,
        context: ErrorContext,
    },
    /// Capture source missing or not ready for a tick
    CaptureUnavailable {
        reason: String,
        context: ErrorContext,
    },
    /// Request superseded by a newer play round
    StaleOperation {
        operation: String,
        round: u64,
        current_round: u64,
        context: ErrorContext,
    },
    /// Configuration validation errors
    Config {
        field: String,
        value: String,
        reason: String,
        context: ErrorContext,
    },
    /// Capture source failed to open or to deliver a frame
    Source {
        device: Option<String>,
        reason: String,
        context: ErrorContext,
    },
    /// Invalid state transitions
    State {
        current_state: String,
        attempted_operation: String,
        reason: String,
        context: ErrorContext,
    },
    /// Capability not offered by the current source
    Unsupported {
        capability: String,
        context: ErrorContext,
    },
    /// Instance used after `dispose()`
    Destroyed {
        operation: String,
        context: ErrorContext,
    },
    /// I/O errors
    Io {
        operation: String,
        path: Option<String>,
        source: std::io::Error,
        context: ErrorContext,
    },
    /// External library errors
    External {
        library: String,
        source: Box<dyn StdError + Send + Sync>,
        context: ErrorContext,
    },
}

impl EnhancerError {
    /// Create an invalid geometry error from a geometry validation failure
    pub fn geometry(operation: impl Into<String>, source: GeometryError) -> Self {
        Self::InvalidGeometry {
            operation: operation.into(),
            reason: source.to_string(),
            source: Some(source),
            context: ErrorContext::new(),
        }
    }

    /// Create an invalid geometry error without an underlying cause
    pub fn invalid_geometry(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            operation: operation.into(),
            source: None,
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a buffer-empty error
    pub fn buffer_empty(index: Option<usize>, len: usize) -> Self {
        Self::BufferEmpty {
            index,
            len,
            context: ErrorContext::with_severity(ErrorSeverity::Warning),
        }
    }

    /// Create a capture-unavailable error
    pub fn capture_unavailable(reason: impl Into<String>) -> Self {
        Self::CaptureUnavailable {
            reason: reason.into(),
            context: ErrorContext::with_severity(ErrorSeverity::Debug),
        }
    }

    /// Create a stale-operation error
    pub fn stale(operation: impl Into<String>, round: u64, current_round: u64) -> Self {
        Self::StaleOperation {
            operation: operation.into(),
            round,
            current_round,
            context: ErrorContext::with_severity(ErrorSeverity::Debug),
        }
    }

    /// Create a configuration error
    pub fn config(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Config {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a capture source error
    pub fn source(device: Option<String>, reason: impl Into<String>) -> Self {
        Self::Source {
            device,
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a state error
    pub fn state(
        current_state: impl Into<String>,
        attempted_operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::State {
            current_state: current_state.into(),
            attempted_operation: attempted_operation.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create an unsupported-capability error
    pub fn unsupported(capability: impl Into<String>) -> Self {
        Self::Unsupported {
            capability: capability.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a destroyed-instance error
    pub fn destroyed(operation: impl Into<String>) -> Self {
        Self::Destroyed {
            operation: operation.into(),
            context: ErrorContext::with_severity(ErrorSeverity::Fatal),
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: None,
            source,
            context: ErrorContext::new(),
        }
    }

    /// Create an external library error
    pub fn external(
        library: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            library: library.into(),
            source: Box::new(source),
            context: ErrorContext::new(),
        }
    }

    /// Attach a file path to an I/O error; other variants record it as metadata
    pub fn with_path(mut self, p: impl Into<String>) -> Self {
        let p = p.into();
        match &mut self {
            Self::Io { path, .. } => *path = Some(p),
            _ => {
                self.context_mut().metadata.insert("path".into(), p);
            }
        }
        self
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context_mut().context = Some(context.into());
        self
    }

    /// Add operation context
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context_mut().operation = Some(operation.into());
        self
    }

    /// Add recovery suggestion
    pub fn with_recovery_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context_mut().recovery_suggestion = Some(suggestion.into());
        self
    }

    /// Set severity
    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.context_mut().severity = severity;
        self
    }

    /// Mark as retryable
    pub fn retryable(mut self) -> Self {
        self.context_mut().retryable = true;
        self
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context_mut().metadata.insert(key.into(), value.into());
        self
    }

    /// Get the error context
    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::InvalidGeometry { context, .. } => context,
            Self::BufferEmpty { context, .. } => context,
            Self::CaptureUnavailable { context, .. } => context,
            Self::StaleOperation { context, .. } => context,
            Self::Config { context, .. } => context,
            Self::Source { context, .. } => context,
            Self::State { context, .. } => context,
            Self::Unsupported { context, .. } => context,
            Self::Destroyed { context, .. } => context,
            Self::Io { context, .. } => context,
            Self::External { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::InvalidGeometry { context, .. } => context,
            Self::BufferEmpty { context, .. } => context,
            Self::CaptureUnavailable { context, .. } => context,
            Self::StaleOperation { context, .. } => context,
            Self::Config { context, .. } => context,
            Self::Source { context, .. } => context,
            Self::State { context, .. } => context,
            Self::Unsupported { context, .. } => context,
            Self::Destroyed { context, .. } => context,
            Self::Io { context, .. } => context,
            Self::External { context, .. } => context,
        }
    }

    /// Get the error category as a string
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidGeometry { .. } => "invalid_geometry",
            Self::BufferEmpty { .. } => "buffer_empty",
            Self::CaptureUnavailable { .. } => "capture_unavailable",
            Self::StaleOperation { .. } => "stale_operation",
            Self::Config { .. } => "config",
            Self::Source { .. } => "source",
            Self::State { .. } => "state",
            Self::Unsupported { .. } => "unsupported",
            Self::Destroyed { .. } => "destroyed",
            Self::Io { .. } => "io",
            Self::External { .. } => "external",
        }
    }

    pub fn is_capture_unavailable(&self) -> bool {
        matches!(self, Self::CaptureUnavailable { .. })
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleOperation { .. })
    }
}

impl fmt::Display for EnhancerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnhancerError::InvalidGeometry {
                operation, reason, ..
            } => {
                write!(f, "Invalid geometry in {}: {}", operation, reason)
            }
            EnhancerError::BufferEmpty { index, len, .. } => match index {
                Some(index) => write!(
                    f,
                    "No frame at index {} (buffer holds {} frames)",
                    index, len
                ),
                None => write!(f, "Frame buffer is empty"),
            },
            EnhancerError::CaptureUnavailable { reason, .. } => {
                write!(f, "Capture unavailable: {}", reason)
            }
            EnhancerError::StaleOperation {
                operation,
                round,
                current_round,
                ..
            } => {
                write!(
                    f,
                    "{} from play round {} superseded by round {}",
                    operation, round, current_round
                )
            }
            EnhancerError::Config {
                field,
                value,
                reason,
                ..
            } => {
                write!(
                    f,
                    "Configuration error in '{}': {} (value: {})",
                    field, reason, value
                )
            }
            EnhancerError::Source { device, reason, .. } => match device {
                Some(device) => write!(f, "Capture source '{}' failed: {}", device, reason),
                None => write!(f, "Capture source failed: {}", reason),
            },
            EnhancerError::State {
                current_state,
                attempted_operation,
                reason,
                ..
            } => {
                write!(
                    f,
                    "Cannot {} while {}: {}",
                    attempted_operation, current_state, reason
                )
            }
            EnhancerError::Unsupported { capability, .. } => {
                write!(f, "Capability '{}' is not supported by this source", capability)
            }
            EnhancerError::Destroyed { operation, .. } => {
                write!(f, "Cannot {}: instance has been disposed", operation)
            }
            EnhancerError::Io {
                operation,
                path,
                source,
                ..
            } => {
                if let Some(path) = path {
                    write!(f, "I/O error during {} on '{}': {}", operation, path, source)
                } else {
                    write!(f, "I/O error during {}: {}", operation, source)
                }
            }
            EnhancerError::External {
                library, source, ..
            } => {
                write!(f, "Error in {}: {}", library, source)
            }
        }
    }
}

impl StdError for EnhancerError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::InvalidGeometry {
                source: Some(source),
                ..
            } => Some(source),
            Self::Io { source, .. } => Some(source),
            Self::External { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Result type alias using our custom error type
pub type EnhancerResult<T> = Result<T, EnhancerError>;

/// Trait for errors that can be retried
pub trait Retryable {
    /// Check if this error can be retried
    fn is_retryable(&self) -> bool;

    /// Get the recommended retry delay in milliseconds
    fn retry_delay_ms(&self) -> Option<u64> {
        None
    }
}

impl Retryable for EnhancerError {
    fn is_retryable(&self) -> bool {
        self.context().retryable
            || matches!(
                self,
                Self::CaptureUnavailable { .. } | Self::Source { .. } | Self::Io { .. }
            )
    }

    fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            Self::CaptureUnavailable { .. } => Some(100),
            Self::Source { .. } => Some(1000),
            Self::Io { .. } => Some(100),
            _ => None,
        }
    }
}

/// Trait for errors with severity levels
pub trait HasSeverity {
    /// Get the severity level of this error
    fn severity(&self) -> ErrorSeverity;
}

impl HasSeverity for EnhancerError {
    fn severity(&self) -> ErrorSeverity {
        self.context().severity
    }
}

/// Trait for errors that provide recovery suggestions
pub trait HasRecoverySuggestion {
    /// Get recovery suggestion for this error
    fn recovery_suggestion(&self) -> Option<&str>;
}

impl HasRecoverySuggestion for EnhancerError {
    fn recovery_suggestion(&self) -> Option<&str> {
        self.context().recovery_suggestion.as_deref()
    }
}

/// Error classification utilities
pub mod classify {
    use super::*;

    /// Check if an error is fatal (cannot be recovered from)
    pub fn is_fatal(error: &EnhancerError) -> bool {
        matches!(
            error,
            EnhancerError::Config { .. } | EnhancerError::Destroyed { .. }
        ) || error.severity() == ErrorSeverity::Fatal
    }

    /// Errors the caller should not surface at all
    pub fn is_silent(error: &EnhancerError) -> bool {
        matches!(
            error,
            EnhancerError::CaptureUnavailable { .. } | EnhancerError::StaleOperation { .. }
        )
    }
}

/// Error conversion implementations
impl From<std::io::Error> for EnhancerError {
    fn from(error: std::io::Error) -> Self {
        Self::io("unknown", error)
    }
}

impl From<serde_json::Error> for EnhancerError {
    fn from(error: serde_json::Error) -> Self {
        Self::external("serde_json", error)
    }
}

impl From<image::ImageError> for EnhancerError {
    fn from(error: image::ImageError) -> Self {
        Self::external("image", error)
    }
}

impl From<ScaleError> for EnhancerError {
    fn from(error: ScaleError) -> Self {
        Self::external("fast_image_resize", error)
    }
}

impl From<GeometryError> for EnhancerError {
    fn from(error: GeometryError) -> Self {
        Self::geometry("geometry", error)
    }
}
