//! Error types and control signals for property runs.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Signal that aborts the current attempt without classifying it as a failure.
///
/// Possibilities and predicates propagate it with `?`; the attempt boundary
/// turns it into a `Rejected` or `Overrun` status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stop {
    /// A precondition did not hold (`reject`, `assume`, `filter`)
    Rejected,
    /// The attempt needed more choices than its cap allows
    Overrun,
    /// The attempt has already concluded; no further draws are possible
    Finished,
}

impl fmt::Display for Stop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stop::Rejected => write!(f, "attempt rejected"),
            Stop::Overrun => write!(f, "attempt exceeded its choice limit"),
            Stop::Finished => write!(f, "attempt already finished"),
        }
    }
}

impl std::error::Error for Stop {}

/// An error raised by a predicate (or a generator), captured at the attempt boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Subtype used to keep shrinking on the same error; a type name or `panic at <file:line>`
    pub kind: String,
    /// Rendered error message
    pub message: String,
    /// Source location, when known
    pub location: Option<String>,
    /// Backtrace lines, truncated to the configured limit
    pub trace: Vec<String>,
}

/// Location and backtrace captured by the panic hook for the attempt in flight
#[derive(Debug, Clone, Default)]
pub(crate) struct PanicCapture {
    pub(crate) file: Option<String>,
    pub(crate) line: Option<u32>,
    pub(crate) column: Option<u32>,
    pub(crate) backtrace: Vec<String>,
}

impl ErrorInfo {
    /// Build an error record from a returned `Err(E)`
    pub fn from_error<E: fmt::Display + ?Sized>(kind: impl Into<String>, error: &E) -> Self {
        Self {
            kind: kind.into(),
            message: error.to_string(),
            location: None,
            trace: backtrace_lines(&Backtrace::capture()),
        }
    }

    /// Build an error record from a caught panic payload
    pub(crate) fn from_panic(
        payload: &(dyn Any + Send),
        capture: Option<PanicCapture>,
        max_trace_lines: usize,
    ) -> Self {
        let message = panic_message(payload);
        let capture = capture.unwrap_or_default();

        let (kind, location) = match (&capture.file, capture.line) {
            (Some(file), Some(line)) => (
                format!("panic at {}:{}", file, line),
                Some(format!("{}:{}:{}", file, line, capture.column.unwrap_or(0))),
            ),
            _ => ("panic".to_string(), None),
        };

        let mut trace = capture.backtrace;
        trace.truncate(max_trace_lines);

        Self {
            kind,
            message,
            location,
            trace,
        }
    }

    /// Whether two errors belong to the same subtype
    pub fn same_kind(&self, other: &ErrorInfo) -> bool {
        self.kind == other.kind
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(location) = &self.location {
            write!(f, " ({})", location)?;
        }
        for line in &self.trace {
            write!(f, "\n    {}", line)?;
        }
        Ok(())
    }
}

/// Lines of a captured backtrace; empty when capturing is disabled
pub(crate) fn backtrace_lines(backtrace: &Backtrace) -> Vec<String> {
    if backtrace.status() == BacktraceStatus::Captured {
        backtrace.to_string().lines().map(str::to_string).collect()
    } else {
        Vec::new()
    }
}

/// Render a panic payload the way the standard hook does
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// Failures of an example store. A run never fails because of one.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem access failed
    #[error("failed to access example store at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored entry could not be decoded or encoded
    #[error("malformed stored example {name}: {source}")]
    Malformed {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// The backend is unusable (e.g. a poisoned lock)
    #[error("example store unavailable: {0}")]
    Unavailable(String),
}

/// Non-fatal problems observed during a run, reported on the outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Looking up the stored example failed
    LookupFailed { key: String, message: String },
    /// Writing the final example failed
    StoreFailed { key: String, message: String },
    /// Removing a stale example failed
    RemoveFailed { key: String, message: String },
    /// The property is marked broken but no failure was found
    BrokenButPassed { key: String },
    /// The minimal example could not be rebuilt from its choices
    NotReproducible { key: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::LookupFailed { key, message } => {
                write!(f, "could not look up stored example for {}: {}", key, message)
            }
            Diagnostic::StoreFailed { key, message } => {
                write!(f, "could not save example for {}: {}", key, message)
            }
            Diagnostic::RemoveFailed { key, message } => {
                write!(f, "could not remove stale example for {}: {}", key, message)
            }
            Diagnostic::BrokenButPassed { key } => {
                write!(f, "{} is marked broken but passed", key)
            }
            Diagnostic::NotReproducible { key } => {
                write!(
                    f,
                    "minimal example for {} did not replay; is the generator pure?",
                    key
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_display() {
        assert_eq!(Stop::Rejected.to_string(), "attempt rejected");
        assert!(Stop::Overrun.to_string().contains("choice limit"));
    }

    #[test]
    fn test_error_info_from_error() {
        let info = ErrorInfo::from_error("std::io::Error", "disk full");
        assert_eq!(info.kind, "std::io::Error");
        assert_eq!(info.message, "disk full");
        assert!(info.location.is_none());
        assert_eq!(info.to_string(), "std::io::Error: disk full");
    }

    #[test]
    fn test_error_info_from_panic_uses_location_as_kind() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        let capture = PanicCapture {
            file: Some("src/lib.rs".to_string()),
            line: Some(12),
            column: Some(5),
            backtrace: (0..40).map(|i| format!("frame {}", i)).collect(),
        };

        let info = ErrorInfo::from_panic(payload.as_ref(), Some(capture), 3);
        assert_eq!(info.kind, "panic at src/lib.rs:12");
        assert_eq!(info.message, "boom");
        assert_eq!(info.location.as_deref(), Some("src/lib.rs:12:5"));
        assert_eq!(info.trace.len(), 3);
    }

    #[test]
    fn test_backtrace_lines_of_forced_capture() {
        let lines = backtrace_lines(&Backtrace::force_capture());
        assert!(!lines.is_empty());
        assert!(backtrace_lines(&Backtrace::disabled()).is_empty());
    }

    #[test]
    fn test_error_info_from_panic_without_capture() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        let info = ErrorInfo::from_panic(payload.as_ref(), None, 16);
        assert_eq!(info.kind, "panic");
        assert_eq!(info.message, "owned message");
        assert!(info.trace.is_empty());
    }

    #[test]
    fn test_same_kind() {
        let a = ErrorInfo::from_error("E1", "one");
        let b = ErrorInfo::from_error("E1", "two");
        let c = ErrorInfo::from_error("E2", "one");
        assert!(a.same_kind(&b));
        assert!(!a.same_kind(&c));
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Unavailable("lock poisoned".to_string());
        assert_eq!(err.to_string(), "example store unavailable: lock poisoned");
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::BrokenButPassed {
            key: "prop::u8".to_string(),
        };
        assert_eq!(diag.to_string(), "prop::u8 is marked broken but passed");
    }
}
