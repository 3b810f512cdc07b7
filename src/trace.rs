//! Best-effort capture of the call path active when a failure occurred
//!
//! Traces travel as opaque [`TraceToken`] bytes inside a captured failure and
//! are decoded back into a [`RemoteTrace`] on the submitting side. Every step
//! is optional: a platform that cannot capture a trace, or a token that does
//! not decode, never blocks delivery of the failure itself.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque transportable encoding of a call path captured on the worker
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceToken(pub(crate) Vec<u8>);

impl TraceToken {
    /// Capture the current call path, if the platform allows it
    ///
    /// Returns `None` when backtrace capture is disabled (see the
    /// `RUST_BACKTRACE` environment variable) or unsupported.
    pub(crate) fn capture() -> Option<Self> {
        let trace = Backtrace::capture();
        match trace.status() {
            BacktraceStatus::Captured => Some(Self(trace.to_string().into_bytes())),
            _ => None,
        }
    }

    /// Decode the token back into a readable trace
    ///
    /// Returns `None` if the token bytes do not hold a valid encoding.
    pub fn decode(&self) -> Option<RemoteTrace> {
        std::str::from_utf8(&self.0)
            .ok()
            .map(|trace| RemoteTrace(trace.to_owned()))
    }
}

impl fmt::Debug for TraceToken {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "TraceToken({} bytes)", self.0.len())
    }
}

/// A call path from the worker that produced a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrace(pub(crate) String);

impl RemoteTrace {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteTrace {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}
