//! Global error type definitions
//!
//! Apps report failures as [`AppError`] values. The error category and its
//! transportable payload live in [`AppErrorKind`], which is also the wire form
//! used by capture and replay.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::trace::RemoteTrace;

#[doc(hidden)]
pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A list specifying categories of app failures
///
/// The serde representation of a kind is its wire form: the variant name is
/// the `kind` identifier and the variant fields are the `payload`. Used with
/// the [`AppError`] type.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum AppErrorKind {
    #[error("{message}")]
    /// Unspecified failure during app execution
    ///
    /// What this failure contains depends entirely on context
    Generic { message: String },

    #[error("app command could not be formatted")]
    /// The command template for the app could not be formatted
    BadFormatting,

    #[error("app {app_name} failed with exit code {exit_code}")]
    /// The external command run by the app returned a nonzero exit status
    NonZeroExit { app_name: String, exit_code: i32 },

    #[error("app exceeded its allotted walltime")]
    Timeout,

    #[error("app produced no output: {reason}")]
    /// The app was expected to return output text and returned none
    NoOutput { reason: String },

    #[error("missing outputs {outputs:?}: {reason}")]
    /// Outputs declared by the app were not produced by the time it finished
    MissingOutputs { reason: String, outputs: Vec<String> },

    #[error("bad output stream: {reason}")]
    /// The path given for an stdout/stderr stream could not be used
    ///
    /// The underlying I/O failure travels as the error cause, see
    /// [`AppError::bad_std_stream`]
    BadStdStream { reason: String },

    #[error("cause chain truncated")]
    /// Terminal marker for a cause chain that went over the mirroring
    /// depth cap
    CauseChainTruncated,

    #[error("remote failure of unknown kind {kind}: {payload}")]
    /// A remote failure whose kind has no counterpart on this side
    UnknownRemote { kind: String, payload: String },
}

/// The error type for app execution failures
///
/// Carries the failure [kind](`AppErrorKind`), an optional cause and, for
/// failures replayed from a remote worker, the call path captured where the
/// failure originally occurred.
#[derive(Debug)]
pub struct AppError {
    kind: AppErrorKind,
    cause: Option<BoxError>,
    remote_trace: Option<RemoteTrace>,
}

impl AppError {
    /// Create an error of the given kind with `cause` as its source
    pub fn new<E: Into<BoxError>>(kind: AppErrorKind, cause: E) -> Self {
        Self {
            kind,
            cause: Some(cause.into()),
            remote_trace: None,
        }
    }

    /// Get the category of the failure
    pub fn kind(&self) -> &AppErrorKind {
        &self.kind
    }

    /// Get the call path captured on the worker where the failure occurred
    ///
    /// Only present on replayed failures, and only when the worker platform
    /// could capture a trace and the token survived transport.
    pub fn remote_trace(&self) -> Option<&RemoteTrace> {
        self.remote_trace.as_ref()
    }

    /// Unspecified failure during app execution
    pub fn generic(message: impl Into<String>) -> Self {
        AppErrorKind::Generic {
            message: message.into(),
        }
        .into()
    }

    pub fn bad_formatting() -> Self {
        AppErrorKind::BadFormatting.into()
    }

    pub fn non_zero_exit(app_name: impl Into<String>, exit_code: i32) -> Self {
        AppErrorKind::NonZeroExit {
            app_name: app_name.into(),
            exit_code,
        }
        .into()
    }

    pub fn timeout() -> Self {
        AppErrorKind::Timeout.into()
    }

    pub fn no_output(reason: impl Into<String>) -> Self {
        AppErrorKind::NoOutput {
            reason: reason.into(),
        }
        .into()
    }

    pub fn missing_outputs(reason: impl Into<String>, outputs: Vec<String>) -> Self {
        AppErrorKind::MissingOutputs {
            reason: reason.into(),
            outputs,
        }
        .into()
    }

    /// A bad stream path always carries the underlying I/O failure as cause
    pub fn bad_std_stream<E: Into<BoxError>>(reason: impl Into<String>, cause: E) -> Self {
        Self::new(
            AppErrorKind::BadStdStream {
                reason: reason.into(),
            },
            cause,
        )
    }

    pub(crate) fn replayed(
        kind: AppErrorKind,
        cause: Option<BoxError>,
        remote_trace: Option<RemoteTrace>,
    ) -> Self {
        Self {
            kind,
            cause,
            remote_trace,
        }
    }
}

impl From<AppErrorKind> for AppError {
    fn from(kind: AppErrorKind) -> Self {
        Self {
            kind,
            cause: None,
            remote_trace: None,
        }
    }
}

/// Arbitrary failures from app code are flattened into a generic app failure
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::generic(format!("{err:#}"))
    }
}

impl fmt::Display for AppError {
    /// Shows a human-readable description of the `AppError`.
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.kind)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}
