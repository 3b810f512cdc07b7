#![cfg_attr(docsrs, feature(doc_cfg))]
//! faultline is the error-propagation layer of a distributed task-execution
//! framework: it carries failures from apps running on remote workers back to
//! the submitting process, so that a remote failure looks to calling code as
//! close as possible to one that happened locally.
//!
//! A live error cannot cross a process boundary. Instead, the worker wraps
//! each app invocation with [`capture()`], which intercepts any failure and
//! converts it into a [`CapturedFailure`]: a plain-data snapshot of the
//! failure's kind, payload, cause chain and (best-effort) call path. The
//! executor moves that snapshot around like any other result value. On the
//! submitting side, [`replay()`] rebuilds the failure with the same kind,
//! message and cause chain and signals it to the caller.
//!
//! # Features
//!
//! - Failures are intercepted exactly once, at the worker, and re-signaled
//!   exactly once, at the submitter.
//! - Cause chains are mirrored link by link, bounded by [`MAX_CAUSE_DEPTH`].
//! - Capture never fails, whatever shape the failure has; replay never fails,
//!   whatever arrived on the wire. Degraded data (an unknown kind, a
//!   malformed trace token) loses precision, never the failure itself.
//! - The worker call path travels as an opaque [`TraceToken`](`trace::TraceToken`)
//!   and is attached to the replayed error when it decodes.
//!
//! # Example
//!
//! ```rust
//! use faultline::{capture, AppError, AppErrorKind, AppOutcome};
//!
//! // worker side: invoke the app, intercepting any failure
//! let outcome = capture(|| -> Result<String, AppError> {
//!     Err(AppError::non_zero_exit("mirror", 127))
//! });
//!
//! // the executor moves the outcome across the process boundary as plain data
//! let wire = serde_json::to_string(&outcome).unwrap();
//! let outcome: AppOutcome<String> = serde_json::from_str(&wire).unwrap();
//!
//! // submitter side: resolving the outcome replays the failure locally
//! let err = outcome.into_result().unwrap_err();
//! assert_eq!(
//!     *err.kind(),
//!     AppErrorKind::NonZeroExit {
//!         app_name: "mirror".into(),
//!         exit_code: 127
//!     }
//! );
//! ```
//!
//! The crate assumes an externally provided serialization capability (any
//! serde format that supports nested records, optional fields and byte
//! sequences); scheduling, retries and transport plumbing belong to the
//! executor, not to this library.

pub mod capture;
pub mod errors;
pub mod replay;
pub mod trace;

pub use capture::{capture, capture_async, AppOutcome, CapturedFailure, MAX_CAUSE_DEPTH};
pub use errors::{AppError, AppErrorKind};
pub use replay::replay;
pub use trace::{RemoteTrace, TraceToken};
