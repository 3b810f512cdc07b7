//! Interception of app failures on the worker side
//!
//! A live error value cannot cross a process boundary, so the worker wraps
//! every app invocation with [`capture`] (or [`capture_async`]). A failure
//! raised by the app is converted at the point of occurrence into a
//! [`CapturedFailure`], a plain-data snapshot of its kind, payload, cause
//! chain and call path. The snapshot is handed upward as the invocation
//! result inside an [`AppOutcome`], letting the executor store and transmit
//! it like any other result value.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::errors::{AppError, AppErrorKind};
use crate::trace::TraceToken;

/// Maximum number of cause links mirrored into a [`CapturedFailure`]
///
/// A chain deeper than this is cut off with a terminal
/// [`CauseChainTruncated`](`AppErrorKind::CauseChainTruncated`) link.
pub const MAX_CAUSE_DEPTH: usize = 100;

/// Transportable snapshot of a failure raised during app execution
///
/// Created exactly once, when the failure is intercepted on the worker, and
/// consumed exactly once by [replay](`crate::replay::replay`) on the
/// submitting side. The snapshot owns all of its data and holds no references
/// into worker state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedFailure {
    pub(crate) kind: String,
    #[serde(default)]
    pub(crate) payload: Value,
    #[serde(default)]
    pub(crate) trace_token: Option<TraceToken>,
    #[serde(default)]
    pub(crate) cause: Option<Box<CapturedFailure>>,
}

impl CapturedFailure {
    /// Identifier of the original failure's category
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The failure's message or data in transportable form
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Opaque encoding of the call path where the failure occurred, if the
    /// platform could capture one
    pub fn trace_token(&self) -> Option<&TraceToken> {
        self.trace_token.as_ref()
    }

    /// The mirrored cause of the failure
    pub fn cause(&self) -> Option<&CapturedFailure> {
        self.cause.as_deref()
    }

    /// Build a snapshot of `err` and as much of its cause chain as the depth
    /// cap allows
    ///
    /// This never fails: a failure that cannot even be rendered (for example
    /// one whose `Display` implementation panics) degrades to a generic
    /// snapshot instead of escaping.
    pub fn from_failure<E>(err: &E) -> Self
    where
        E: std::error::Error + 'static,
    {
        panic::catch_unwind(AssertUnwindSafe(|| {
            let err: &(dyn std::error::Error + 'static) = err;
            let top = match err.downcast_ref::<AppError>() {
                Some(app) => encode_kind(app.kind()),
                // foreign failures keep their type name as kind; replay
                // resolves it to UnknownRemote
                None => (
                    short_type_name::<E>().to_owned(),
                    Value::String(err.to_string()),
                ),
            };
            Self::assemble(top, err)
        }))
        .unwrap_or_else(|_| Self::unrenderable())
    }

    fn assemble(top: (String, Value), err: &(dyn std::error::Error + 'static)) -> Self {
        let mut links = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            if links.len() >= MAX_CAUSE_DEPTH {
                warn!(depth = MAX_CAUSE_DEPTH, "cause chain exceeds depth cap, truncating");
                break;
            }
            links.push(encode_link(cause));
            source = cause.source();
        }

        // assemble the chain innermost first
        let mut cause = source.is_some().then(|| Box::new(Self::truncation_marker()));
        for (kind, payload) in links.into_iter().rev() {
            cause = Some(Box::new(CapturedFailure {
                kind,
                payload,
                trace_token: None,
                cause,
            }));
        }

        let (kind, payload) = top;
        CapturedFailure {
            kind,
            payload,
            trace_token: TraceToken::capture(),
            cause,
        }
    }

    fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|msg| (*msg).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned());
        let message = match message {
            Some(msg) => format!("app panicked: {msg}"),
            None => "app panicked".to_owned(),
        };

        let (kind, payload) = encode_kind(&AppErrorKind::Generic { message });
        CapturedFailure {
            kind,
            payload,
            trace_token: TraceToken::capture(),
            cause: None,
        }
    }

    pub(crate) fn truncation_marker() -> Self {
        let (kind, payload) = encode_kind(&AppErrorKind::CauseChainTruncated);
        CapturedFailure {
            kind,
            payload,
            trace_token: None,
            cause: None,
        }
    }

    fn unrenderable() -> Self {
        let (kind, payload) = encode_kind(&AppErrorKind::Generic {
            message: "app failure could not be rendered".to_owned(),
        });
        CapturedFailure {
            kind,
            payload,
            trace_token: None,
            cause: None,
        }
    }
}

/// Outcome of a captured app invocation
///
/// Both variants are plain data: the executor stores and transmits a failed
/// outcome exactly like a successful one. On the submitting side,
/// [`into_result`](`AppOutcome::into_result`) turns the outcome back into a
/// regular `Result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppOutcome<T> {
    Done(T),
    Failed(CapturedFailure),
}

/// Invoke an app, intercepting any failure it raises
///
/// If the app completes, its result is passed through unchanged. If it fails
/// with an error or a panic, the failure is converted into a
/// [`CapturedFailure`] and returned as data. No failure escapes this
/// function.
pub fn capture<T, E, F>(app: F) -> AppOutcome<T>
where
    F: FnOnce() -> Result<T, E>,
    E: std::error::Error + 'static,
{
    match panic::catch_unwind(AssertUnwindSafe(app)) {
        Ok(Ok(value)) => AppOutcome::Done(value),
        Ok(Err(failure)) => AppOutcome::Failed(CapturedFailure::from_failure(&failure)),
        Err(panic) => AppOutcome::Failed(CapturedFailure::from_panic(panic.as_ref())),
    }
}

/// Invoke an app future, intercepting any failure it raises
///
/// Same contract as [`capture`] for apps that suspend.
///
/// ```rust
/// use faultline::{capture_async, AppError, AppOutcome};
///
/// # tokio_test::block_on(async {
/// let outcome = capture_async(async { Ok::<_, AppError>(42) }).await;
/// assert_eq!(outcome, AppOutcome::Done(42));
/// # })
/// ```
pub async fn capture_async<T, E, Fut>(app: Fut) -> AppOutcome<T>
where
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + 'static,
{
    match AssertUnwindSafe(app).catch_unwind().await {
        Ok(Ok(value)) => AppOutcome::Done(value),
        Ok(Err(failure)) => AppOutcome::Failed(CapturedFailure::from_failure(&failure)),
        Err(panic) => AppOutcome::Failed(CapturedFailure::from_panic(panic.as_ref())),
    }
}

/// Split a taxonomy kind into its wire identifier and payload
fn encode_kind(kind: &AppErrorKind) -> (String, Value) {
    match serde_json::to_value(kind) {
        Ok(Value::Object(mut tagged)) => {
            let name = tagged
                .remove("kind")
                .and_then(|name| name.as_str().map(str::to_owned))
                .unwrap_or_default();
            let payload = tagged.remove("payload").unwrap_or(Value::Null);
            (name, payload)
        }
        _ => (String::new(), Value::String(kind.to_string())),
    }
}

/// Encode a cause link reached through `Error::source`
///
/// Links outside the taxonomy carry no type information through `dyn Error`,
/// so they degrade to a generic kind with the message preserved.
fn encode_link(err: &(dyn std::error::Error + 'static)) -> (String, Value) {
    match err.downcast_ref::<AppError>() {
        Some(app) => encode_kind(app.kind()),
        None => encode_kind(&AppErrorKind::Generic {
            message: err.to_string(),
        }),
    }
}

fn short_type_name<E>() -> &'static str {
    let name = std::any::type_name::<E>();
    name.rsplit("::").next().unwrap_or(name)
}
