//! Reconstruction and re-signaling of captured failures on the submitting side
//!
//! When the executor resolves a pending result and finds a
//! [`CapturedFailure`], it calls [`AppOutcome::into_result`] instead of
//! delivering the value: the snapshot is rebuilt into an [`AppError`] with
//! the original kind, payload and cause chain, and handed to the caller on
//! the `Err` channel, so awaiting code observes the remote failure as if it
//! had happened locally.

use serde_json::{Map, Value};
use tracing::debug;

use crate::capture::{AppOutcome, CapturedFailure, MAX_CAUSE_DEPTH};
use crate::errors::{AppError, AppErrorKind, BoxError};
use crate::trace::TraceToken;

/// Rebuild the failure described by `captured`
///
/// Replay is total: any well-formed snapshot yields an error to signal. A
/// kind with no local counterpart, or a payload that does not match its kind,
/// falls back to [`UnknownRemote`](`AppErrorKind::UnknownRemote`) so the
/// information is not lost; a trace token that fails to decode is skipped.
/// The cause chain is rebuilt innermost first, preserving the original depth
/// and kind order, and exposed through `Error::source` on the returned value.
pub fn replay(captured: CapturedFailure) -> AppError {
    // the kind is logged before decoding payload and trace, which are the
    // parts of the snapshot that can hold malformed data
    debug!(kind = captured.kind(), "replaying remote failure");

    let mut links = Vec::new();
    let mut next = Some(Box::new(captured));
    while let Some(mut link) = next.take() {
        // accept everything capture can emit, cut off anything deeper
        if links.len() > MAX_CAUSE_DEPTH && link.cause.is_some() {
            links.push(CapturedFailure::truncation_marker());
            break;
        }
        next = link.cause.take();
        links.push(*link);
    }

    let mut replayed: Option<AppError> = None;
    while let Some(link) = links.pop() {
        let cause = replayed.take().map(|err| Box::new(err) as BoxError);
        replayed = Some(reconstruct(link, cause));
    }
    replayed.unwrap_or_else(|| AppError::generic("empty captured failure"))
}

impl<T> AppOutcome<T> {
    /// Resolve the outcome on the submitting side
    ///
    /// A successful result is returned unchanged; a captured failure is
    /// [replayed](`replay`) so the caller observes it as a local error.
    pub fn into_result(self) -> Result<T, AppError> {
        match self {
            AppOutcome::Done(value) => Ok(value),
            AppOutcome::Failed(captured) => Err(replay(captured)),
        }
    }
}

fn reconstruct(link: CapturedFailure, cause: Option<BoxError>) -> AppError {
    let CapturedFailure {
        kind,
        payload,
        trace_token,
        ..
    } = link;
    let remote_trace = trace_token.as_ref().and_then(TraceToken::decode);
    AppError::replayed(resolve(kind, payload), cause, remote_trace)
}

/// Resolve a wire kind and payload to a local taxonomy kind
///
/// Resolution is serde tag dispatch over [`AppErrorKind`]; anything the
/// dispatch rejects becomes `UnknownRemote`.
fn resolve(kind: String, payload: Value) -> AppErrorKind {
    let mut tagged = Map::new();
    tagged.insert("kind".to_owned(), Value::String(kind.clone()));
    if !payload.is_null() {
        tagged.insert("payload".to_owned(), payload.clone());
    }

    match serde_json::from_value(Value::Object(tagged)) {
        Ok(resolved) => resolved,
        Err(_) => AppErrorKind::UnknownRemote {
            kind,
            payload: render_payload(&payload),
        },
    }
}

fn render_payload(payload: &Value) -> String {
    match payload {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::capture::capture;

    fn captured(err: AppError) -> CapturedFailure {
        match capture(|| Err::<(), _>(err)) {
            AppOutcome::Failed(captured) => captured,
            AppOutcome::Done(_) => unreachable!(),
        }
    }

    #[test]
    fn it_rebuilds_the_original_kind_and_payload() {
        let err = replay(captured(AppError::missing_outputs(
            "app finished early",
            vec!["a.txt".to_owned(), "b.txt".to_owned()],
        )));
        assert_eq!(
            *err.kind(),
            AppErrorKind::MissingOutputs {
                reason: "app finished early".to_owned(),
                outputs: vec!["a.txt".to_owned(), "b.txt".to_owned()],
            }
        );
    }

    #[test]
    fn it_resolves_every_taxonomy_kind() {
        let kinds = vec![
            AppErrorKind::Generic {
                message: "oh no".to_owned(),
            },
            AppErrorKind::BadFormatting,
            AppErrorKind::NonZeroExit {
                app_name: "mirror".to_owned(),
                exit_code: 1,
            },
            AppErrorKind::Timeout,
            AppErrorKind::NoOutput {
                reason: "stdout was empty".to_owned(),
            },
            AppErrorKind::MissingOutputs {
                reason: "app finished early".to_owned(),
                outputs: vec!["out.txt".to_owned()],
            },
            AppErrorKind::BadStdStream {
                reason: "bad path".to_owned(),
            },
            AppErrorKind::CauseChainTruncated,
            AppErrorKind::UnknownRemote {
                kind: "Surprise".to_owned(),
                payload: "?".to_owned(),
            },
        ];

        for kind in kinds {
            let err = replay(captured(AppError::from(kind.clone())));
            assert_eq!(*err.kind(), kind);
        }
    }

    #[test]
    fn it_preserves_a_three_deep_chain() {
        let root = AppError::timeout();
        let mid = AppError::new(
            AppErrorKind::Generic {
                message: "job polling failed".to_owned(),
            },
            root,
        );
        let top = AppError::new(
            AppErrorKind::NoOutput {
                reason: "stdout was empty".to_owned(),
            },
            mid,
        );

        let err = replay(captured(top));
        assert!(matches!(err.kind(), AppErrorKind::NoOutput { .. }));

        let mid = err
            .source()
            .and_then(|cause| cause.downcast_ref::<AppError>())
            .expect("expected a first-level cause");
        assert!(matches!(mid.kind(), AppErrorKind::Generic { .. }));

        let root = mid
            .source()
            .and_then(|cause| cause.downcast_ref::<AppError>())
            .expect("expected a second-level cause");
        assert!(matches!(root.kind(), AppErrorKind::Timeout));
        assert!(root.source().is_none());
    }

    #[test]
    fn it_falls_back_to_unknown_remote_for_unresolvable_kinds() {
        let captured: CapturedFailure = serde_json::from_value(json!({
            "kind": "DivideByZero",
            "payload": "division by zero",
        }))
        .unwrap();

        let err = replay(captured);
        assert_eq!(
            *err.kind(),
            AppErrorKind::UnknownRemote {
                kind: "DivideByZero".to_owned(),
                payload: "division by zero".to_owned(),
            }
        );
    }

    #[test]
    fn it_falls_back_when_the_payload_is_malformed() {
        let captured: CapturedFailure = serde_json::from_value(json!({
            "kind": "NonZeroExit",
            "payload": "not the expected fields",
        }))
        .unwrap();

        let err = replay(captured);
        assert_eq!(
            *err.kind(),
            AppErrorKind::UnknownRemote {
                kind: "NonZeroExit".to_owned(),
                payload: "not the expected fields".to_owned(),
            }
        );
    }

    #[test]
    fn it_replays_without_a_trace_token() {
        let captured: CapturedFailure =
            serde_json::from_value(json!({"kind": "Timeout"})).unwrap();

        let err = replay(captured);
        assert!(matches!(err.kind(), AppErrorKind::Timeout));
        assert!(err.remote_trace().is_none());
    }

    #[test]
    fn it_skips_trace_attachment_when_the_token_is_malformed() {
        let mut captured = captured(AppError::timeout());
        captured.trace_token = Some(TraceToken(vec![0xff, 0xfe]));

        let err = replay(captured);
        assert!(matches!(err.kind(), AppErrorKind::Timeout));
        assert!(err.remote_trace().is_none());
    }

    #[test]
    fn it_bounds_reconstruction_of_a_hostile_chain() {
        let mut link = CapturedFailure {
            kind: "Timeout".to_owned(),
            payload: Value::Null,
            trace_token: None,
            cause: None,
        };
        for _ in 0..1000 {
            link = CapturedFailure {
                kind: "Generic".to_owned(),
                payload: json!({"message": "wrap"}),
                trace_token: None,
                cause: Some(Box::new(link)),
            };
        }

        let err = replay(link);
        let mut depth = 1;
        let mut innermost = &err;
        let mut source = err.source();
        while let Some(cause) = source {
            depth += 1;
            innermost = cause
                .downcast_ref::<AppError>()
                .expect("every link should be an AppError");
            source = cause.source();
        }
        assert_eq!(depth, MAX_CAUSE_DEPTH + 2);
        assert!(matches!(
            innermost.kind(),
            AppErrorKind::CauseChainTruncated
        ));
    }
}
