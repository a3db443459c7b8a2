//! The request pipeline's middleware.
//!
//! Ordering is load-bearing and assembled in one place ([`crate::app`]):
//! compression outermost (fault chunks appended to guarded streams must go
//! through the encoder), then the fault boundary around everything else —
//! tracing, the body limit, method override, sessions, authentication, and
//! identity propagation into the request log.

use std::any::Any;
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, header};
use axum::middleware::Next;
use axum::response::Response;
use futures::{FutureExt as _, StreamExt as _};
use http_body::Body as _;

use opsgate_auth::Authenticator;
use opsgate_sessions::{Session, SessionKey, SessionStore};

use crate::context::{PrincipalContext, RequestContext, RequestLog};
use crate::errors::{self, FaultMarker};

/// Session cookie name.
pub const SESSION_COOKIE: &str = "opsgate.sid";

#[derive(Clone)]
pub struct BoundaryState {
    pub node_id: String,
    pub development: bool,
}

/// Outermost middleware: creates the request context, catches everything the
/// rest of the pipeline throws, and emits the completion log exactly once.
///
/// Faults split by whether headers were already sent. A panic or handler
/// error before any response exists becomes a full JSON envelope; a fault in
/// the middle of a streaming body can only append a trailing error chunk,
/// because the status line is long gone.
pub async fn fault_boundary(
    State(state): State<BoundaryState>,
    mut req: Request,
    next: Next,
) -> Response {
    let ctx = RequestContext::new(RequestLog::from_headers(req.headers(), state.node_id.clone()));
    req.extensions_mut().insert(ctx.clone());

    let outcome = AssertUnwindSafe(next.run(req)).catch_unwind().await;

    match outcome {
        Ok(response) => {
            if let Some(FaultMarker(message)) = response.extensions().get::<FaultMarker>() {
                ctx.mark_error(message.clone());
                tracing::error!(error = %message, "request failed");
            }
            finish_response(response, ctx)
        }
        Err(panic) => {
            let message = panic_message(panic);
            ctx.mark_error(format!("Error - {message}"));
            tracing::error!(error = %message, "uncaught fault in request pipeline");
            let response = errors::fault_response(
                &message,
                state.development.then(|| format!("panic: {message}")),
            );
            emit_completion(&ctx);
            response
        }
    }
}

/// Finalize the response and flush the completion event.
///
/// Buffered bodies flush immediately. Streaming bodies defer the flush to
/// the end of the stream, so a mid-stream fault lands in the record before
/// the record is logged; the stream wrapper also turns a body error into a
/// trailing `Error - <cause>` chunk instead of tearing the connection down.
fn finish_response(response: Response, ctx: RequestContext) -> Response {
    if response.body().size_hint().exact().is_some() {
        emit_completion(&ctx);
        return response;
    }

    let (parts, body) = response.into_parts();
    let mut frames = Box::pin(body.into_data_stream());
    let guarded = async_stream::stream! {
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(bytes) => yield Ok::<_, Infallible>(bytes),
                Err(err) => {
                    ctx.mark_error(format!("Error - {err}"));
                    tracing::error!(error = %err, "fault while streaming response body");
                    yield Ok(Bytes::from(format!("Error - {err}")));
                    break;
                }
            }
        }
        emit_completion(&ctx);
    };
    Response::from_parts(parts, Body::from_stream(guarded))
}

fn emit_completion(ctx: &RequestContext) {
    let log = ctx.snapshot();
    tracing::info!(
        scenario_id = log.scenario_id.as_deref(),
        run_id = log.run_id.as_deref(),
        thread_id = log.thread_id.as_deref(),
        user_id = log.user_id.as_deref(),
        bop_id = log.bop_id.as_deref(),
        operation_id = log.operation_id.as_deref(),
        txn_id = log.transaction_id.as_deref(),
        status = log.status.as_str(),
        error = log.error.as_deref(),
        started_at = %log.started_at.to_rfc3339(),
        node_id = %log.node_id,
        elapsed_ms = ctx.elapsed().as_millis() as u64,
        "request completed"
    );
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Clone)]
pub struct SessionState {
    pub store: Arc<SessionStore>,
    pub key: SessionKey,
    pub ttl: Duration,
}

/// Attach a session to the request and persist it after the response.
///
/// A missing, malformed, or forged cookie all degrade to a fresh session.
/// The write-back is lazy: only dirty sessions hit the store, and only fresh
/// dirty sessions set a cookie.
pub async fn session(State(state): State<SessionState>, mut req: Request, next: Next) -> Response {
    let presented = cookie_value(req.headers(), SESSION_COOKIE)
        .and_then(|raw| state.key.verify(&raw));

    let session = match presented {
        Some(id) => match state.store.load(&id).await {
            Ok(Some(data)) => Session::new(id, data, false),
            Ok(None) => Session::fresh(),
            Err(err) => {
                tracing::warn!("session load failed, starting fresh: {err}");
                Session::fresh()
            }
        },
        None => Session::fresh(),
    };

    req.extensions_mut().insert(session.clone());
    let mut response = next.run(req).await;

    if session.is_dirty() {
        if let Err(err) = state
            .store
            .save(&session.id(), &session.snapshot(), state.ttl)
            .await
        {
            tracing::warn!("session save failed: {err}");
        }

        if session.is_fresh() {
            let cookie = format!(
                "{}={}; Path=/; HttpOnly; SameSite=Lax",
                SESSION_COOKIE,
                state.key.sign(&session.id())
            );
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }
    }

    response
}

fn cookie_value(headers: &header::HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').map(str::trim).find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

#[derive(Clone)]
pub struct AuthState {
    pub auth: Arc<Authenticator>,
}

/// Restore the authenticated identity from the session, if any. Requests
/// without one proceed anonymously; guards decide later what that means.
pub async fn authenticate(State(state): State<AuthState>, mut req: Request, next: Next) -> Response {
    if let Some(session) = req.extensions().get::<Session>().cloned() {
        if let Some(principal) = state.auth.restore(&session) {
            req.extensions_mut().insert(PrincipalContext::new(principal));
        }
    }
    next.run(req).await
}

/// Copy the authenticated user into the request log.
pub async fn propagate_identity(req: Request, next: Next) -> Response {
    if let (Some(ctx), Some(principal)) = (
        req.extensions().get::<RequestContext>(),
        req.extensions().get::<PrincipalContext>(),
    ) {
        ctx.set_user(principal.principal().identifier.to_string());
    }
    next.run(req).await
}

/// Honor `X-HTTP-Method-Override` on POST requests, for clients that cannot
/// emit PUT or DELETE themselves.
pub async fn method_override(mut req: Request, next: Next) -> Response {
    if req.method() == Method::POST {
        let overridden = req
            .headers()
            .get("x-http-method-override")
            .and_then(|v| v.to_str().ok())
            .and_then(|raw| raw.parse::<Method>().ok());
        if let Some(method) = overridden {
            *req.method_mut() = method;
        }
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use std::sync::Mutex;

    /// Collects formatted log lines so tests can assert on emitted events.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_writer(logs.clone())
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (logs, guard)
    }

    fn context() -> RequestContext {
        RequestContext::new(RequestLog::from_headers(
            &HeaderMap::new(),
            "CLUSTER_NODE_1".into(),
        ))
    }

    #[tokio::test]
    async fn streaming_faults_reach_the_completion_event() {
        let (logs, _guard) = capture();
        let ctx = context();

        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"partial,")),
            Err(std::io::Error::other("pipe burst")),
        ];
        let response = Response::new(Body::from_stream(futures::stream::iter(chunks)));
        let response = finish_response(response, ctx);

        // Nothing is flushed until the stream has actually been consumed.
        assert!(!logs.contents().contains("request completed"));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(body.starts_with(b"partial,"));

        let captured = logs.contents();
        let completed = captured
            .lines()
            .find(|line| line.contains("request completed"))
            .expect("completion event was emitted");
        assert!(completed.contains(r#""status":"error""#), "event was {completed}");
        assert!(completed.contains("pipe burst"), "event was {completed}");
    }

    #[tokio::test]
    async fn buffered_responses_flush_completion_immediately() {
        let (logs, _guard) = capture();

        let response = Response::new(Body::from("ok"));
        let _response = finish_response(response, context());

        let captured = logs.contents();
        let completed = captured
            .lines()
            .find(|line| line.contains("request completed"))
            .expect("completion event was emitted");
        assert!(completed.contains(r#""status":"success""#), "event was {completed}");
    }

    #[test]
    fn cookie_parsing_picks_the_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; opsgate.sid=abc.def; lang=en"),
        );
        assert_eq!(
            cookie_value(&headers, SESSION_COOKIE).as_deref(),
            Some("abc.def")
        );
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn panic_payloads_downcast_to_text() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("boom".to_string())), "boom");
        assert_eq!(panic_message(Box::new(17u8)), "unknown panic");
    }
}
