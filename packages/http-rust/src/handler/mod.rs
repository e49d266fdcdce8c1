//! Compiled handlers and the `tower::Service` they expose.

pub mod adapter;
pub mod func;
pub mod params;

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::response::Response;
use fnwrap_core::{Context, HandlerSpec};
use http::Request;
use tower::Service;
use tracing::{info_span, Instrument};

pub use adapter::{Adapter, InvocationResult};
pub use func::HandlerFn;
pub use params::Params;

use self::func::BoxFuture;
use crate::dispatcher::Shared;
use crate::extract::RequestState;
use crate::plugin::{PluginChain, PluginRef};
use crate::respond::{failure, success};

/// A wrapped function ready to serve requests.
///
/// Cloning is cheap: the spec, the adapter and the dispatcher state are shared.
/// The local plugin list is owned by each clone.
#[derive(Clone)]
pub struct Handler {
    spec: Arc<HandlerSpec>,
    adapter: Arc<dyn Adapter>,
    plugins: PluginChain,
    shared: Arc<Shared>,
}

impl Handler {
    pub(crate) fn new(spec: Arc<HandlerSpec>, adapter: Arc<dyn Adapter>, shared: Arc<Shared>) -> Self {
        Self {
            spec,
            adapter,
            plugins: PluginChain::new(),
            shared,
        }
    }

    /// Compiled description of the wrapped function.
    #[must_use]
    pub fn spec(&self) -> &HandlerSpec {
        &self.spec
    }

    /// Local plugin steps, run after the dispatcher's global steps.
    #[must_use]
    pub fn plugins(&self) -> &PluginChain {
        &self.plugins
    }

    /// Appends local plugin steps. `None` entries are dropped.
    #[must_use]
    pub fn with_plugins<I>(mut self, steps: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Option<PluginRef>>,
    {
        self.plugins.extend(steps);
        self
    }

    pub(crate) fn with_chain(mut self, plugins: PluginChain) -> Self {
        self.plugins = plugins;
        self
    }

    /// Runs the plugin chain, invokes the function and translates the outcome.
    ///
    /// A [`Context`] found in the request extensions seeds the chain.
    pub async fn serve(&self, request: Request<Body>) -> Response {
        let span = info_span!(
            "dispatch",
            handler = self.spec.target(),
            strategy = self.spec.strategy().as_str(),
            status = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );

        async move {
            let start = Instant::now();
            let (response, outcome) = self.dispatch(request).await;
            let status = response.status().as_u16();

            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = start.elapsed().as_millis() as u64;
            tracing::Span::current().record("status", status);
            tracing::Span::current().record("duration_ms", duration_ms);

            metrics::counter!("fnwrap_requests_total", "outcome" => outcome).increment(1);
            metrics::histogram!("fnwrap_request_duration_seconds")
                .record(start.elapsed().as_secs_f64());

            tracing::info!(status, duration_ms, outcome, "dispatch complete");
            response
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, request: Request<Body>) -> (Response, &'static str) {
        let shared = &self.shared;
        let (mut head, body) = request.into_parts();
        let initial = head.extensions.remove::<Context>().unwrap_or_default();

        let chained = match shared.global.run(initial.clone(), &head).await {
            Ok(ctx) => self.plugins.run(ctx, &head).await,
            Err(err) => Err(err),
        };
        let ctx = match chained {
            Ok(ctx) => ctx,
            Err(err) => {
                return (
                    failure(&shared.encoders, &initial, err.as_ref()),
                    "plugin_error",
                )
            }
        };

        let state = RequestState::new(head, body, shared.config);
        match self.adapter.invoke(ctx.clone(), state).await {
            Ok(payload) => (success(&shared.encoders, &ctx, payload), "ok"),
            Err(err) => (failure(&shared.encoders, &ctx, err.as_ref()), "error"),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("spec", &self.spec)
            .field("plugins", &self.plugins)
            .finish_non_exhaustive()
    }
}

impl Service<Request<Body>> for Handler {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move { Ok(handler.serve(request).await) })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use bytes::Bytes;
    use fnwrap_core::{error_with_status_code, BoxError, StatusCodeError};
    use http::header::CONTENT_TYPE;
    use http::{Method, StatusCode};
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::extract::{Form, MultipartForm, Payload, PostForm};
    use crate::plugin::plugin_fn;
    use crate::respond::JSON_CONTENT_TYPE;
    use crate::Dispatcher;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Foo {
        foo: String,
        bar: i64,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Key(&'static str);

    #[derive(Debug, Clone, Default)]
    struct Keys(Vec<&'static str>);

    fn post(body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap()
    }

    async fn read(response: Response) -> (StatusCode, Bytes) {
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body)
    }

    async fn read_json(response: Response) -> (StatusCode, Value) {
        let (status, body) = read(response).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn push_key(name: &'static str) -> PluginRef {
        plugin_fn(move |ctx, _| {
            let mut keys = ctx.value::<Keys>().cloned().unwrap_or_default();
            keys.0.push(name);
            Ok(ctx.with_value(keys))
        })
    }

    // -- scenario A: zero parameters, custom response encoder --

    #[tokio::test]
    async fn zero_param_handler_with_envelope_encoder() {
        let dispatcher = Dispatcher::builder()
            .response_encoder(|_, payload| {
                let mut envelope = json!({"code": 0});
                if let (Some(out), Value::Object(fields)) = (envelope.as_object_mut(), payload) {
                    out.extend(fields);
                }
                envelope
            })
            .build();
        let handler = dispatcher
            .wrap(|| async { Ok::<_, BoxError>(json!({"message": "success"})) })
            .unwrap();

        let response = handler.oneshot(Request::new(Body::empty())).await.unwrap();
        assert_eq!(response.headers()[CONTENT_TYPE], JSON_CONTENT_TYPE);
        let (status, body) = read_json(response).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"code": 0, "message": "success"}));
    }

    // -- scenario B: single payload --

    #[tokio::test]
    async fn single_payload_is_decoded() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let handler = Dispatcher::default()
            .wrap(move |Payload(foo): Payload<Foo>| {
                *sink.lock().unwrap() = Some(foo.clone());
                async move { Ok::<_, BoxError>(foo) }
            })
            .unwrap();

        let response = handler
            .oneshot(post(r#"{"foo":"hello","bar":10000}"#))
            .await
            .unwrap();
        let (status, body) = read_json(response).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"foo": "hello", "bar": 10000}));
        assert_eq!(
            seen.lock().unwrap().clone(),
            Some(Foo {
                foo: "hello".into(),
                bar: 10000
            })
        );
    }

    #[tokio::test]
    async fn malformed_payload_is_400_without_invocation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler = Dispatcher::default()
            .wrap(move |_: Payload<Foo>| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, BoxError>(()) }
            })
            .unwrap();

        let response = handler.oneshot(post(r#"{"foo":1"#)).await.unwrap();
        let (status, body) = read_json(response).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.as_str().unwrap().contains("failed to decode"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    // -- scenario C: explicit status code --

    #[tokio::test]
    async fn handler_error_status_code_is_used() {
        let handler = Dispatcher::default()
            .wrap(|| async {
                Err::<(), _>(error_with_status_code(
                    std::io::Error::other("not found"),
                    StatusCode::NOT_FOUND,
                ))
            })
            .unwrap();

        let response = handler.oneshot(Request::new(Body::empty())).await.unwrap();
        assert_eq!(response.headers()[CONTENT_TYPE], JSON_CONTENT_TYPE);
        let (status, body) = read_json(response).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!("not found"));
    }

    #[tokio::test]
    async fn handler_error_without_code_is_400() {
        let handler = Dispatcher::default()
            .wrap(|| async { Err::<(), BoxError>("boom".into()) })
            .unwrap();

        let (status, body) = read_json(handler.oneshot(Request::new(Body::empty())).await.unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!("boom"));
    }

    // -- scenario D: global then local plugins, context threading --

    #[tokio::test]
    async fn plugins_run_global_then_local_and_thread_context() {
        let dispatcher = Dispatcher::builder()
            .global_plugins([push_key("g1"), push_key("g2")])
            .build();

        let local = plugin_fn(|ctx, _| {
            let keys = ctx.value::<Keys>().cloned().unwrap_or_default();
            if keys.0 != ["g1", "g2"] {
                return Err(error_with_status_code("globals missing", StatusCode::INTERNAL_SERVER_ERROR).into());
            }
            let mut keys = keys;
            keys.0.push("l1");
            Ok(ctx.with_value(keys))
        });

        let handler = dispatcher
            .wrap(|ctx: Context| async move {
                let keys = ctx.value::<Keys>().cloned().unwrap_or_default();
                Ok::<_, BoxError>(keys.0)
            })
            .unwrap()
            .with_plugins([local]);

        let (status, body) = read_json(handler.oneshot(Request::new(Body::empty())).await.unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["g1", "g2", "l1"]));
    }

    #[tokio::test]
    async fn context_from_extensions_seeds_the_chain() {
        let handler = Dispatcher::default()
            .wrap(|ctx: Context| async move { Ok::<_, BoxError>(ctx.value::<Key>().map(|k| k.0)) })
            .unwrap();

        let mut request = Request::new(Body::empty());
        request
            .extensions_mut()
            .insert(Context::new().with_value(Key("seeded")));

        let (status, body) = read_json(handler.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!("seeded"));
    }

    // -- plugin aborts --

    #[tokio::test]
    async fn plugin_error_with_code_prevents_invocation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler = Dispatcher::default()
            .wrap(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, BoxError>("reached") }
            })
            .unwrap()
            .with_plugins([plugin_fn(|_, _| {
                Err(error_with_status_code("forbidden", StatusCode::FORBIDDEN).into())
            })]);

        let (status, body) = read_json(handler.oneshot(Request::new(Body::empty())).await.unwrap()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, json!("forbidden"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn plugin_error_without_code_is_400() {
        let handler = Dispatcher::default()
            .wrap(|| async { Ok::<_, BoxError>("reached") })
            .unwrap()
            .with_plugins([plugin_fn(|_, _| Err("denied".into()))]);

        let (status, _) = read(handler.oneshot(Request::new(Body::empty())).await.unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn plugin_error_encoder_sees_initial_context() {
        let dispatcher = Dispatcher::builder()
            .global_plugins([push_key("g1")])
            .error_encoder(|ctx, err| {
                json!({
                    "error": err.to_string(),
                    "keys": ctx.value::<Keys>().map(|k| k.0.len()).unwrap_or(0),
                })
            })
            .build();
        let handler = dispatcher
            .wrap(|| async { Ok::<_, BoxError>(()) })
            .unwrap()
            .with_plugins([plugin_fn(|_, _| Err("stop".into()))]);

        let (_, body) = read_json(handler.oneshot(Request::new(Body::empty())).await.unwrap()).await;
        assert_eq!(body, json!({"error": "stop", "keys": 0}));
    }

    #[tokio::test]
    async fn none_plugins_are_ignored() {
        let handler = Dispatcher::default()
            .wrap(|ctx: Context| async move { Ok::<_, BoxError>(ctx.value::<Keys>().map(|k| k.0.clone())) })
            .unwrap()
            .with_plugins([None, Some(push_key("only")), None]);
        assert_eq!(handler.plugins().len(), 1);

        let (status, body) = read_json(handler.oneshot(Request::new(Body::empty())).await.unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["only"]));
    }

    // -- payload translation --

    #[tokio::test]
    async fn absent_payload_is_204() {
        let handler = Dispatcher::default()
            .wrap(|| async { Ok::<Option<Foo>, BoxError>(None) })
            .unwrap();

        let response = handler.oneshot(Request::new(Body::empty())).await.unwrap();
        assert_eq!(response.headers()[CONTENT_TYPE], JSON_CONTENT_TYPE);
        let (status, body) = read(response).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn custom_error_encoder_shapes_body() {
        let dispatcher = Dispatcher::builder()
            .error_encoder(|_, err| json!({"code": -1, "message": err.to_string()}))
            .build();
        let handler = dispatcher
            .wrap(|| async {
                Err::<(), _>(StatusCodeError::new("conflict", StatusCode::CONFLICT))
            })
            .unwrap();

        let (status, body) = read_json(handler.oneshot(Request::new(Body::empty())).await.unwrap()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, json!({"code": -1, "message": "conflict"}));
    }

    // -- aspects end to end --

    #[tokio::test]
    async fn form_aspects_are_idempotent_within_a_request() {
        let handler = Dispatcher::default()
            .wrap(
                |a: Arc<Form>, b: Arc<Form>, post: Arc<PostForm>, owned: Form| async move {
                    Ok::<_, BoxError>(json!({
                        "shared": Arc::ptr_eq(&a, &b),
                        "equal": *a == owned,
                        "user": a.get_all("user"),
                        "post_user": post.get_all("user"),
                    }))
                },
            )
            .unwrap();

        let request = Request::builder()
            .method(Method::POST)
            .uri("/?user=query")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("user=body"))
            .unwrap();

        let (status, body) = read_json(handler.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "shared": true,
                "equal": true,
                "user": ["body", "query"],
                "post_user": ["body"],
            })
        );
    }

    #[tokio::test]
    async fn multipart_form_is_parsed_once_per_request() {
        let handler = Dispatcher::default()
            .wrap(|a: Arc<MultipartForm>, b: Arc<MultipartForm>| async move {
                let file = a.file("doc").map(|f| f.data.len());
                Ok::<_, BoxError>(json!({
                    "shared": Arc::ptr_eq(&a, &b),
                    "name": a.values().get("name"),
                    "file_len": file,
                }))
            })
            .unwrap();

        let body = "--XYZ\r\n\
                    Content-Disposition: form-data; name=\"name\"\r\n\r\n\
                    ann\r\n\
                    --XYZ\r\n\
                    Content-Disposition: form-data; name=\"doc\"; filename=\"d.bin\"\r\n\
                    Content-Type: application/octet-stream\r\n\r\n\
                    12345\r\n\
                    --XYZ--\r\n";
        let request = Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(CONTENT_TYPE, "multipart/form-data; boundary=XYZ")
            .body(Body::from(body))
            .unwrap();

        let (status, body) = read_json(handler.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"shared": true, "name": "ann", "file_len": 5}));
    }

    #[tokio::test]
    async fn raw_body_follows_a_multipart_form() {
        let handler = Dispatcher::default()
            .wrap(|form: Arc<MultipartForm>, raw: Bytes| async move {
                Ok::<_, BoxError>(json!({
                    "name": form.values().get("name"),
                    "raw_len": raw.len(),
                }))
            })
            .unwrap();

        let body = "--XYZ\r\n\
                    Content-Disposition: form-data; name=\"name\"\r\n\r\n\
                    ann\r\n\
                    --XYZ--\r\n";
        let request = Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(CONTENT_TYPE, "multipart/form-data; boundary=XYZ")
            .body(Body::from(body))
            .unwrap();

        let (status, value) = read_json(handler.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value, json!({"name": "ann", "raw_len": body.len()}));
    }

    #[tokio::test]
    async fn multipart_over_memory_limit_is_400() {
        let handler = Dispatcher::builder()
            .multipart_max_memory(2)
            .build()
            .wrap(|_: Arc<MultipartForm>| async { Ok::<_, BoxError>(()) })
            .unwrap();

        let body = "--XYZ\r\n\
                    Content-Disposition: form-data; name=\"name\"\r\n\r\n\
                    too long\r\n\
                    --XYZ--\r\n";
        let request = Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(CONTENT_TYPE, "multipart/form-data; boundary=XYZ")
            .body(Body::from(body))
            .unwrap();

        let (status, body) = read_json(handler.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.as_str().unwrap().contains("in-memory limit"));
    }

    #[tokio::test]
    async fn multipart_limit_above_two_mebibytes_accepts_large_file() {
        let handler = Dispatcher::builder()
            .multipart_max_memory(8 * 1024 * 1024)
            .build()
            .wrap(|form: Arc<MultipartForm>| async move {
                Ok::<_, BoxError>(form.file("file").map(|f| f.data.len()))
            })
            .unwrap();

        let payload = "a".repeat(3 * 1024 * 1024);
        let body = format!(
            "--XYZ\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"big.bin\"\r\n\r\n\
             {payload}\r\n\
             --XYZ--\r\n"
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(CONTENT_TYPE, "multipart/form-data; boundary=XYZ")
            .body(Body::from(body))
            .unwrap();

        let (status, body) = read_json(handler.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(3 * 1024 * 1024));
    }

    #[tokio::test]
    async fn first_failing_parameter_decides_the_error() {
        let handler = Dispatcher::default()
            .wrap(|_: Payload<Foo>, _: Arc<MultipartForm>| async { Ok::<_, BoxError>(()) })
            .unwrap();

        let request = Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(CONTENT_TYPE, "text/plain")
            .body(Body::from("not json"))
            .unwrap();

        let (status, body) = read_json(handler.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let message = body.as_str().unwrap();
        assert!(message.contains("failed to decode"), "{message}");
        assert!(!message.contains("not a multipart"), "{message}");
    }

    #[tokio::test]
    async fn cancelled_context_aborts_body_resolution() {
        let handler = Dispatcher::default()
            .wrap(|body: Bytes| async move { Ok::<_, BoxError>(body.len()) })
            .unwrap();

        let ctx = Context::new();
        ctx.cancellation_token().cancel();
        let mut request = post("{}");
        request.extensions_mut().insert(ctx);

        let (status, body) = read_json(handler.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!("request cancelled"));
    }

    #[tokio::test]
    async fn handler_serves_concurrent_requests() {
        let handler = Dispatcher::default()
            .wrap(|Payload(foo): Payload<Foo>, raw: Bytes| async move {
                tokio::task::yield_now().await;
                Ok::<_, BoxError>(json!({"bar": foo.bar, "len": raw.len()}))
            })
            .unwrap();

        let first = r#"{"foo":"a","bar":1}"#;
        let second = r#"{"foo":"bbbbbbbb","bar":2}"#;
        let (a, b) = tokio::join!(
            handler.clone().oneshot(post(first)),
            handler.clone().oneshot(post(second)),
        );

        let (_, a) = read_json(a.unwrap()).await;
        let (_, b) = read_json(b.unwrap()).await;
        assert_eq!(a, json!({"bar": 1, "len": first.len()}));
        assert_eq!(b, json!({"bar": 2, "len": second.len()}));
    }
}
