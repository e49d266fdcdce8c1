//! Demo server mounting a few wrapped handlers on an axum router.

use std::sync::Arc;

use anyhow::Context as _;
use axum::routing::{any_service, post_service};
use axum::Router;
use clap::Parser;
use fnwrap::{
    error_with_status_code, plugin_fn, BoxError, Context, Dispatcher, Form, MultipartForm,
    Payload, StatusCode,
};
use http::{HeaderMap, HeaderName};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "fnwrap-demo", version)]
struct Args {
    /// Bind address.
    #[arg(long, env = "FNWRAP_HOST", default_value = "127.0.0.1")]
    host: String,
    /// Port to listen on. 0 means OS-assigned.
    #[arg(long, env = "FNWRAP_PORT", default_value_t = 8080)]
    port: u16,
    /// In-memory ceiling for multipart forms, in bytes.
    #[arg(long, env = "FNWRAP_MULTIPART_MAX_MEMORY", default_value_t = fnwrap::DEFAULT_MULTIPART_MAX_MEMORY)]
    multipart_max_memory: usize,
}

/// Caller identity attached by the `x-user` plugin.
#[derive(Debug, Clone)]
struct Caller(String);

#[derive(Debug, Deserialize)]
struct Greeting {
    name: String,
}

#[derive(Debug, Serialize)]
struct Reply {
    message: String,
    caller: Option<String>,
}

async fn hello() -> Result<Value, BoxError> {
    Ok(json!({"message": "success"}))
}

async fn greet(ctx: Context, Payload(greeting): Payload<Greeting>) -> Result<Reply, BoxError> {
    if greeting.name.is_empty() {
        return Err(error_with_status_code("name must not be empty", StatusCode::UNPROCESSABLE_ENTITY).into());
    }
    Ok(Reply {
        message: format!("hello, {}", greeting.name),
        caller: ctx.value::<Caller>().map(|c| c.0.clone()),
    })
}

async fn search(form: Form, headers: HeaderMap) -> Result<Value, BoxError> {
    Ok(json!({
        "q": form.get_all("q"),
        "agent": headers.get("user-agent").and_then(|v| v.to_str().ok()),
    }))
}

async fn upload(form: Arc<MultipartForm>) -> Result<Option<Value>, BoxError> {
    Ok(form.file("file").map(|f| {
        json!({"file_name": f.file_name, "size": f.data.len()})
    }))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_router(dispatcher: &Dispatcher) -> anyhow::Result<Router> {
    let users = dispatcher.group().with_plugins([plugin_fn(|ctx, head| {
        match head.headers.get("x-user").and_then(|v| v.to_str().ok()) {
            Some(user) => Ok(ctx.with_value(Caller(user.to_owned()))),
            None => Err(error_with_status_code("missing x-user header", StatusCode::UNAUTHORIZED).into()),
        }
    })]);

    let x_request_id = HeaderName::from_static("x-request-id");
    let layers = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(x_request_id));

    Ok(Router::new()
        .route("/hello", any_service(dispatcher.wrap(hello)?))
        .route("/greet", post_service(users.wrap(greet)?))
        .route("/search", any_service(dispatcher.wrap(search)?))
        .route("/upload", post_service(dispatcher.wrap(upload)?))
        .layer(layers))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    let dispatcher = Dispatcher::builder()
        .multipart_max_memory(args.multipart_max_memory)
        .global_plugins([plugin_fn(|ctx, head| {
            tracing::debug!(method = %head.method, uri = %head.uri, "dispatching");
            Ok(ctx)
        })])
        .response_encoder(|_, payload| json!({"code": 0, "data": payload}))
        .error_encoder(|_, err| json!({"code": -1, "message": err.to_string()}))
        .build();

    let router = build_router(&dispatcher)?;

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "fnwrap demo listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
