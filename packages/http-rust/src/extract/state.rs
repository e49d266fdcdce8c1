//! Per-invocation request state with lazily parsed, cached aspects.

use std::sync::Arc;

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use fnwrap_core::Context;
use futures_util::stream::{Stream, StreamExt};
use http::header::CONTENT_TYPE;
use http::request::Parts;
use http::{HeaderMap, Method, Uri, Version};
use multer::{Constraints, SizeLimit};
use parking_lot::Mutex;

use super::form::{FilePart, Form, MultipartForm, PostForm, Values};
use crate::config::DispatchConfig;
use crate::error::ResolveError;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Room for boundaries and part headers on top of `multipart_max_memory` when
/// capping the raw multipart stream.
const MULTIPART_ENVELOPE_ALLOWANCE: usize = 64 * 1024;

enum BodyState {
    Pending(Body),
    Buffered(Bytes),
    Failed,
}

/// Request data owned by a single invocation.
///
/// Each aspect is computed at most once: the body is buffered on first access,
/// forms are parsed on first access, and later lookups return the cached value.
/// A `RequestState` is never shared between invocations.
pub struct RequestState {
    head: Arc<Parts>,
    body: BodyState,
    config: DispatchConfig,
    form: Option<Arc<Form>>,
    post_form: Option<Arc<PostForm>>,
    multipart: Option<Arc<MultipartForm>>,
}

impl RequestState {
    /// Create a new state for one invocation. Nothing is read until first access.
    #[must_use]
    pub fn new(head: Parts, body: Body, config: DispatchConfig) -> Self {
        Self {
            head: Arc::new(head),
            body: BodyState::Pending(body),
            config,
            form: None,
            post_form: None,
            multipart: None,
        }
    }

    /// The request head.
    #[must_use]
    pub fn head(&self) -> &Parts {
        &self.head
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    /// Request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.head.uri
    }

    /// Buffers the request body on first call and returns it.
    ///
    /// # Errors
    ///
    /// - `ResolveError::Cancelled` if the context is cancelled while reading
    /// - `ResolveError::Body` if the body stream fails or exceeds the configured limit
    /// - `ResolveError::BodyUnavailable` on every call after a failed read
    pub async fn body(&mut self, ctx: &Context) -> Result<Bytes, ResolveError> {
        // Stays `Failed` unless the read below completes.
        let body = match std::mem::replace(&mut self.body, BodyState::Failed) {
            BodyState::Buffered(bytes) => {
                self.body = BodyState::Buffered(bytes.clone());
                return Ok(bytes);
            }
            BodyState::Failed => return Err(ResolveError::BodyUnavailable),
            BodyState::Pending(body) => body,
        };

        let limit = self.config.max_body_size.unwrap_or(usize::MAX);
        let bytes = tokio::select! {
            biased;
            () = ctx.cancelled() => return Err(ResolveError::Cancelled),
            read = axum::body::to_bytes(body, limit) => read.map_err(ResolveError::Body)?,
        };

        self.body = BodyState::Buffered(bytes.clone());
        Ok(bytes)
    }

    /// Url-encoded body values, parsed once.
    ///
    /// Only `POST`, `PUT` and `PATCH` requests with an
    /// `application/x-www-form-urlencoded` content type have a form body; any
    /// other request yields an empty form.
    ///
    /// # Errors
    ///
    /// Body read failures, or `ResolveError::Form` for a malformed body.
    pub async fn post_form(&mut self, ctx: &Context) -> Result<Arc<PostForm>, ResolveError> {
        if let Some(form) = &self.post_form {
            return Ok(Arc::clone(form));
        }

        let values = if self.has_form_body() {
            Values::parse(&self.body(ctx).await?)?
        } else {
            Values::new()
        };

        let form = Arc::new(PostForm(values));
        self.post_form = Some(Arc::clone(&form));
        Ok(form)
    }

    /// Url-encoded body values followed by query-string values, parsed once.
    ///
    /// # Errors
    ///
    /// Same as [`RequestState::post_form`], or `ResolveError::Form` for a
    /// malformed query string.
    pub async fn form(&mut self, ctx: &Context) -> Result<Arc<Form>, ResolveError> {
        if let Some(form) = &self.form {
            return Ok(Arc::clone(form));
        }

        let mut values = self.post_form(ctx).await?.0.clone();
        if let Some(query) = self.head.uri.query() {
            values.merge(Values::parse(query.as_bytes())?);
        }

        let form = Arc::new(Form(values));
        self.form = Some(Arc::clone(&form));
        Ok(form)
    }

    /// Parsed `multipart/form-data` body, parsed once.
    ///
    /// Fields and files are held in memory. Once their combined size passes
    /// `DispatchConfig::multipart_max_memory` the form is rejected and the rest
    /// of the body is left unread; nothing is spilled to disk. A body that has
    /// not been buffered yet is parsed while it streams in, and the bytes read
    /// are kept so raw-body parameters resolved afterwards still see them.
    ///
    /// # Errors
    ///
    /// - `ResolveError::NotMultipart` when the content type is not multipart
    /// - `ResolveError::Multipart` for a malformed body
    /// - `ResolveError::MultipartTooLarge` when the parts exceed
    ///   `DispatchConfig::multipart_max_memory`
    /// - `ResolveError::Body` if the body stream fails or exceeds the configured limit
    /// - `ResolveError::Cancelled` when the context is cancelled mid-parse
    /// - `ResolveError::BodyUnavailable` after an earlier failed read
    pub async fn multipart_form(
        &mut self,
        ctx: &Context,
    ) -> Result<Arc<MultipartForm>, ResolveError> {
        if let Some(form) = &self.multipart {
            return Ok(Arc::clone(form));
        }

        let content_type = self
            .head
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let boundary = multer::parse_boundary(content_type).map_err(ResolveError::NotMultipart)?;
        let limit = self.config.multipart_max_memory;

        // Stays `Failed` unless the parse below completes.
        let form = match std::mem::replace(&mut self.body, BodyState::Failed) {
            BodyState::Buffered(bytes) => {
                self.body = BodyState::Buffered(bytes.clone());
                let stream = Body::from(bytes).into_data_stream();
                parse_multipart(ctx, stream, boundary, limit).await?
            }
            BodyState::Failed => return Err(ResolveError::BodyUnavailable),
            BodyState::Pending(body) => {
                let copy = Arc::new(Mutex::new(BytesMut::new()));
                let stream = tee_body(body, Arc::clone(&copy), self.config.max_body_size);
                let form = parse_multipart(ctx, stream, boundary, limit).await?;
                self.body = BodyState::Buffered(std::mem::take(&mut *copy.lock()).freeze());
                form
            }
        };

        let form = Arc::new(form);
        self.multipart = Some(Arc::clone(&form));
        Ok(form)
    }

    /// The request head together with its buffered body.
    ///
    /// # Errors
    ///
    /// Body read failures.
    pub async fn raw_request(&mut self, ctx: &Context) -> Result<RawRequest, ResolveError> {
        let body = self.body(ctx).await?;
        Ok(RawRequest {
            head: Arc::clone(&self.head),
            body,
        })
    }

    fn has_form_body(&self) -> bool {
        let method = &self.head.method;
        if !(method == Method::POST || method == Method::PUT || method == Method::PATCH) {
            return false;
        }
        self.head
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|media| media.trim().eq_ignore_ascii_case(FORM_URLENCODED))
    }
}

// ---------------------------------------------------------------------------
// Multipart parsing
// ---------------------------------------------------------------------------

/// Streams `body` while appending every chunk to `copy`, failing once the
/// copy would pass `max_body_size`.
fn tee_body(
    body: Body,
    copy: Arc<Mutex<BytesMut>>,
    max_body_size: Option<usize>,
) -> impl Stream<Item = Result<Bytes, axum::Error>> + Send + 'static {
    let limit = max_body_size.unwrap_or(usize::MAX);
    body.into_data_stream().map(move |chunk| {
        let chunk = chunk?;
        let mut copy = copy.lock();
        if copy.len().saturating_add(chunk.len()) > limit {
            return Err(axum::Error::new("length limit exceeded"));
        }
        copy.extend_from_slice(&chunk);
        Ok(chunk)
    })
}

async fn parse_multipart<S>(
    ctx: &Context,
    stream: S,
    boundary: String,
    limit: usize,
) -> Result<MultipartForm, ResolveError>
where
    S: Stream<Item = Result<Bytes, axum::Error>> + Send + 'static,
{
    let whole_stream = u64::try_from(limit.saturating_add(MULTIPART_ENVELOPE_ALLOWANCE))
        .unwrap_or(u64::MAX);
    let constraints = Constraints::new().size_limit(SizeLimit::new().whole_stream(whole_stream));
    let multipart = multer::Multipart::with_constraints(stream, boundary, constraints);

    tokio::select! {
        biased;
        () = ctx.cancelled() => Err(ResolveError::Cancelled),
        parsed = read_parts(multipart, limit) => parsed,
    }
}

/// Collects fields and files, counting part bytes against `limit` chunk by chunk.
/// The whole-stream constraint stops the read once the raw body can no longer fit.
async fn read_parts(
    mut multipart: multer::Multipart<'static>,
    limit: usize,
) -> Result<MultipartForm, ResolveError> {
    let mut used = 0usize;
    let mut form = MultipartForm::default();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|err| multipart_error(err, limit))?
    {
        let name = field.name().unwrap_or_default().to_owned();
        let file_name = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(ToString::to_string);

        let mut data = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(|err| multipart_error(err, limit))? {
            used = used.saturating_add(chunk.len());
            if used > limit {
                return Err(ResolveError::MultipartTooLarge { limit });
            }
            data.extend_from_slice(&chunk);
        }
        let data = data.freeze();

        match file_name {
            Some(file_name) => form.push_file(
                name,
                FilePart {
                    file_name,
                    content_type,
                    data,
                },
            ),
            None => form.values.append(name, String::from_utf8_lossy(&data)),
        }
    }

    Ok(form)
}

/// Body stream failures surface as `ResolveError::Body` and an overlong stream
/// as `ResolveError::MultipartTooLarge`, not as a malformed form.
fn multipart_error(err: multer::Error, limit: usize) -> ResolveError {
    match err {
        multer::Error::StreamSizeExceeded { .. } => ResolveError::MultipartTooLarge { limit },
        multer::Error::StreamReadFailed(source) => match source.downcast::<axum::Error>() {
            Ok(err) => ResolveError::Body(*err),
            Err(source) => ResolveError::Multipart(multer::Error::StreamReadFailed(source)),
        },
        other => ResolveError::Multipart(other),
    }
}

// ---------------------------------------------------------------------------
// RawRequest
// ---------------------------------------------------------------------------

/// Handle to the whole request: head plus buffered body.
#[derive(Debug, Clone)]
pub struct RawRequest {
    head: Arc<Parts>,
    body: Bytes,
}

impl RawRequest {
    /// Request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.head.method
    }

    /// Request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.head.uri
    }

    /// HTTP version.
    #[must_use]
    pub fn version(&self) -> Version {
        self.head.version
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    /// Request extensions.
    #[must_use]
    pub fn extensions(&self) -> &http::Extensions {
        &self.head.extensions
    }

    /// The buffered body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
