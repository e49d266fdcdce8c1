use std::fmt;

/// Request-derived value a handler parameter can bind to.
///
/// The set is closed: adding an aspect means adding a variant here and a
/// resolver for it on the HTTP side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aspect {
    /// The request body, passed uninterpreted.
    RawBody,
    /// The request header multimap.
    Header,
    /// The request URL.
    Url,
    /// Query values merged with url-encoded body values.
    Form,
    /// Url-encoded body values only.
    PostForm,
    /// Parsed `multipart/form-data` values and files.
    MultipartForm,
    /// The whole request: head plus buffered body.
    RawRequest,
}

impl Aspect {
    /// Stable lowercase name, used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RawBody => "raw_body",
            Self::Header => "header",
            Self::Url => "url",
            Self::Form => "form",
            Self::PostForm => "post_form",
            Self::MultipartForm => "multipart_form",
            Self::RawRequest => "raw_request",
        }
    }
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the value for one parameter position is produced at invocation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionRule {
    /// The per-request [`Context`](crate::Context) after the plugin chain ran.
    FromContext,
    /// One of the fixed request aspects.
    FromRequestAspect(Aspect),
    /// The request body decoded as a structured payload.
    DecodeBody {
        /// Name of the target type, for diagnostics.
        type_name: &'static str,
    },
}

impl ResolutionRule {
    /// Returns `true` for the customized-payload rule.
    #[must_use]
    pub const fn is_decode_body(&self) -> bool {
        matches!(self, Self::DecodeBody { .. })
    }
}

impl fmt::Display for ResolutionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FromContext => f.write_str("context"),
            Self::FromRequestAspect(aspect) => write!(f, "aspect:{aspect}"),
            Self::DecodeBody { type_name } => write!(f, "decode:{type_name}"),
        }
    }
}
