//! Signature classification: turns a handler's parameter rules into a `HandlerSpec`.

use std::fmt;

use crate::types::ResolutionRule;

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// Invocation strategy selected once per handler.
///
/// All strategies produce the same observable result; `Plain` and `Unary`
/// skip per-parameter resolution for the two most common shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// No parameters, or only the context.
    Plain { wants_context: bool },
    /// A single decoded payload.
    Unary,
    /// Anything else: parameters resolved one by one, left to right.
    Generic,
}

impl Strategy {
    /// Lowercase name used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain { .. } => "plain",
            Self::Unary => "unary",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// HandlerSpec
// ---------------------------------------------------------------------------

/// Immutable compiled description of one handler function.
///
/// Holds no per-invocation state, so it can be shared freely between
/// concurrently running requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerSpec {
    target: &'static str,
    rules: Box<[ResolutionRule]>,
    strategy: Strategy,
}

impl HandlerSpec {
    /// Name of the wrapped function's type.
    #[must_use]
    pub const fn target(&self) -> &'static str {
        self.target
    }

    /// Resolution rules in declared parameter order.
    #[must_use]
    pub fn rules(&self) -> &[ResolutionRule] {
        &self.rules
    }

    /// Invocation strategy picked at classification time.
    #[must_use]
    pub const fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Number of declared parameters, context included.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.rules.len()
    }

    /// Whether the first parameter is the request context.
    #[must_use]
    pub fn wants_context(&self) -> bool {
        self.rules.first() == Some(&ResolutionRule::FromContext)
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Registration-time classification failures. A handler that fails
/// classification is never constructed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("`Context` must be the first parameter of `{target}`, found one at position {position}")]
    ContextPlacement {
        target: &'static str,
        position: usize,
    },
    #[error("`{target}` accepts more than one payload type: `{first}` and `{second}`")]
    MultipleCustomTypes {
        target: &'static str,
        first: &'static str,
        second: &'static str,
    },
}

// ---------------------------------------------------------------------------
// classify
// ---------------------------------------------------------------------------

/// Validates `rules` and selects the invocation strategy for `target`.
///
/// # Errors
///
/// - `ConfigError::ContextPlacement` when a context parameter appears anywhere
///   but position 0 (which also rejects a second context parameter)
/// - `ConfigError::MultipleCustomTypes` when more than one parameter decodes
///   the request body
pub fn classify(
    target: &'static str,
    rules: Vec<ResolutionRule>,
) -> Result<HandlerSpec, ConfigError> {
    let mut payload: Option<&'static str> = None;

    for (position, rule) in rules.iter().enumerate() {
        match *rule {
            ResolutionRule::FromContext if position != 0 => {
                return Err(ConfigError::ContextPlacement { target, position });
            }
            ResolutionRule::DecodeBody { type_name } => {
                if let Some(first) = payload {
                    return Err(ConfigError::MultipleCustomTypes {
                        target,
                        first,
                        second: type_name,
                    });
                }
                payload = Some(type_name);
            }
            _ => {}
        }
    }

    let strategy = match rules.as_slice() {
        [] => Strategy::Plain {
            wants_context: false,
        },
        [ResolutionRule::FromContext] => Strategy::Plain {
            wants_context: true,
        },
        [ResolutionRule::DecodeBody { .. }] => Strategy::Unary,
        _ => Strategy::Generic,
    };

    tracing::debug!(
        target_fn = target,
        arity = rules.len(),
        strategy = strategy.as_str(),
        "handler classified"
    );

    Ok(HandlerSpec {
        target,
        rules: rules.into_boxed_slice(),
        strategy,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
