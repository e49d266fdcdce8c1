//! Dispatch configuration.

/// Default in-memory ceiling for a parsed multipart form (2 MiB).
pub const DEFAULT_MULTIPART_MAX_MEMORY: usize = 2 * 1024 * 1024;

/// Limits applied while resolving handler parameters from a request.
///
/// Fixed when the [`Dispatcher`](crate::Dispatcher) is built and shared by
/// every handler derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Maximum number of bytes a multipart form may hold in memory.
    pub multipart_max_memory: usize,
    /// Maximum request body size in bytes. `None` means unbounded.
    pub max_body_size: Option<usize>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            multipart_max_memory: DEFAULT_MULTIPART_MAX_MEMORY,
            max_body_size: None,
        }
    }
}
