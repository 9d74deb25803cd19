/// Failures of the pure booking engine. Both are caller errors and are never
/// retried or downgraded to "no conflict".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed, empty or inverted interval, or an unparseable date/time.
    InvalidInterval(String),
    /// Operating window that cannot produce slots.
    InvalidWindow(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInterval(msg) => write!(f, "invalid interval: {msg}"),
            EngineError::InvalidWindow(msg) => write!(f, "invalid operating window: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
