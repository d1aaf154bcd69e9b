use thiserror::Error;

/// Ошибка ожидания события (`watch`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    #[error("event '{event}' timed out after {ms}ms")]
    Timeout { event: String, ms: u64 },

    #[error("watcher was shut down")]
    Shutdown,
}

impl WatchError {
    /// Истёк ли дедлайн ожидания.
    pub fn is_timeout(&self) -> bool {
        matches!(self, WatchError::Timeout { .. })
    }
}
