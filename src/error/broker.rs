use thiserror::Error;

/// Ошибка, возвращённая слушателем события.
///
/// Слушатели — обычные замыкания; единственное, что они могут сообщить
/// наружу о своей неудаче — строку с причиной.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Ошибки брокера: регистрация, соединения, доставка.
#[derive(Debug, Error)]
pub enum BrokerError {
    // ==== Регистрация ====
    #[error("maximum listeners ({max}) exceeded for event '{event}'")]
    MaxListeners { event: String, max: usize },

    // ==== Соединения ====
    #[error("invalid peer: missing broker identity")]
    InvalidPeer,

    #[error("cannot connect broker '{0}' to itself")]
    SelfConnection(String),

    // ==== Жизненный цикл ====
    #[error("broker was shut down or dropped")]
    Closed,

    // ==== Доставка ====
    #[error("listener failed: {0}")]
    Listener(#[from] ListenerError),

    #[error("propagation to peer '{peer}' failed: {source}")]
    Propagation {
        peer: String,
        #[source]
        source: Box<BrokerError>,
    },
}
