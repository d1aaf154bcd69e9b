use uuid::Uuid;

use super::BrokerId;

/// Опции `emit_with`.
///
/// Служебные поля протокола распространения (идентификатор эмиссии,
/// источник) намеренно недоступны прикладному коду: они генерируются
/// заново на каждый `emit`/`broadcast` и передаются без изменений
/// через каждый переход между брокерами.
#[derive(Debug, Clone, Default)]
pub struct EmitOptions {
    /// Передавать ли эмиссию соединённым брокерам.
    pub propagate: bool,
    pub(crate) event_id: Option<Uuid>,
    pub(crate) source_id: Option<BrokerId>,
}

impl EmitOptions {
    /// Опции с включённым распространением.
    pub fn propagating() -> Self {
        Self {
            propagate: true,
            ..Self::default()
        }
    }
}

/// Опции установления соединения.
#[derive(Debug, Clone, Default)]
pub struct ConnectionOptions {
    /// События, которые после соединения автоматически пересылаются
    /// пиру (без дальнейшего распространения).
    pub events: Vec<String>,
}

impl ConnectionOptions {
    pub fn forwarding<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            events: events.into_iter().map(Into::into).collect(),
        }
    }
}

/// Метаданные одной эмиссии — «проводные» поля протокола
/// распространения, единые для всех переходов.
#[derive(Debug, Clone)]
pub(crate) struct EventMeta {
    pub event_id: Uuid,
    pub source_id: BrokerId,
    pub propagate: bool,
}

impl EventMeta {
    /// Прямая доставка: без распространения.
    pub fn direct(event_id: Uuid, source_id: BrokerId) -> Self {
        Self {
            event_id,
            source_id,
            propagate: false,
        }
    }

    /// Лавинная доставка: с распространением по сетке.
    pub fn flood(event_id: Uuid, source_id: BrokerId) -> Self {
        Self {
            event_id,
            source_id,
            propagate: true,
        }
    }
}
