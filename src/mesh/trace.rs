use std::{
    collections::HashSet,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use uuid::Uuid;

use super::{options::EventMeta, BrokerId};

/// Трассировка одной «летящей» эмиссии.
///
/// Инвариант: брокер, чья идентичность уже есть в `visited`, не
/// диспетчеризует и не пересылает этот экземпляр повторно — это и
/// делает распространение безопасным на циклических графах.
#[derive(Debug)]
pub(crate) struct EventTrace {
    pub event_id: Uuid,
    pub source_id: BrokerId,
    pub visited: HashSet<BrokerId>,
    pub created_at: Instant,
}

/// Таблица трассировок с ограниченным удержанием.
///
/// Эталонное поведение никогда не вычищает трассировки; здесь записи
/// старше `ttl` выметаются при создании новой трассировки —
/// корректность требует лишь, чтобы запись пережила обход одной
/// лавины, а не жизнь брокера.
pub(crate) struct TraceTable {
    inner: DashMap<Uuid, EventTrace>,
    ttl: Duration,
}

impl TraceTable {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: DashMap::new(),
            ttl,
        }
    }

    /// Обработан ли уже экземпляр `event_id` узлом `node`.
    pub fn is_visited(&self, event_id: Uuid, node: &str) -> bool {
        self.inner
            .get(&event_id)
            .map(|trace| trace.visited.contains(node))
            .unwrap_or(false)
    }

    /// Отмечает узел посещённым; создаёт трассировку при первом
    /// появлении идентификатора (перед этим выметая протухшие записи).
    pub fn record(&self, meta: &EventMeta, node: &BrokerId) {
        if let Some(mut trace) = self.inner.get_mut(&meta.event_id) {
            trace.visited.insert(node.clone());
            return;
        }
        self.sweep();
        let mut visited = HashSet::new();
        visited.insert(node.clone());
        self.inner.insert(
            meta.event_id,
            EventTrace {
                event_id: meta.event_id,
                source_id: meta.source_id.clone(),
                visited,
                created_at: Instant::now(),
            },
        );
    }

    /// Идентификатор и источник известной трассировки.
    pub fn origin(&self, event_id: Uuid) -> Option<(Uuid, BrokerId)> {
        self.inner
            .get(&event_id)
            .map(|trace| (trace.event_id, trace.source_id.clone()))
    }

    /// Выметает трассировки старше TTL.
    pub fn sweep(&self) {
        let ttl = self.ttl;
        self.inner
            .retain(|_, trace| trace.created_at.elapsed() < ttl);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }
}
