use std::{
    collections::HashSet,
    sync::{Arc, Weak},
    time::Duration,
};

use dashmap::DashMap;
use uuid::Uuid;

use crate::{
    config::BrokerOptions,
    engine::{CallResult, CallStrategy, EventEmitter, Listener},
    error::{BrokerError, ListenerError, WatchError},
};

use super::{
    options::EventMeta, trace::TraceTable, BrokerChannel, BrokerId, ConnectionOptions, EmitOptions,
};

/// Источник идентификаторов эмиссий.
///
/// Внедряется при конструировании брокера, чтобы распространение было
/// детерминируемым в тестах; по умолчанию — `Uuid::new_v4`.
pub type IdSource = Arc<dyn Fn() -> Uuid + Send + Sync>;

/// Брокер — узел сетки публикации/подписки.
///
/// Владеет локальным диспетчером, таблицей соединений с пирами,
/// кешем каналов и таблицей трассировок распространения. Брокеры
/// соединяются в произвольный граф (включая циклы); `broadcast`
/// доставляет эмиссию каждому достижимому узлу не более одного раза.
pub struct EventBroker<T: Clone + Send + Sync + 'static> {
    id: BrokerId,
    options: BrokerOptions,
    emitter: EventEmitter<T>,
    /// Пиры по идентичности. Симметрия — по соглашению: соединение
    /// A→B достраивает B→A, если пира там ещё нет.
    connections: DashMap<BrokerId, Arc<EventBroker<T>>>,
    /// Каналы по имени: повторный запрос возвращает тот же экземпляр.
    channels: DashMap<String, Arc<BrokerChannel<T>>>,
    traces: TraceTable,
    ids: IdSource,
}

impl<T: Clone + Send + Sync + 'static> EventBroker<T> {
    pub fn new(options: BrokerOptions) -> Arc<Self> {
        Self::with_id_source(options, Arc::new(Uuid::new_v4))
    }

    pub fn with_id_source(options: BrokerOptions, ids: IdSource) -> Arc<Self> {
        let emitter = EventEmitter::new(
            options.delimiter.clone(),
            options.cache_size,
            options.default_timeout,
            options.max_listeners,
        );
        Arc::new(Self {
            id: Arc::from(options.name.as_str()),
            emitter,
            connections: DashMap::new(),
            channels: DashMap::new(),
            traces: TraceTable::new(options.trace_ttl),
            ids,
            options,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn options(&self) -> &BrokerOptions {
        &self.options
    }

    // ==== Локальная диспетчеризация ====

    /// Регистрирует постоянного слушателя события.
    pub fn on(&self, event: &str, listener: Listener<T>) -> Result<(), BrokerError> {
        self.emitter.on(event, listener)
    }

    /// Регистрирует одноразового слушателя события.
    pub fn once(&self, event: &str, listener: Listener<T>) -> Result<(), BrokerError> {
        self.emitter.once(event, listener)
    }

    /// Снимает конкретного слушателя, либо всех слушателей события.
    pub fn off(&self, event: &str, listener: Option<&Listener<T>>) {
        self.emitter.off(event, listener);
    }

    /// Слушатели события в порядке регистрации.
    pub fn listeners(&self, event: &str) -> Vec<Listener<T>> {
        self.emitter.listeners(event)
    }

    /// Локальная доставка события без распространения.
    pub fn emit(&self, event: &str, payload: T) -> Result<(), BrokerError> {
        self.emit_with(event, payload, EmitOptions::default())
    }

    /// Доставка с опциями: при `propagate` эмиссия уходит соединённым
    /// пирам по протоколу распространения.
    pub fn emit_with(
        &self,
        event: &str,
        payload: T,
        options: EmitOptions,
    ) -> Result<(), BrokerError> {
        let meta = EventMeta {
            event_id: options.event_id.unwrap_or_else(|| (self.ids)()),
            source_id: options.source_id.unwrap_or_else(|| self.id.clone()),
            propagate: options.propagate,
        };
        self.deliver(event, &payload, &meta)
    }

    /// Вызывает слушателей события по стратегии.
    pub fn call(
        &self,
        event: &str,
        payload: T,
        strategy: CallStrategy,
    ) -> Result<CallResult<T>, BrokerError> {
        self.emitter.call(event, &payload, strategy)
    }

    /// Ждёт следующее событие `event` (`None` — таймаут из опций брокера).
    pub async fn watch(&self, event: &str, timeout: Option<Duration>) -> Result<T, WatchError> {
        self.emitter.watch(event, timeout).await
    }

    /// `watch` со значением по умолчанию вместо ошибки таймаута.
    pub async fn watch_or(
        &self,
        event: &str,
        timeout: Option<Duration>,
        default: T,
    ) -> Result<T, WatchError> {
        self.emitter.watch_or(event, timeout, default).await
    }

    // ==== Распространение по сетке ====

    /// Лавинная рассылка: свежий идентификатор эмиссии, источник —
    /// этот брокер, распространение включено.
    pub fn broadcast(&self, event: &str, payload: T) -> Result<(), BrokerError> {
        let meta = EventMeta::flood((self.ids)(), self.id.clone());
        self.deliver(event, &payload, &meta)
    }

    /// Прямая доставка произвольному брокеру: локальные слушатели
    /// этого узла не вызываются, распространения нет.
    pub fn send(&self, event: &str, target: &EventBroker<T>, payload: T) -> Result<(), BrokerError> {
        let meta = EventMeta::direct((self.ids)(), self.id.clone());
        target.deliver(event, &payload, &meta)
    }

    /// Прямая доставка соединённому пиру по идентичности.
    ///
    /// # Возвращает
    /// `false`, если пир неизвестен (доставка не происходит, это не
    /// ошибка).
    pub fn emit_to(&self, peer_id: &str, event: &str, payload: T) -> Result<bool, BrokerError> {
        let Some(peer) = self.connection(peer_id) else {
            return Ok(false);
        };
        let meta = EventMeta::direct((self.ids)(), self.id.clone());
        peer.deliver(event, &payload, &meta)?;
        Ok(true)
    }

    /// `call` на соединённом пире; `None` — пир неизвестен.
    pub fn call_to(
        &self,
        peer_id: &str,
        event: &str,
        payload: T,
        strategy: CallStrategy,
    ) -> Result<Option<CallResult<T>>, BrokerError> {
        match self.connection(peer_id) {
            Some(peer) => Ok(Some(peer.call(event, payload, strategy)?)),
            None => Ok(None),
        }
    }

    /// Лавинная рассылка, начинающаяся с названного пира.
    ///
    /// Инициатор заранее помечает себя посещённым, поэтому лавина
    /// покрывает всю достижимую сетку, кроме него самого.
    pub fn broadcast_to(
        &self,
        peer_id: &str,
        event: &str,
        payload: T,
    ) -> Result<bool, BrokerError> {
        let Some(peer) = self.connection(peer_id) else {
            return Ok(false);
        };
        let meta = EventMeta::flood((self.ids)(), self.id.clone());
        self.traces.record(&meta, &self.id);
        peer.deliver(event, &payload, &meta)?;
        Ok(true)
    }

    /// Ядро протокола распространения.
    ///
    /// 1. Экземпляр уже обработан этим узлом — ничего не делать
    ///    (идемпотентность, разрыв циклов).
    /// 2. Иначе отметить посещёнными этот узел и источник эмиссии,
    ///    затем доставить локально. Источник обработал экземпляр по
    ///    определению, отметка избавляет от пересылки ему обратно.
    /// 3. При `propagate` переслать всем пирам, ещё не посещённым по
    ///    локальной копии трассировки, с теми же метаданными.
    ///
    /// Ошибка пира пробрасывается, либо — при `ignore_errors` —
    /// логируется и не мешает доставке остальным пирам.
    pub(crate) fn deliver(
        &self,
        event: &str,
        payload: &T,
        meta: &EventMeta,
    ) -> Result<(), BrokerError> {
        if self.traces.is_visited(meta.event_id, &self.id) {
            if let Some((event_id, source_id)) = self.traces.origin(meta.event_id) {
                tracing::debug!(
                    broker = %self.id,
                    event,
                    emission = %event_id,
                    source = %source_id,
                    "emission already processed, dropping"
                );
            }
            return Ok(());
        }
        self.traces.record(meta, &self.id);
        self.traces.record(meta, &meta.source_id);
        self.emitter.emit(event, payload)?;

        if !meta.propagate {
            return Ok(());
        }

        // Снимок соединений: никакой захват шарда не удерживается,
        // пока рекурсия уходит в пира.
        let peers: Vec<(BrokerId, Arc<EventBroker<T>>)> = self
            .connections
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (peer_id, peer) in peers {
            if self.traces.is_visited(meta.event_id, &peer_id) {
                continue;
            }
            if let Err(source) = peer.deliver(event, payload, meta) {
                if self.options.ignore_errors {
                    tracing::warn!(
                        broker = %self.id,
                        peer = %peer_id,
                        event,
                        error = %source,
                        "propagation to peer failed, ignoring"
                    );
                    continue;
                }
                return Err(BrokerError::Propagation {
                    peer: peer_id.to_string(),
                    source: Box::new(source),
                });
            }
        }
        Ok(())
    }

    // ==== Управление соединениями ====

    /// Устанавливает двустороннее ребро с пиром.
    ///
    /// Ошибка — пир без идентичности или сам брокер; повторное
    /// соединение — no-op. `options.events` устанавливает локальные
    /// пересылающие слушатели: перечисленные события переизлучаются
    /// пиру без распространения.
    pub fn connect_to(
        self: &Arc<Self>,
        peer: &Arc<EventBroker<T>>,
        options: ConnectionOptions,
    ) -> Result<(), BrokerError> {
        if peer.id.is_empty() {
            return Err(BrokerError::InvalidPeer);
        }
        if peer.id == self.id {
            return Err(BrokerError::SelfConnection(self.id.to_string()));
        }
        if self.connections.contains_key(&peer.id) {
            return Ok(());
        }

        self.connections.insert(peer.id.clone(), peer.clone());
        tracing::debug!(broker = %self.id, peer = %peer.id, "peer connected");

        if !peer.is_connected(&self.id) {
            peer.connect_to(self, ConnectionOptions::default())?;
        }

        for event in &options.events {
            self.install_forwarder(event, peer)?;
        }
        Ok(())
    }

    /// Пересылающий слушатель: переизлучает событие пиру как прямую
    /// доставку. Держит слабую ссылку — пира не удерживает.
    fn install_forwarder(
        self: &Arc<Self>,
        event: &str,
        peer: &Arc<EventBroker<T>>,
    ) -> Result<(), BrokerError> {
        let weak: Weak<EventBroker<T>> = Arc::downgrade(peer);
        let source = self.id.clone();
        let ids = self.ids.clone();
        let forwarded = event.to_string();
        self.on(
            event,
            Arc::new(move |payload: &T| {
                if let Some(peer) = weak.upgrade() {
                    let meta = EventMeta::direct((ids)(), source.clone());
                    peer.deliver(&forwarded, payload, &meta)
                        .map_err(|err| ListenerError::new(err.to_string()))?;
                }
                Ok(None)
            }),
        )
    }

    /// Разрывает ребро с обеих сторон.
    ///
    /// # Возвращает
    /// Было ли ребро.
    pub fn disconnect(&self, peer_id: &str) -> bool {
        match self.connections.remove(peer_id) {
            Some((_, peer)) => {
                if peer.is_connected(&self.id) {
                    peer.disconnect(&self.id);
                }
                tracing::debug!(broker = %self.id, peer = %peer_id, "peer disconnected");
                true
            }
            None => false,
        }
    }

    pub fn is_connected(&self, peer_id: &str) -> bool {
        self.connections.contains_key(peer_id)
    }

    /// Идентичности всех соединённых пиров.
    pub fn connections(&self) -> Vec<BrokerId> {
        self.connections.iter().map(|e| e.key().clone()).collect()
    }

    /// Соединённый пир по идентичности.
    pub fn connection(&self, peer_id: &str) -> Option<Arc<EventBroker<T>>> {
        self.connections.get(peer_id).map(|e| e.value().clone())
    }

    /// Соединяет этот брокер с каждым из `peers` и попарно соединяет
    /// сами `peers` — полный подграф за O(n²) рёбер.
    pub fn create_connections(
        self: &Arc<Self>,
        peers: &[Arc<EventBroker<T>>],
        options: &ConnectionOptions,
    ) -> Result<(), BrokerError> {
        for peer in peers {
            self.connect_to(peer, options.clone())?;
        }
        for (i, left) in peers.iter().enumerate() {
            for right in &peers[i + 1..] {
                left.connect_to(right, options.clone())?;
            }
        }
        Ok(())
    }

    /// Ограниченный поиск брокера в глубину: собственная идентичность,
    /// затем пиры, затем пиры пиров — не глубже `max_depth` переходов.
    pub fn find_broker(
        self: &Arc<Self>,
        peer_id: &str,
        max_depth: usize,
    ) -> Option<Arc<EventBroker<T>>> {
        let mut seen = HashSet::new();
        self.find_inner(peer_id, max_depth, &mut seen)
    }

    fn find_inner(
        self: &Arc<Self>,
        peer_id: &str,
        depth: usize,
        seen: &mut HashSet<BrokerId>,
    ) -> Option<Arc<EventBroker<T>>> {
        if !seen.insert(self.id.clone()) {
            return None;
        }
        if &*self.id == peer_id {
            return Some(self.clone());
        }
        if depth == 0 {
            return None;
        }
        let peers: Vec<Arc<EventBroker<T>>> = self
            .connections
            .iter()
            .map(|e| e.value().clone())
            .collect();
        for peer in peers {
            if let Some(found) = peer.find_inner(peer_id, depth - 1, seen) {
                return Some(found);
            }
        }
        None
    }

    // ==== Каналы ====

    /// Канал с данным именем; создаётся при первом запросе и
    /// кешируется — повторный запрос возвращает тот же экземпляр.
    pub fn channel(self: &Arc<Self>, name: &str) -> Arc<BrokerChannel<T>> {
        self.channels
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(BrokerChannel::new(
                    name,
                    &self.options.delimiter,
                    Arc::downgrade(self),
                ))
            })
            .clone()
    }

    // ==== Жизненный цикл ====

    /// Останавливает брокер: все незавершённые `watch` получают ошибку
    /// остановки, соединения, каналы и трассировки очищаются,
    /// слушатели освобождаются.
    pub fn shutdown(&self) {
        tracing::debug!(
            broker = %self.id,
            traces = self.traces.len(),
            "broker shutting down"
        );
        self.emitter.shutdown();
        self.connections.clear();
        self.channels.clear();
        self.traces.clear();
    }
}
