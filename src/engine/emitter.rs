use std::time::Duration;

use crate::error::{BrokerError, WatchError};

use super::{
    registry::RegistryEntry, CallResult, CallStrategy, EventWatcher, Listener, ListenerRegistry,
};

/// Диспетчер событий: реестр слушателей + наблюдатель дедлайнов.
///
/// Добавляет поверх реестра:
/// - лимит слушателей на имя события (ошибка регистрации, не тихий дроп);
/// - одноразовые слушатели (`once`);
/// - стратегии свёртки `call`;
/// - ожидание события с дедлайном (`watch` / `watch_or`).
pub struct EventEmitter<T> {
    registry: ListenerRegistry<T>,
    watcher: EventWatcher<T>,
    max_listeners: usize,
}

impl<T: Clone + Send + Sync + 'static> EventEmitter<T> {
    pub fn new(
        delimiter: impl Into<String>,
        cache_size: usize,
        default_timeout: Duration,
        max_listeners: usize,
    ) -> Self {
        Self {
            registry: ListenerRegistry::new(delimiter, cache_size),
            watcher: EventWatcher::new(default_timeout),
            max_listeners,
        }
    }

    /// Регистрирует постоянного слушателя.
    pub fn on(&self, event: &str, listener: Listener<T>) -> Result<(), BrokerError> {
        self.register(event, listener, false)
    }

    /// Регистрирует слушателя, который снимается после первого вызова.
    pub fn once(&self, event: &str, listener: Listener<T>) -> Result<(), BrokerError> {
        self.register(event, listener, true)
    }

    fn register(&self, event: &str, listener: Listener<T>, once: bool) -> Result<(), BrokerError> {
        self.registry
            .register(event, listener, once, self.max_listeners)
    }

    /// Снимает конкретного слушателя, либо всех слушателей события.
    pub fn off(&self, event: &str, listener: Option<&Listener<T>>) {
        self.registry.unregister(event, listener);
    }

    /// Локальная доставка: сначала разрешаются ожидающие `watch`,
    /// затем слушатели вызываются в порядке регистрации.
    ///
    /// Ошибка слушателя не перехватывается — она уходит вызывающему,
    /// оставшиеся слушатели не вызываются (семантика синхронного вызова).
    pub fn emit(&self, event: &str, payload: &T) -> Result<(), BrokerError> {
        self.watcher.on_emit(event, payload);
        for entry in self.registry.entries(event) {
            self.invoke(event, &entry, payload)?;
        }
        Ok(())
    }

    /// Вызывает слушателей события по стратегии `strategy`.
    ///
    /// Отсутствие слушателей — не ошибка: возвращается значение по
    /// умолчанию, соответствующее стратегии.
    pub fn call(
        &self,
        event: &str,
        payload: &T,
        strategy: CallStrategy,
    ) -> Result<CallResult<T>, BrokerError> {
        let entries = self.registry.entries(event);
        if entries.is_empty() {
            return Ok(strategy.empty_result());
        }

        match strategy {
            CallStrategy::First => {
                let value = self.invoke(event, &entries[0], payload)?;
                Ok(CallResult::Value(value))
            }
            CallStrategy::Last => {
                let value = self.invoke(event, &entries[entries.len() - 1], payload)?;
                Ok(CallResult::Value(value))
            }
            CallStrategy::All => {
                let mut values = Vec::with_capacity(entries.len());
                for entry in &entries {
                    values.push(self.invoke(event, entry, payload)?);
                }
                Ok(CallResult::Values(values))
            }
            CallStrategy::Race => {
                // Все слушатели выполняются; синхронные результаты
                // завершаются немедленно, так что гонку выигрывает
                // первый по порядку регистрации.
                let mut winner = None;
                for entry in &entries {
                    let value = self.invoke(event, entry, payload)?;
                    if winner.is_none() {
                        winner = Some(value);
                    }
                }
                Ok(CallResult::Value(winner.unwrap_or(None)))
            }
            CallStrategy::Some => {
                let mut any = false;
                for entry in &entries {
                    any |= self.invoke(event, entry, payload)?.is_some();
                }
                Ok(CallResult::Flag(any))
            }
            CallStrategy::Every => {
                let mut all = true;
                for entry in &entries {
                    all &= self.invoke(event, entry, payload)?.is_some();
                }
                Ok(CallResult::Flag(all))
            }
        }
    }

    /// Одноразовые записи снимаются до вызова слушателя, чтобы
    /// реентерабельная доставка не вызвала их повторно.
    fn invoke(
        &self,
        event: &str,
        entry: &RegistryEntry<T>,
        payload: &T,
    ) -> Result<Option<T>, BrokerError> {
        if entry.once {
            self.registry.unregister(event, Some(&entry.listener));
        }
        Ok((entry.listener)(payload)?)
    }

    /// Ждёт следующее событие `event` с дедлайном
    /// (`None` — таймаут по умолчанию).
    pub async fn watch(&self, event: &str, timeout: Option<Duration>) -> Result<T, WatchError> {
        self.watcher.watch(event, timeout).await
    }

    /// Форма `watch` со значением по умолчанию: таймаут возвращает
    /// `default`, остановка наблюдателя — по-прежнему ошибку.
    pub async fn watch_or(
        &self,
        event: &str,
        timeout: Option<Duration>,
        default: T,
    ) -> Result<T, WatchError> {
        match self.watcher.watch(event, timeout).await {
            Err(WatchError::Timeout { .. }) => Ok(default),
            other => other,
        }
    }

    /// Слушатели события в порядке регистрации.
    pub fn listeners(&self, event: &str) -> Vec<Listener<T>> {
        self.registry.lookup(event)
    }

    /// Число слушателей события.
    pub fn listener_count(&self, event: &str) -> usize {
        self.registry.count(event)
    }

    /// Останавливает диспетчер: ожидания завершаются ошибкой
    /// `Shutdown`, реестр очищается.
    pub fn shutdown(&self) {
        self.watcher.shutdown();
        self.registry.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;
    use crate::{engine::listener, error::ListenerError};

    fn emitter<T: Clone + Send + Sync + 'static>() -> EventEmitter<T> {
        EventEmitter::new(":", 6, Duration::from_millis(1000), 5)
    }

    /// Тест проверяет вызов слушателя при `emit`.
    #[test]
    fn test_on_then_emit() {
        let emitter: EventEmitter<String> = emitter();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        emitter
            .on(
                "test",
                listener(move |_: &String| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }),
            )
            .unwrap();

        emitter.emit("test", &"hello".to_string()).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    /// Тест проверяет, что `off` убирает слушателя.
    #[test]
    fn test_off_removes_listener() {
        let emitter: EventEmitter<String> = emitter();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let l = listener(move |_: &String| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        });
        emitter.on("test", l.clone()).unwrap();
        emitter.off("test", Some(&l));

        emitter.emit("test", &"world".to_string()).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    /// Тест проверяет одноразовость `once`.
    #[test]
    fn test_once_fires_single_time() {
        let emitter: EventEmitter<String> = emitter();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        emitter
            .once(
                "test",
                listener(move |_: &String| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }),
            )
            .unwrap();

        emitter.emit("test", &"first".to_string()).unwrap();
        emitter.emit("test", &"second".to_string()).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    /// Тест проверяет лимит слушателей: регистрация сверх лимита падает,
    /// ранее зарегистрированные остаются рабочими.
    #[test]
    fn test_max_listeners_enforced() {
        let emitter: EventEmitter<i32> = EventEmitter::new(":", 6, Duration::from_millis(10), 2);
        emitter.on("e", listener(|_: &i32| Ok(Some(1)))).unwrap();
        emitter.on("e", listener(|_: &i32| Ok(Some(2)))).unwrap();

        let err = emitter.on("e", listener(|_: &i32| Ok(Some(3)))).unwrap_err();
        assert!(matches!(
            err,
            BrokerError::MaxListeners { max: 2, .. }
        ));

        // прежние слушатели не пострадали
        assert_eq!(emitter.listener_count("e"), 2);
        let result = emitter.call("e", &0, CallStrategy::All).unwrap();
        assert_eq!(result, CallResult::Values(vec![Some(1), Some(2)]));
    }

    /// Тест проверяет, что лимит слушателей не пробивается конкурентной
    /// регистрацией: проверка и вставка происходят под одним локом.
    #[test]
    fn test_max_listeners_atomic_under_contention() {
        let emitter: EventEmitter<i32> = EventEmitter::new(":", 6, Duration::from_millis(10), 1);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..500 {
                        let _ = emitter.on("e", listener(|_: &i32| Ok(None)));
                        assert!(emitter.listener_count("e") <= 1);
                        emitter.off("e", None);
                    }
                });
            }
        });
        assert!(emitter.listener_count("e") <= 1);
    }

    /// Тест проверяет стратегии `first`/`last`/`all` и порядок результатов.
    #[test]
    fn test_call_strategy_ordering() {
        let emitter: EventEmitter<String> = emitter();
        emitter
            .on("e", listener(|p: &String| Ok(Some(format!("a:{p}")))))
            .unwrap();
        emitter
            .on("e", listener(|p: &String| Ok(Some(format!("b:{p}")))))
            .unwrap();

        let payload = "X".to_string();
        let first = emitter.call("e", &payload, CallStrategy::First).unwrap();
        assert_eq!(first, CallResult::Value(Some("a:X".to_string())));

        let last = emitter.call("e", &payload, CallStrategy::Last).unwrap();
        assert_eq!(last, CallResult::Value(Some("b:X".to_string())));

        let all = emitter.call("e", &payload, CallStrategy::All).unwrap();
        assert_eq!(
            all,
            CallResult::Values(vec![Some("a:X".to_string()), Some("b:X".to_string())])
        );
    }

    /// Тест проверяет `race`: результат — первый завершившийся.
    #[test]
    fn test_call_race_returns_first_completed() {
        let emitter: EventEmitter<i32> = emitter();
        emitter.on("e", listener(|_: &i32| Ok(Some(10)))).unwrap();
        emitter.on("e", listener(|_: &i32| Ok(Some(20)))).unwrap();

        let result = emitter.call("e", &0, CallStrategy::Race).unwrap();
        assert_eq!(result, CallResult::Value(Some(10)));
    }

    /// Тест проверяет `some`/`every` без короткого замыкания.
    #[test]
    fn test_call_some_every_run_all_listeners() {
        let emitter: EventEmitter<i32> = emitter();
        let invoked = Arc::new(AtomicUsize::new(0));

        let counter = invoked.clone();
        emitter
            .on(
                "e",
                listener(move |_: &i32| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(1))
                }),
            )
            .unwrap();
        let counter = invoked.clone();
        emitter
            .on(
                "e",
                listener(move |_: &i32| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }),
            )
            .unwrap();

        let some = emitter.call("e", &0, CallStrategy::Some).unwrap();
        assert_eq!(some, CallResult::Flag(true));
        // оба слушателя выполнились, несмотря на раннюю «истину»
        assert_eq!(invoked.load(Ordering::SeqCst), 2);

        let every = emitter.call("e", &0, CallStrategy::Every).unwrap();
        assert_eq!(every, CallResult::Flag(false));
        assert_eq!(invoked.load(Ordering::SeqCst), 4);
    }

    /// Тест проверяет, что стратегии без слушателей не падают.
    #[test]
    fn test_call_without_listeners_returns_defaults() {
        let emitter: EventEmitter<i32> = emitter();
        assert_eq!(
            emitter.call("missing", &0, CallStrategy::All).unwrap(),
            CallResult::Values(vec![])
        );
        assert_eq!(
            emitter.call("missing", &0, CallStrategy::First).unwrap(),
            CallResult::Value(None)
        );
        assert_eq!(
            emitter.call("missing", &0, CallStrategy::Every).unwrap(),
            CallResult::Flag(true)
        );
    }

    /// Тест проверяет, что ошибка слушателя уходит вызывающему.
    #[test]
    fn test_listener_error_surfaces() {
        let emitter: EventEmitter<i32> = emitter();
        emitter
            .on(
                "e",
                listener(|_: &i32| Err(ListenerError::new("broken handler"))),
            )
            .unwrap();

        let err = emitter.emit("e", &1).unwrap_err();
        assert!(matches!(err, BrokerError::Listener(_)));
    }

    /// Тест проверяет `watch`, разрешаемый последующим `emit`.
    #[tokio::test]
    async fn test_watch_resolved_by_emit() {
        let emitter: EventEmitter<i32> = EventEmitter::new(":", 6, Duration::from_millis(100), 5);
        let pending = emitter.watch("num", None);
        let fire = async {
            emitter.emit("num", &42).unwrap();
        };
        let (result, _) = tokio::join!(pending, fire);
        assert_eq!(result, Ok(42));
    }

    /// Тест проверяет `watch_or`: таймаут подменяется значением по
    /// умолчанию, остановка — нет.
    #[tokio::test(start_paused = true)]
    async fn test_watch_or_default_on_timeout() {
        let emitter: EventEmitter<String> = EventEmitter::new(":", 6, Duration::from_millis(10), 5);
        let result = emitter
            .watch_or("test", None, "fallback".to_string())
            .await;
        assert_eq!(result, Ok("fallback".to_string()));
    }

    /// Тест проверяет, что `shutdown` завершает ожидания ошибкой `Shutdown`
    /// и очищает реестр.
    #[tokio::test]
    async fn test_shutdown_clears_state() {
        let emitter: EventEmitter<i32> = EventEmitter::new(":", 6, Duration::from_secs(60), 5);
        emitter.on("e", listener(|_: &i32| Ok(None))).unwrap();

        let pending = emitter.watch("num", None);
        let stop = async {
            emitter.shutdown();
        };
        let (result, _) = tokio::join!(pending, stop);
        assert_eq!(result, Err(WatchError::Shutdown));
        assert_eq!(emitter.listener_count("e"), 0);
    }
}
