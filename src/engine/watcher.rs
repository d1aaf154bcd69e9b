use std::time::Duration;

use dashmap::DashMap;
use tokio::{sync::oneshot, time};

use crate::error::WatchError;

type WaiterSlot<T> = oneshot::Sender<Result<T, WatchError>>;

/// Ожидание «следующего появления события X» с дедлайном.
///
/// На каждый вызов `watch` заводится одноразовый канал; все ожидающие
/// одного имени разрешаются разом на ближайшей локальной доставке.
/// Просроченные ожидания вычищаются лениво при следующем таймауте
/// того же имени.
pub struct EventWatcher<T> {
    waiting: DashMap<String, Vec<WaiterSlot<T>>>,
    default_timeout: Duration,
}

impl<T: Clone + Send + 'static> EventWatcher<T> {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            waiting: DashMap::new(),
            default_timeout,
        }
    }

    /// Ждёт следующую полезную нагрузку события `event`.
    ///
    /// # Возвращает
    /// - `Ok(payload)` — событие пришло до дедлайна
    /// - `Err(WatchError::Timeout)` — дедлайн истёк
    /// - `Err(WatchError::Shutdown)` — наблюдатель остановлен
    pub async fn watch(&self, event: &str, timeout: Option<Duration>) -> Result<T, WatchError> {
        let deadline = timeout.unwrap_or(self.default_timeout);
        let (tx, rx) = oneshot::channel();
        self.waiting.entry(event.to_string()).or_default().push(tx);

        match time::timeout(deadline, rx).await {
            Ok(Ok(outcome)) => outcome,
            // Отправитель удалён без ответа: таблица ожиданий очищена.
            Ok(Err(_)) => Err(WatchError::Shutdown),
            Err(_) => {
                self.prune(event);
                tracing::warn!(
                    event,
                    timeout_ms = deadline.as_millis() as u64,
                    "watch deadline elapsed"
                );
                Err(WatchError::Timeout {
                    event: event.to_string(),
                    ms: deadline.as_millis() as u64,
                })
            }
        }
    }

    /// Вызывается ядром на каждой локальной доставке: разрешает и
    /// убирает всех ожидающих этого имени.
    pub fn on_emit(&self, event: &str, payload: &T) {
        if let Some((_, waiters)) = self.waiting.remove(event) {
            for waiter in waiters {
                let _ = waiter.send(Ok(payload.clone()));
            }
        }
    }

    /// Число ожидающих по имени события.
    pub fn pending(&self, event: &str) -> usize {
        self.waiting
            .get(event)
            .map(|waiters| waiters.len())
            .unwrap_or(0)
    }

    /// Останавливает наблюдателя: каждое незавершённое ожидание
    /// получает `WatchError::Shutdown`, таймеров не остаётся.
    pub fn shutdown(&self) {
        self.waiting.retain(|_, waiters| {
            for waiter in std::mem::take(waiters) {
                let _ = waiter.send(Err(WatchError::Shutdown));
            }
            false
        });
    }

    /// Убирает закрытые (просроченные) слоты ожидания.
    fn prune(&self, event: &str) {
        if let Some(mut waiters) = self.waiting.get_mut(event) {
            waiters.retain(|slot| !slot.is_closed());
        }
        self.waiting.remove_if(event, |_, waiters| waiters.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет, что `on_emit` разрешает ожидание полезной нагрузкой.
    #[tokio::test]
    async fn test_watch_resolved_by_emit() {
        let watcher: EventWatcher<i32> = EventWatcher::new(Duration::from_millis(100));
        let pending = watcher.watch("num", None);
        let resolved = async {
            watcher.on_emit("num", &42);
        };
        let (result, _) = tokio::join!(pending, resolved);
        assert_eq!(result, Ok(42));
        assert_eq!(watcher.pending("num"), 0);
    }

    /// Тест проверяет, что несколько ожидающих одного имени
    /// разрешаются одной доставкой.
    #[tokio::test]
    async fn test_multiple_waiters_resolved_together() {
        let watcher: EventWatcher<String> = EventWatcher::new(Duration::from_millis(100));
        let first = watcher.watch("e", None);
        let second = watcher.watch("e", None);
        let emit = async {
            watcher.on_emit("e", &"hi".to_string());
        };
        let (a, b, _) = tokio::join!(first, second, emit);
        assert_eq!(a, Ok("hi".to_string()));
        assert_eq!(b, Ok("hi".to_string()));
    }

    /// Тест проверяет таймаут без события (время виртуальное).
    #[tokio::test(start_paused = true)]
    async fn test_watch_timeout() {
        let watcher: EventWatcher<i32> = EventWatcher::new(Duration::from_millis(10));
        let err = watcher.watch("num", None).await.unwrap_err();
        assert_eq!(
            err,
            WatchError::Timeout {
                event: "num".to_string(),
                ms: 10,
            }
        );
        assert_eq!(watcher.pending("num"), 0);
    }

    /// Тест проверяет, что `shutdown` завершает ожидания ошибкой
    /// `Shutdown`, а не таймаутом.
    #[tokio::test]
    async fn test_shutdown_fails_pending() {
        let watcher: EventWatcher<i32> = EventWatcher::new(Duration::from_secs(60));
        let pending = watcher.watch("num", None);
        let stop = async {
            watcher.shutdown();
        };
        let (result, _) = tokio::join!(pending, stop);
        assert_eq!(result, Err(WatchError::Shutdown));
    }
}
