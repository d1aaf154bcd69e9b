//! Ядро диспетчеризации событий.
//!
//! Этот модуль превращает «одно событие, N слушателей» в управляемую
//! доставку:
//!
//! - `registry`: локальный реестр слушателей с иерархическими именами.
//! - `emitter`: диспетчер — регистрация с лимитами, `once`, стратегии `call`.
//! - `watcher`: ожидание следующего события с дедлайном.
//! - `strategy`: закрытый набор стратегий `call` и форма их результата.

pub mod emitter;
pub mod registry;
pub mod strategy;
pub mod watcher;

pub use emitter::*;
pub use registry::*;
pub use strategy::*;
pub use watcher::*;

use std::sync::Arc;

use crate::error::ListenerError;

/// Слушатель события: получает полезную нагрузку по ссылке и может
/// вернуть значение (используется стратегиями `call`), ничего или ошибку.
///
/// Идентичность слушателя (для `off`) — `Arc::ptr_eq`.
pub type Listener<T> = Arc<dyn Fn(&T) -> Result<Option<T>, ListenerError> + Send + Sync>;

/// Оборачивает замыкание в [`Listener`].
pub fn listener<T, F>(f: F) -> Listener<T>
where
    F: Fn(&T) -> Result<Option<T>, ListenerError> + Send + Sync + 'static,
{
    Arc::new(f)
}
