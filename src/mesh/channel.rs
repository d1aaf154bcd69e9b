use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use crate::{
    engine::{CallResult, CallStrategy, Listener},
    error::{BrokerError, WatchError},
};

use super::{EmitOptions, EventBroker};

/// Канал — фасад пространства имён поверх брокера.
///
/// Каждая операция переписывает имя события в
/// `<имя-канала><разделитель><событие>` и делегирует владеющему
/// брокеру; вложенные каналы наращивают префикс транзитивно. Сам канал
/// состояния не имеет и держит владельца слабой ссылкой: операции на
/// канале остановленного (или уже освобождённого) брокера завершаются
/// ошибкой `Closed`.
pub struct BrokerChannel<T: Clone + Send + Sync + 'static> {
    name: String,
    delimiter: String,
    broker: Weak<EventBroker<T>>,
}

impl<T: Clone + Send + Sync + 'static> BrokerChannel<T> {
    pub(crate) fn new(
        name: &str,
        delimiter: &str,
        broker: Weak<EventBroker<T>>,
    ) -> Self {
        Self {
            name: name.to_string(),
            delimiter: delimiter.to_string(),
            broker,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Идентичность владеющего брокера (пустая строка, если брокер
    /// уже освобождён).
    pub fn id(&self) -> String {
        self.broker
            .upgrade()
            .map(|broker| broker.id().to_string())
            .unwrap_or_default()
    }

    fn broker(&self) -> Result<Arc<EventBroker<T>>, BrokerError> {
        self.broker.upgrade().ok_or(BrokerError::Closed)
    }

    /// Полное имя события внутри канала.
    fn scoped(&self, event: &str) -> String {
        format!("{}{}{}", self.name, self.delimiter, event)
    }

    pub fn on(&self, event: &str, listener: Listener<T>) -> Result<(), BrokerError> {
        self.broker()?.on(&self.scoped(event), listener)
    }

    pub fn once(&self, event: &str, listener: Listener<T>) -> Result<(), BrokerError> {
        self.broker()?.once(&self.scoped(event), listener)
    }

    pub fn off(&self, event: &str, listener: Option<&Listener<T>>) -> Result<(), BrokerError> {
        self.broker()?.off(&self.scoped(event), listener);
        Ok(())
    }

    pub fn emit(&self, event: &str, payload: T) -> Result<(), BrokerError> {
        self.broker()?.emit(&self.scoped(event), payload)
    }

    pub fn emit_with(
        &self,
        event: &str,
        payload: T,
        options: EmitOptions,
    ) -> Result<(), BrokerError> {
        self.broker()?.emit_with(&self.scoped(event), payload, options)
    }

    pub fn broadcast(&self, event: &str, payload: T) -> Result<(), BrokerError> {
        self.broker()?.broadcast(&self.scoped(event), payload)
    }

    pub fn call(
        &self,
        event: &str,
        payload: T,
        strategy: CallStrategy,
    ) -> Result<CallResult<T>, BrokerError> {
        self.broker()?.call(&self.scoped(event), payload, strategy)
    }

    pub async fn watch(&self, event: &str, timeout: Option<Duration>) -> Result<T, WatchError> {
        match self.broker.upgrade() {
            Some(broker) => broker.watch(&self.scoped(event), timeout).await,
            None => Err(WatchError::Shutdown),
        }
    }

    pub async fn watch_or(
        &self,
        event: &str,
        timeout: Option<Duration>,
        default: T,
    ) -> Result<T, WatchError> {
        match self.broker.upgrade() {
            Some(broker) => broker.watch_or(&self.scoped(event), timeout, default).await,
            None => Err(WatchError::Shutdown),
        }
    }

    /// Слушатели события канала в порядке регистрации.
    pub fn listeners(&self, event: &str) -> Vec<Listener<T>> {
        self.broker
            .upgrade()
            .map(|broker| broker.listeners(&self.scoped(event)))
            .unwrap_or_default()
    }

    /// Вложенный канал: префиксы сцепляются, экземпляр кешируется на
    /// уровне брокера (как и у каналов верхнего уровня).
    pub fn channel(&self, name: &str) -> Result<Arc<BrokerChannel<T>>, BrokerError> {
        let broker = self.broker()?;
        let nested = format!("{}{}{}", self.name, self.delimiter, name);
        Ok(broker.channel(&nested))
    }
}
