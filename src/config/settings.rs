use std::time::Duration;

use serde::Deserialize;

use config::{Config, ConfigError, Environment};

/// Параметры конструирования брокера.
///
/// Все поля, кроме имени, имеют значения по умолчанию:
/// - `cache_size` — 6 (подсказка для внутреннего кеша реестра)
/// - `delimiter` — `":"` (разделитель сегментов имён событий)
/// - `ignore_errors` — `false` (ошибки распространения пробрасываются)
/// - `default_timeout` — 1000 мс (дедлайн `watch` по умолчанию)
/// - `max_listeners` — 5 (лимит слушателей на одно имя события)
/// - `trace_ttl` — 30 с (время удержания трассировок распространения)
#[derive(Debug, Clone)]
pub struct BrokerOptions {
    pub name: String,
    pub cache_size: usize,
    pub delimiter: String,
    pub ignore_errors: bool,
    pub default_timeout: Duration,
    pub max_listeners: usize,
    pub trace_ttl: Duration,
}

/// Представление опций для `config`: длительности в миллисекундах.
#[derive(Debug, Deserialize)]
struct RawOptions {
    cache_size: usize,
    delimiter: String,
    ignore_errors: bool,
    default_timeout_ms: u64,
    max_listeners: usize,
    trace_ttl_ms: u64,
}

impl BrokerOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cache_size: 6,
            delimiter: ":".to_string(),
            ignore_errors: false,
            default_timeout: Duration::from_millis(1000),
            max_listeners: 5,
            trace_ttl: Duration::from_secs(30),
        }
    }

    /// Загружает опции с перекрытием через переменные окружения
    /// с префиксом `VETKA_` (например `VETKA_MAX_LISTENERS=10`).
    pub fn load(name: impl Into<String>) -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            // Значения по умолчанию
            .set_default("cache_size", 6)?
            .set_default("delimiter", ":")?
            .set_default("ignore_errors", false)?
            .set_default("default_timeout_ms", 1000)?
            .set_default("max_listeners", 5)?
            .set_default("trace_ttl_ms", 30_000)?
            // Переменные окружения с префиксом VETKA_
            .add_source(Environment::with_prefix("VETKA"))
            .build()?;

        let raw: RawOptions = cfg.try_deserialize()?;
        let mut options = BrokerOptions::new(name);
        options.cache_size = raw.cache_size;
        options.delimiter = raw.delimiter;
        options.ignore_errors = raw.ignore_errors;
        options.default_timeout = Duration::from_millis(raw.default_timeout_ms);
        options.max_listeners = raw.max_listeners;
        options.trace_ttl = Duration::from_millis(raw.trace_ttl_ms);
        Ok(options)
    }

    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn with_ignore_errors(mut self, ignore_errors: bool) -> Self {
        self.ignore_errors = ignore_errors;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_max_listeners(mut self, max_listeners: usize) -> Self {
        self.max_listeners = max_listeners;
        self
    }

    pub fn with_trace_ttl(mut self, ttl: Duration) -> Self {
        self.trace_ttl = ttl;
        self
    }
}
