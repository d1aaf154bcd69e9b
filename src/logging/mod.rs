use tracing_subscriber::EnvFilter;

/// Инициализация логирования для приложений, использующих крейт.
///
/// Уровень задаётся переменной окружения `RUST_LOG`
/// (по умолчанию `info`). Повторный вызов безопасен: ошибка
/// «подписчик уже установлен» игнорируется.
pub fn init_logging() {
    let _ = try_init_logging();
}

/// То же, что `init_logging`, но с пробросом ошибки установки
/// глобального подписчика.
pub fn try_init_logging() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()?;

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "logging initialized");
    Ok(())
}
