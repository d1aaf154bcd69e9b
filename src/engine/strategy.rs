/// Стратегия свёртки результатов `call`: как из N слушателей одного
/// события получить один ответ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallStrategy {
    /// Вызвать только первого зарегистрированного слушателя.
    #[default]
    First,
    /// Вызвать только последнего зарегистрированного слушателя.
    Last,
    /// Вызвать всех по порядку и собрать результаты в список.
    All,
    /// Вызвать всех; ответ — первый завершившийся результат.
    /// Синхронные слушатели завершаются немедленно, поэтому побеждает
    /// результат первого по порядку регистрации.
    Race,
    /// Вызвать всех; ответ — логическое ИЛИ «истинности» результатов.
    /// Без короткого замыкания: выполняются все слушатели.
    Some,
    /// Вызвать всех; ответ — логическое И «истинности» результатов.
    /// Без короткого замыкания: выполняются все слушатели.
    Every,
}

/// Результат `call`, форма зависит от стратегии.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallResult<T> {
    /// `First` / `Last` / `Race`: значение одного слушателя
    /// (`None` — слушателей нет или слушатель ничего не вернул).
    Value(Option<T>),
    /// `All`: значения всех слушателей в порядке регистрации.
    Values(Vec<Option<T>>),
    /// `Some` / `Every`: свёрнутая «истинность» (`Some(_)` — истина).
    Flag(bool),
}

impl CallStrategy {
    /// Результат при отсутствии слушателей — это не ошибка.
    pub(crate) fn empty_result<T>(self) -> CallResult<T> {
        match self {
            CallStrategy::First | CallStrategy::Last | CallStrategy::Race => {
                CallResult::Value(None)
            }
            CallStrategy::All => CallResult::Values(Vec::new()),
            CallStrategy::Some => CallResult::Flag(false),
            CallStrategy::Every => CallResult::Flag(true),
        }
    }
}

impl<T> CallResult<T> {
    /// Единственное значение (`Value`), иначе `None`.
    pub fn single(self) -> Option<T> {
        match self {
            CallResult::Value(value) => value,
            _ => None,
        }
    }

    /// Список значений (`Values`), иначе пустой список.
    pub fn many(self) -> Vec<Option<T>> {
        match self {
            CallResult::Values(values) => values,
            _ => Vec::new(),
        }
    }

    /// Логический ответ (`Flag`), иначе `false`.
    pub fn truth(self) -> bool {
        matches!(self, CallResult::Flag(true))
    }
}
