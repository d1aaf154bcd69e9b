use std::{collections::HashMap, num::NonZeroUsize, sync::Arc};

use lru::LruCache;
use parking_lot::{Mutex, RwLock};

use crate::error::BrokerError;

use super::Listener;

/// Запись реестра: слушатель плюс признак «одноразовости».
///
/// Порядок записей — порядок регистрации, он значим для стратегий
/// `first`/`last`.
pub(crate) struct RegistryEntry<T> {
    pub listener: Listener<T>,
    pub once: bool,
}

impl<T> Clone for RegistryEntry<T> {
    fn clone(&self) -> Self {
        Self {
            listener: self.listener.clone(),
            once: self.once,
        }
    }
}

/// Узел дерева имён: сегмент → потомок, слушатели лежат в узле,
/// соответствующем полному пути имени.
struct TreeNode<T> {
    children: HashMap<String, TreeNode<T>>,
    entries: Vec<RegistryEntry<T>>,
}

impl<T> TreeNode<T> {
    fn new() -> Self {
        Self {
            children: HashMap::new(),
            entries: Vec::new(),
        }
    }
}

/// Локальный реестр слушателей.
///
/// Имена событий иерархические: сегменты разделяются настраиваемым
/// разделителем (`user:login` → `user` → `login`). Поиск — по точному
/// пути. Разбиение имён на сегменты кешируется в LRU размером
/// `cache_size`.
pub struct ListenerRegistry<T> {
    tree: RwLock<TreeNode<T>>,
    delimiter: String,
    segments: Mutex<LruCache<String, Arc<Vec<String>>>>,
}

impl<T> ListenerRegistry<T> {
    pub fn new(delimiter: impl Into<String>, cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            tree: RwLock::new(TreeNode::new()),
            delimiter: delimiter.into(),
            segments: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Разбивает имя события на сегменты, переиспользуя кеш.
    fn segments(&self, event: &str) -> Arc<Vec<String>> {
        let mut cache = self.segments.lock();
        if let Some(parts) = cache.get(event) {
            return parts.clone();
        }
        let parts: Arc<Vec<String>> = Arc::new(
            event
                .split(self.delimiter.as_str())
                .map(str::to_string)
                .collect(),
        );
        cache.put(event.to_string(), parts.clone());
        parts
    }

    /// Регистрирует слушателя в конце списка своего события.
    ///
    /// Лимит `max` проверяется под тем же write-локом, что и вставка:
    /// конкурирующие регистрации не могут обе пройти под лимит.
    pub(crate) fn register(
        &self,
        event: &str,
        listener: Listener<T>,
        once: bool,
        max: usize,
    ) -> Result<(), BrokerError> {
        let parts = self.segments(event);
        let mut tree = self.tree.write();
        let mut node = &mut *tree;
        for part in parts.iter() {
            node = node.children.entry(part.clone()).or_insert_with(TreeNode::new);
        }
        if node.entries.len() >= max {
            return Err(BrokerError::MaxListeners {
                event: event.to_string(),
                max,
            });
        }
        node.entries.push(RegistryEntry { listener, once });
        Ok(())
    }

    /// Снимает регистрацию: конкретного слушателя (по `Arc::ptr_eq`)
    /// или всех слушателей события, когда слушатель не указан.
    ///
    /// Опустевшие узлы дерева вырезаются по пути назад, чтобы дерево
    /// не росло монотонно с каждым когда-либо использованным именем.
    pub fn unregister(&self, event: &str, listener: Option<&Listener<T>>) {
        let parts = self.segments(event);
        let mut tree = self.tree.write();
        Self::remove_at(&mut tree, &parts, listener);
    }

    /// Возвращает `true`, если узел после снятия пуст и его можно
    /// вырезать из родителя.
    fn remove_at(node: &mut TreeNode<T>, parts: &[String], listener: Option<&Listener<T>>) -> bool {
        match parts.split_first() {
            None => match listener {
                Some(target) => node
                    .entries
                    .retain(|entry| !Arc::ptr_eq(&entry.listener, target)),
                None => node.entries.clear(),
            },
            Some((head, rest)) => {
                if let Some(child) = node.children.get_mut(head) {
                    if Self::remove_at(child, rest, listener) {
                        node.children.remove(head);
                    }
                }
            }
        }
        node.entries.is_empty() && node.children.is_empty()
    }

    /// Возвращает слушателей события в порядке регистрации.
    pub fn lookup(&self, event: &str) -> Vec<Listener<T>> {
        self.entries(event)
            .into_iter()
            .map(|entry| entry.listener)
            .collect()
    }

    /// Снимок записей (слушатель + флаг `once`) в порядке регистрации.
    pub(crate) fn entries(&self, event: &str) -> Vec<RegistryEntry<T>> {
        let parts = self.segments(event);
        let tree = self.tree.read();
        let mut node = &*tree;
        for part in parts.iter() {
            match node.children.get(part) {
                Some(child) => node = child,
                None => return Vec::new(),
            }
        }
        node.entries.clone()
    }

    /// Число слушателей, зарегистрированных на событие.
    pub fn count(&self, event: &str) -> usize {
        let parts = self.segments(event);
        let tree = self.tree.read();
        let mut node = &*tree;
        for part in parts.iter() {
            match node.children.get(part) {
                Some(child) => node = child,
                None => return 0,
            }
        }
        node.entries.len()
    }

    /// Полностью очищает дерево слушателей.
    pub fn clear(&self) {
        let mut tree = self.tree.write();
        tree.children.clear();
        tree.entries.clear();
    }

    /// Число узлов дерева имён, не считая корня.
    #[cfg(test)]
    fn node_count(&self) -> usize {
        fn walk<T>(node: &TreeNode<T>) -> usize {
            node.children.values().map(|child| 1 + walk(child)).sum()
        }
        walk(&self.tree.read())
    }
}
