//! Сетка брокеров (mesh).
//!
//! Этот модуль связывает независимые брокеры в произвольный граф
//! соединений и обеспечивает безопасное к циклам распространение:
//!
//! - `broker`: узел — локальная доставка, соединения, распространение.
//! - `channel`: фасад пространства имён поверх брокера.
//! - `trace`: трассировки распространения (visited-множества).
//! - `options`: опции вызовов и служебные метаданные эмиссии.

pub mod broker;
pub mod channel;
pub mod options;
pub(crate) mod trace;

pub use broker::*;
pub use channel::*;
pub use options::*;

use std::sync::Arc;

/// Идентичность брокера: непрозрачная строка, уникальная в пределах сетки.
pub type BrokerId = Arc<str>;
