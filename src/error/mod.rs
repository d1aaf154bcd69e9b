pub mod broker;
pub mod watch;

pub use broker::{BrokerError, ListenerError};
pub use watch::WatchError;
