/// Broker configuration loading (defaults, env overrides).
pub mod config;
/// Dispatch core: listener registry, emitter, call strategies, deadline watcher.
pub mod engine;
/// Common error types: broker, listener, watch.
pub mod error;
/// Tracing-based logging initialization.
pub mod logging;
/// Mesh layer: broker nodes, channels, propagation traces.
pub mod mesh;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Broker construction options.
pub use config::BrokerOptions;
/// Dispatch core: emitter, registry, watcher, strategies.
pub use engine::{
    listener, CallResult, CallStrategy, EventEmitter, EventWatcher, Listener, ListenerRegistry,
};
/// Operation errors.
pub use error::{BrokerError, ListenerError, WatchError};
/// Logging helpers.
pub use logging::{init_logging, try_init_logging};
/// Mesh API: brokers, channels, options.
pub use mesh::{
    BrokerChannel, BrokerId, ConnectionOptions, EmitOptions, EventBroker, IdSource,
};
