#[macro_use]
extern crate tracing;

pub mod config;
pub mod encoder;
pub mod error;
pub mod event;
pub mod formatter;
pub mod grouper;
pub mod health;
pub mod sink;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::LokiConfig;
pub use error::{ConfigError, SendError, TransportError};
pub use event::{Event, Level, Value};
pub use health::{HealthContext, HealthReporter, TracingHealthReporter};
pub use sink::LokiSink;
pub use tokio_util::sync::CancellationToken;

#[doc(hidden)]
pub use indexmap;
