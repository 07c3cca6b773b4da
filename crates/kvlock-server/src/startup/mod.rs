//! Process startup: logging bootstrap

mod logging;

pub use logging::{LogRotation, LoggingConfig, LoggingGuard, init_logging};
