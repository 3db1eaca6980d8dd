//! Process-wide logging setup shared by the binaries.

pub mod tracing;

pub use crate::tracing::{LogConfig, LogFormat, UnknownLogFormat, init};
