//! Logging setup shared by binaries and tests that embed `domainkit-core`.
//!
//! The core crate only emits `tracing` events; installing a subscriber is the
//! embedding process's job, done once through [`init`] or [`init_with`].

pub mod tracing;

pub use crate::tracing::{LogFormat, ObservabilityConfig, ObservabilityError, init, init_with};
