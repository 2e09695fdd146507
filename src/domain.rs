//! The capabilities the log manager depends on.
//!
//! Implementations live elsewhere: the Google Cloud Logging client in the [`infra`](crate::infra)
//! module and the application's own slog sink in [`logging`](crate::logging).
pub mod logging;

#[cfg(test)]
pub mod fakes;
