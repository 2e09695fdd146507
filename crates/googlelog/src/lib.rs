//! A [Google Cloud Logging](https://cloud.google.com/logging) client and an implementation of
//! [`slog::Drain`](https://slog-rs.github.io/slog/slog/trait.Drain.html) that writes through it.
//!
//! # Usage
//!
//! Create a [`Client`](client::Client) from a service account key file
//! ([`from_service_account_json`](client::Client::from_service_account_json)) or from the
//! credentials the environment provides ([`from_default_credentials`](client::Client::from_default_credentials):
//! `GOOGLE_APPLICATION_CREDENTIALS` or the metadata server of the instance).
//!
//! From the client you can get:
//!
//! 1. a [`CloudLogger`](client::CloudLogger) with [`log_text`](client::CloudLogger::log_text) and
//!    [`log_struct`](client::CloudLogger::log_struct) that write one entry per call;
//! 2. a slog drain ([`handler`](client::Client::handler), requires the `shipper` feature) that
//!    hands entries to an async [`Shipper`](shipper::Shipper).
//!
//! The drain can also be built on its own with the [`Builder`](logger::Builder), in which case you
//! receive the [`WriteLogEntries`](https://cloud.google.com/logging/docs/reference/v2/rpc/google.logging.v2#google.logging.v2.LoggingServiceV2.WriteLogEntries)
//! requests over a channel and take care of transportation yourself.
//!
//! ```no_run
//! # async fn example() -> Result<(), slog_google::error::Error> {
//! use slog_google::client::Client;
//!
//! let client = Client::from_service_account_json("/etc/secrets/sa_key_lg.json")?;
//! let logger = client.logger("my-app");
//! logger.log_text("disk full", "ERROR").await?;
//! # Ok(())
//! # }
//! ```

/// Access tokens for service accounts and the metadata server
pub mod auth;

/// The Google Cloud Logging API client
pub mod client;

/// Googlelog Error types
pub mod error;

/// The [`slog::Drain`](https://slog-rs.github.io/slog/slog/trait.Drain.html) Implementation of the slog Drain for [Google Cloud Logging](https://cloud.google.com/logging)
pub mod logger;

/// An optional async process to ship the log for you
#[cfg(feature = "shipper")]
pub mod shipper;
