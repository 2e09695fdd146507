//! Infra contains infrastructure specific implementations of things in the [`domain`](crate::domain)
//! module.
mod google;

pub use google::GoogleConnector;
