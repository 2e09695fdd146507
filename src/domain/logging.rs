use async_trait::async_trait;
use slog::{Drain, Level, Never};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// A drain bound to a remote log, installed into a [`LogSink`] in standard mode.
pub type Handler = Arc<dyn Drain<Ok = (), Err = Never> + Send + Sync>;

/// The credentials a [`ClientConnector`] uses to construct a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Whatever the environment provides, e.g. the metadata server
    Default,
    /// A service account key file
    ServiceAccountFile(PathBuf),
}

/// The severities offered on the web form.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum_macros::EnumString,
    strum_macros::Display,
    strum_macros::AsRefStr,
    strum_macros::VariantNames,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn level(self) -> Level {
        match self {
            Severity::Info => Level::Info,
            Severity::Warning => Level::Warning,
            Severity::Error => Level::Error,
        }
    }
}

/// The slog level for a severity name. Names we don't know get the lowest priority.
pub fn level_for(severity: &str) -> Level {
    severity
        .parse::<Severity>()
        .map(Severity::level)
        .unwrap_or(Level::Trace)
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("{kind}: {message}")]
    Remote { kind: &'static str, message: String },
    #[error("no logging client, initialization failed or was not done")]
    NotInitialized,
}

impl LoggingError {
    pub fn kind(&self) -> &'static str {
        match self {
            LoggingError::Remote { kind, .. } => kind,
            LoggingError::NotInitialized => "NotInitialized",
        }
    }
}

/// Constructs remote logging clients.
#[async_trait]
pub trait ClientConnector: Send + Sync {
    async fn connect(&self, credentials: &Credentials) -> Result<Box<dyn LoggingClient>, LoggingError>;
}

/// A connected remote logging client.
pub trait LoggingClient: Send + Sync {
    /// The project entries are written to.
    fn project(&self) -> &str;

    /// Builds a drain that forwards records to log `name`.
    fn handler(&self, name: &str) -> Result<Handler, LoggingError>;

    /// A handle to write to log `name` directly.
    fn logger(&self, name: &str) -> Result<Box<dyn CloudLogger>, LoggingError>;
}

/// A named remote log.
#[async_trait]
pub trait CloudLogger: Send + Sync {
    fn name(&self) -> &str;

    /// Writes one text entry, `severity` is passed on unchanged.
    async fn log_text(&self, text: &str, severity: &str) -> Result<(), LoggingError>;

    /// Writes one structured entry.
    async fn log_struct(&self, payload: serde_json::Value, severity: &str) -> Result<(), LoggingError>;
}

/// The application's local logger, which cloud handlers can be installed into.
pub trait LogSink: Send + Sync {
    fn install(&self, handler: Handler);

    /// Removes every installed handler and restores the default minimum level.
    fn clear(&self);

    /// Records below `level` are not passed to installed handlers.
    fn set_min_level(&self, level: Level);

    fn emit(&self, level: Level, message: &str);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn form_severities_map_to_levels() {
        assert_eq!(level_for("INFO"), Level::Info);
        assert_eq!(level_for("WARNING"), Level::Warning);
        assert_eq!(level_for("ERROR"), Level::Error);
    }

    #[test]
    fn unknown_severities_get_lowest_priority() {
        assert_eq!(level_for("CRITICAL"), Level::Trace);
        assert_eq!(level_for("info"), Level::Trace);
        assert_eq!(level_for(""), Level::Trace);
    }

    #[test]
    fn severity_names() {
        assert_eq!(Severity::Warning.to_string(), "WARNING");
        assert_eq!("ERROR".parse::<Severity>().ok(), Some(Severity::Error));
    }
}
