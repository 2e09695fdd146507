//! The log manager: sets up the Google Cloud Logging client from a [`LogConfig`] and writes the
//! entries submitted through the web form.
//!
//! Initialization never fails outright. Every step that goes wrong is logged locally and recorded
//! in the returned [`InitOutcome`], and the steps after it are still attempted where they can be.
use crate::config::{self, LogConfig, LogMode};
use crate::domain::logging::{
    level_for, ClientConnector, CloudLogger, Credentials, Handler, LogSink, LoggingClient,
    LoggingError,
};
use crate::metrics;
use serde_json::json;
use slog::{debug, error, info, Level, Logger};
use std::path::PathBuf;
use std::sync::Arc;

const EXPLORER_URL: &str = "https://console.cloud.google.com/logs/query";

/// The initialization steps, named after what they create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum InitStep {
    Validate,
    CreateClient,
    CreateHandler,
    CreateLogger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum InitStatus {
    /// Client and logger handle are available and nothing failed
    Initialized,
    /// There is a client but some later step failed
    Partial,
    /// There is no client
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitFailure {
    pub method: InitStep,
    pub class: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOutcome {
    pub status: InitStatus,
    pub failures: Vec<InitFailure>,
}

pub struct LogManager {
    log: Logger,
    connector: Box<dyn ClientConnector>,
    sink: Arc<dyn LogSink>,
    client: Option<Box<dyn LoggingClient>>,
    handler: Option<Handler>,
    logger: Option<Box<dyn CloudLogger>>,
    app_log_id: Option<String>,
    logger_name: Option<String>,
    standard_mode: Option<bool>,
}

impl LogManager {
    pub fn new(log: Logger, connector: Box<dyn ClientConnector>, sink: Arc<dyn LogSink>) -> Self {
        LogManager {
            log,
            connector,
            sink,
            client: None,
            handler: None,
            logger: None,
            app_log_id: None,
            logger_name: None,
            standard_mode: None,
        }
    }

    fn reset(&mut self) {
        self.sink.clear();
        self.client = None;
        self.handler = None;
        self.logger = None;
        self.app_log_id = None;
        self.logger_name = None;
        self.standard_mode = None;
    }

    fn fail(&self, failures: &mut Vec<InitFailure>, method: InitStep, class: &'static str, message: String) {
        error!(self.log, "{}", message; "class" => class, "method" => method.as_ref());
        failures.push(InitFailure { method, class, message });
    }

    /// Sets up the client, the handler and the logger handle from `config`, replacing whatever
    /// an earlier call set up.
    pub async fn initialize(&mut self, config: &LogConfig) -> InitOutcome {
        self.reset();
        self.app_log_id = config.app_log_id.clone();
        self.logger_name = config.logger_name.clone();

        let mut failures = vec![];
        if let Err(e) = config::check(config) {
            self.fail(&mut failures, InitStep::Validate, e.kind(), e.to_string());
            return InitOutcome {
                status: InitStatus::Failed,
                failures,
            };
        }

        // check() guarantees these are present
        let credentials_path = config.credentials_path.clone().unwrap_or_default();
        let logger_name = config.logger_name.clone().unwrap_or_default();

        let credentials = if credentials_path.is_empty() {
            Credentials::Default
        } else {
            Credentials::ServiceAccountFile(PathBuf::from(&credentials_path))
        };
        debug!(self.log, "Creating the Cloud Logging client"; "credentials" => ?credentials);
        match self.connector.connect(&credentials).await {
            Ok(client) => self.client = Some(client),
            Err(e) => self.fail(&mut failures, InitStep::CreateClient, e.kind(), e.to_string()),
        }

        if let Some(client) = &self.client {
            let standard = config.log_mode == Some(LogMode::Standard);
            self.standard_mode = Some(standard);
            match client.handler(&logger_name) {
                Ok(handler) => {
                    if standard {
                        self.sink.install(handler.clone());
                        self.sink.set_min_level(Level::Info);
                    }
                    self.handler = Some(handler);
                }
                Err(e) => self.fail(&mut failures, InitStep::CreateHandler, e.kind(), e.to_string()),
            }
        }

        match &self.client {
            Some(client) => match client.logger(&logger_name) {
                Ok(logger) => self.logger = Some(logger),
                Err(e) => self.fail(&mut failures, InitStep::CreateLogger, e.kind(), e.to_string()),
            },
            None => self.fail(
                &mut failures,
                InitStep::CreateLogger,
                "NoClient",
                format!("cannot create logger '{}' without a client", logger_name),
            ),
        }

        let status = match (&self.client, &self.logger) {
            (None, _) => InitStatus::Failed,
            (Some(_), Some(_)) if failures.is_empty() => InitStatus::Initialized,
            (Some(_), _) => InitStatus::Partial,
        };
        if self.client.is_some() {
            info!(self.log, "Cloud Logging set up";
                "status" => %status,
                "project" => self.client.as_ref().map(|c| c.project()),
                "logger" => &logger_name,
                "mode" => config.log_mode.map(|m| m.to_string()),
            );
        }
        InitOutcome { status, failures }
    }

    pub fn is_initialized(&self) -> bool {
        self.client.is_some()
    }

    /// `None` until a client has been created.
    pub fn standard_mode(&self) -> Option<bool> {
        self.standard_mode
    }

    pub fn has_logger(&self) -> bool {
        self.logger.is_some()
    }

    /// The name of the remote log direct writes go to.
    pub fn logger_name(&self) -> Option<&str> {
        self.logger.as_ref().map(|l| l.name())
    }

    /// Writes one entry. In standard mode it goes through the application logger at the level
    /// named by `level`, otherwise straight to Cloud Logging with `level` as its severity.
    pub async fn log(&self, level: &str, message: &str) -> Result<(), LoggingError> {
        let result = self.write(level, message).await;
        metrics::add_log_entry(level, result.is_ok());
        result
    }

    async fn write(&self, level: &str, message: &str) -> Result<(), LoggingError> {
        if self.client.is_none() {
            return Err(LoggingError::NotInitialized);
        }
        if self.standard_mode == Some(true) {
            self.sink.emit(level_for(level), message);
            return Ok(());
        }
        match &self.logger {
            Some(logger) => logger.log_text(message, level).await,
            None => Err(LoggingError::NotInitialized),
        }
    }

    /// A link to the Logs Explorer, filtered on our log.
    pub fn explorer_link(&self) -> Result<String, LoggingError> {
        let (client, logger_name) = match (&self.client, &self.logger_name) {
            (Some(client), Some(logger_name)) => (client, logger_name),
            _ => return Err(LoggingError::NotInitialized),
        };
        let project = client.project();
        Ok(format!(
            "{EXPLORER_URL};query=logName%3D%22projects%2F{project}%2Flogs%2F{logger_name}%22?project={project}"
        ))
    }

    /// Writes a few example entries, through the application logger first and then directly.
    pub async fn log_startup_example(&self) -> Result<(), LoggingError> {
        let logger = self.logger.as_ref().ok_or(LoggingError::NotInitialized)?;
        let app_log_id = self.app_log_id.as_deref().unwrap_or_default();
        let starting = format!("{}:starting up", app_log_id);
        let warning = format!("{}:warning message test", app_log_id);
        let data = json!({
            "url": "http://test.example.com",
            "data": "Test error",
            "code": 403,
        });

        self.sink.emit(Level::Info, &starting);
        self.sink.emit(Level::Warning, &warning);
        self.sink.emit(Level::Error, &data.to_string());

        logger.log_text(&starting, "INFO").await?;
        logger.log_text(&warning, "WARNING").await?;
        logger.log_struct(data, "ERROR").await
    }
}
