use crate::domain::logging::{
    ClientConnector, CloudLogger, Credentials, Handler, LoggingClient, LoggingError,
};
use async_trait::async_trait;
use slog_google::client::{self, Client};
use std::sync::Arc;

/// A [ClientConnector] that connects to Google Cloud Logging
#[derive(Debug, Default)]
pub struct GoogleConnector;

impl GoogleConnector {
    pub fn new() -> Self {
        GoogleConnector
    }
}

#[async_trait]
impl ClientConnector for GoogleConnector {
    async fn connect(&self, credentials: &Credentials) -> Result<Box<dyn LoggingClient>, LoggingError> {
        let client = match credentials {
            Credentials::Default => Client::from_default_credentials().await?,
            Credentials::ServiceAccountFile(path) => Client::from_service_account_json(path)?,
        };
        Ok(Box::new(GoogleClient { client }))
    }
}

impl From<slog_google::error::Error> for LoggingError {
    fn from(e: slog_google::error::Error) -> Self {
        LoggingError::Remote {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug)]
struct GoogleClient {
    client: Client,
}

impl LoggingClient for GoogleClient {
    fn project(&self) -> &str {
        self.client.project()
    }

    fn handler(&self, name: &str) -> Result<Handler, LoggingError> {
        Ok(Arc::new(self.client.handler(name)?))
    }

    fn logger(&self, name: &str) -> Result<Box<dyn CloudLogger>, LoggingError> {
        Ok(Box::new(GoogleLogger(self.client.logger(name))))
    }
}

#[derive(Debug)]
struct GoogleLogger(client::CloudLogger);

#[async_trait]
impl CloudLogger for GoogleLogger {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn log_text(&self, text: &str, severity: &str) -> Result<(), LoggingError> {
        Ok(self.0.log_text(text, severity).await?)
    }

    async fn log_struct(&self, payload: serde_json::Value, severity: &str) -> Result<(), LoggingError> {
        Ok(self.0.log_struct(payload, severity).await?)
    }
}
