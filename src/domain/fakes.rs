//! In-memory stand-ins for the remote client and the local sink.
use crate::domain::logging::{
    ClientConnector, CloudLogger, Credentials, Handler, LogSink, LoggingClient, LoggingError,
};
use async_trait::async_trait;
use slog::Level;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Text(String, String),
    Struct(serde_json::Value, String),
}

#[derive(Clone, Default)]
pub struct Remote {
    pub connects: Arc<Mutex<Vec<Credentials>>>,
    pub writes: Arc<Mutex<Vec<Write>>>,
    pub refuse_connect: bool,
    pub refuse_handler: bool,
}

#[async_trait]
impl ClientConnector for Remote {
    async fn connect(&self, credentials: &Credentials) -> Result<Box<dyn LoggingClient>, LoggingError> {
        self.connects.lock().unwrap().push(credentials.clone());
        if self.refuse_connect {
            return Err(LoggingError::Remote {
                kind: "NoDefaultCredentials",
                message: "no credentials around here".to_string(),
            });
        }
        Ok(Box::new(self.clone()))
    }
}

impl LoggingClient for Remote {
    fn project(&self) -> &str {
        "demo-project"
    }

    fn handler(&self, _name: &str) -> Result<Handler, LoggingError> {
        if self.refuse_handler {
            return Err(LoggingError::Remote {
                kind: "NoRuntime",
                message: "no runtime".to_string(),
            });
        }
        Ok(Arc::new(slog::Discard))
    }

    fn logger(&self, name: &str) -> Result<Box<dyn CloudLogger>, LoggingError> {
        Ok(Box::new(FakeLogger {
            name: name.to_string(),
            writes: self.writes.clone(),
        }))
    }
}

struct FakeLogger {
    name: String,
    writes: Arc<Mutex<Vec<Write>>>,
}

#[async_trait]
impl CloudLogger for FakeLogger {
    fn name(&self) -> &str {
        &self.name
    }

    async fn log_text(&self, text: &str, severity: &str) -> Result<(), LoggingError> {
        self.writes
            .lock()
            .unwrap()
            .push(Write::Text(text.to_string(), severity.to_string()));
        Ok(())
    }

    async fn log_struct(&self, payload: serde_json::Value, severity: &str) -> Result<(), LoggingError> {
        self.writes
            .lock()
            .unwrap()
            .push(Write::Struct(payload, severity.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSink {
    pub installed: Mutex<usize>,
    pub min_level: Mutex<Option<Level>>,
    pub emitted: Mutex<Vec<(Level, String)>>,
}

impl LogSink for FakeSink {
    fn install(&self, _handler: Handler) {
        *self.installed.lock().unwrap() += 1;
    }

    fn clear(&self) {
        *self.installed.lock().unwrap() = 0;
        *self.min_level.lock().unwrap() = None;
    }

    fn set_min_level(&self, level: Level) {
        *self.min_level.lock().unwrap() = Some(level);
    }

    fn emit(&self, level: Level, message: &str) {
        self.emitted.lock().unwrap().push((level, message.to_string()));
    }
}

