#[cfg(feature = "shipper")]
use crate::{client::Client, shipper};

use crate::error::Error;

use google_logging2::api::{LogEntry, MonitoredResource, WriteLogEntriesRequest};

use slog::{self, Drain, Key, Level, Never, OwnedKVList, Record, KV};
use std::collections::HashMap;
use std::fmt;
use std::fmt::Write;

use serde_json::json;

use std::sync::mpsc::sync_channel;

use chrono::Utc;

/// The monitored resource type used when nothing more specific is known about where the process runs.
pub const GLOBAL_RESOURCE: &str = "global";

/// How the log message ends up in the [LogEntry](https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry)
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// As `textPayload`
    #[default]
    Text,
    /// As `jsonPayload`, under the `message` key
    Json,
}

/// Builder for the [`Logger`]
#[derive(Default, Debug)]
pub struct Builder {
    log_name: String,
    log_level_label: Option<String>,
    resource_type: String,
    payload: Payload,
    default_labels: HashMap<String, String>,
    resource_labels: Option<HashMap<String, String>>,
}

/// Main struct for the Google Logger drain
pub struct Logger {
    log_name: String,
    log_level_label: Option<String>,
    payload: Payload,
    default_labels: HashMap<String, String>,
    resource: MonitoredResource,
    sync_tx: std::sync::mpsc::SyncSender<WriteLogEntriesRequest>,
}

impl Builder {
    /// Creates a Builder object.
    ///
    /// # Parameters
    /// - `log_name`: The `logName` string to be used in the [LogEntry](https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry)
    /// - `resource_type`: The required `type` field set in the `resource` [MonitoredResource](https://cloud.google.com/logging/docs/reference/v2/rest/v2/MonitoredResource) object of the [LogEntry](https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry). For example: `global` or `k8s_container`.
    ///
    /// # Example
    ///
    /// ```
    /// use slog_google::logger::Builder;
    /// let (drain, _) = Builder::new(
    ///     "projects/my-gcp-project/logs/my-log-id",
    ///     "global",
    /// )
    /// .build();
    /// ```
    ///
    #[must_use = "The builder must be used"]
    pub fn new(log_name: &str, resource_type: &str) -> Self {
        Self {
            log_name: log_name.to_string(),
            resource_type: resource_type.to_string(),
            ..Default::default()
        }
    }

    /// Sets resource labels to be applied.
    ///
    /// These labels will populate the `labels` field in the `resource` [MonitoredResource](https://cloud.google.com/logging/docs/reference/v2/rest/v2/MonitoredResource) object of the [LogEntry](https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry).
    ///
    /// # Errors
    ///
    /// Will return `Err` if `labels` is not a JSON object of strings.
    pub fn with_resource_labels(self, labels: serde_json::Value) -> Result<Self, Error> {
        Ok(Self {
            resource_labels: Some(
                serde_json::from_value(labels).map_err(Error::ResourceLabelsError)?,
            ),
            ..self
        })
    }

    /// Sets default labels to be applied in the labels field.
    ///
    /// These will populate the `labels` top level field of the [LogEntry](https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry). These labels are added in addition to any key-values set in the logger statement.
    ///
    /// # Errors
    ///
    /// Will return `Err` if `labels` is not a JSON object of strings.
    pub fn with_default_labels(self, labels: serde_json::Value) -> Result<Self, Error> {
        Ok(Self {
            default_labels: serde_json::from_value(labels).map_err(Error::DefaultLabelsError)?,
            ..self
        })
    }

    /// Sets the label name to store the log level
    ///
    /// If not set, the log level is not propagated, but you will still have the [severity](https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry#LogSeverity), which is always there.
    #[must_use = "The builder must be used"]
    pub fn with_log_level_label(self, log_level_label: &str) -> Self {
        Self {
            log_level_label: Some(log_level_label.into()),
            ..self
        }
    }

    /// Selects whether messages are sent as text or JSON payload. Text is the default.
    #[must_use = "The builder must be used"]
    pub fn with_payload(self, payload: Payload) -> Self {
        Self { payload, ..self }
    }

    fn into_logger(self, sync_tx: std::sync::mpsc::SyncSender<WriteLogEntriesRequest>) -> Logger {
        Logger {
            log_name: self.log_name,
            log_level_label: self.log_level_label,
            payload: self.payload,
            default_labels: self.default_labels,
            resource: MonitoredResource {
                type_: Some(self.resource_type),
                labels: self.resource_labels,
            },
            sync_tx,
        }
    }

    /// Returns a [`Logger`](struct@Logger) drain and the receiving end of the channel it sends its
    /// [`WriteLogEntries`](https://cloud.google.com/logging/docs/reference/v2/rpc/google.logging.v2#google.logging.v2.LoggingServiceV2.WriteLogEntries)
    /// requests to. Use this when something else takes care of transport.
    #[must_use = "The logger and receiver must be used to handle logging correctly"]
    pub fn build(self) -> (Logger, std::sync::mpsc::Receiver<WriteLogEntriesRequest>) {
        let (sync_tx, sync_rx) = sync_channel::<WriteLogEntriesRequest>(100);
        (self.into_logger(sync_tx), sync_rx)
    }

    /// Returns the drain together with a [`Shipper`](shipper::Shipper) that writes the entries
    /// through `client`. The caller runs the shipper's bridge and send loop, see
    /// [`Client::handler`](crate::client::Client::handler) for a version that does this for you.
    #[cfg(feature = "shipper")]
    #[must_use = "The logger and shipper must be used to handle logging correctly"]
    pub fn build_with_async_shipper(self, client: Client) -> (Logger, shipper::Shipper) {
        let (sync_tx, sync_rx) = sync_channel::<WriteLogEntriesRequest>(100);
        (self.into_logger(sync_tx), shipper::Shipper::new(sync_rx, client))
    }
}

/// Maps the slog level to a [LogSeverity](https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry#logseverity)
pub fn severity(log_level: Level) -> &'static str {
    match log_level {
        Level::Critical => "CRITICAL",
        Level::Error => "ERROR",
        Level::Warning => "WARNING",
        Level::Info => "INFO",
        Level::Debug | Level::Trace => "DEBUG",
    }
}

impl Logger {
    fn construct_log_entry(
        &self,
        message: &str,
        log_level: Level,
        serializer: Serializer,
    ) -> LogEntry {
        let mut labels = self.default_labels.clone();

        if !serializer.map.is_empty() {
            labels.extend(serializer.map);
        }

        // We add the log level to the labels if requested
        if let Some(label) = &self.log_level_label {
            labels.insert(label.clone(), log_level.as_str().to_string());
        }

        let entry = LogEntry {
            labels: Some(labels),
            severity: Some(severity(log_level).to_string()),
            timestamp: Some(Utc::now()),
            resource: Some(self.resource.clone()),
            ..Default::default()
        };

        match self.payload {
            Payload::Text => LogEntry {
                text_payload: Some(message.to_string()),
                ..entry
            },
            Payload::Json => LogEntry {
                json_payload: Some(HashMap::from([("message".to_string(), json!(message))])),
                ..entry
            },
        }
    }
}

#[derive(Debug)]
struct Serializer {
    map: HashMap<String, String>,
}

impl Serializer {
    fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }
}

impl slog::Serializer for Serializer {
    fn emit_arguments(&mut self, key: Key, val: &fmt::Arguments) -> slog::Result {
        let mut value = String::new();
        write!(value, "{val}")?;
        self.map.insert(key.into(), value);
        Ok(())
    }
}

impl Drain for Logger {
    type Ok = ();
    type Err = Never;

    fn log(&self, record: &Record<'_>, values: &OwnedKVList) -> Result<Self::Ok, Self::Err> {
        let mut serializer = Serializer::new();

        let kv = record.kv();
        let _ = kv.serialize(record, &mut serializer);

        let _ = values.serialize(record, &mut serializer);

        let log_entry = self.construct_log_entry(
            format!("{}", record.msg()).as_str(),
            record.level(),
            serializer,
        );

        let body = WriteLogEntriesRequest {
            log_name: Some(self.log_name.clone()),
            entries: Some(vec![log_entry]),
            ..Default::default()
        };

        // Blocks while the channel is full. Only fails once the receiving side is gone.
        if let Err(e) = self.sync_tx.send(body) {
            eprintln!("Failed to queue log entry, log message not sent to Google Logger: {}", e);
        }

        Ok(())
    }
}
