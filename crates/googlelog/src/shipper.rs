use std::sync::mpsc as sync_mpsc;
use tokio::sync::mpsc as async_mpsc;

use google_logging2::api::WriteLogEntriesRequest;

use crate::client::Client;

/// A sync to async channel bridge.
/// Forwards the log messages from the [Drain's log function](crate::logger::Logger) to the [`Shipper`]
pub struct Bridge {
    sync_rx: sync_mpsc::Receiver<WriteLogEntriesRequest>,
    async_tx: async_mpsc::Sender<WriteLogEntriesRequest>,
}

impl Bridge {
    /// Forwards log messages from the drain to the shipper until the drain is dropped.
    pub fn run_sync_to_async_bridge(self) {
        while let Ok(message) = self.sync_rx.recv() {
            if let Err(e) = self.async_tx.blocking_send(message) {
                eprintln!("Failed to forward log message to async channel, log message not sent to Google Logger: {}", e);
                break;
            }
        }
    }
}

/// Sends the log messages to the Google Logging API through a [`Client`]
pub struct Shipper {
    client: Client,
    sync_rx: Option<sync_mpsc::Receiver<WriteLogEntriesRequest>>,
    async_rx: async_mpsc::Receiver<WriteLogEntriesRequest>,
    async_tx: Option<async_mpsc::Sender<WriteLogEntriesRequest>>,
}

impl Shipper {
    /// Takes the sync receiver and async sender from the Shipper struct into the [`Bridge`]
    ///
    /// # Panics
    ///
    /// When called more than once.
    pub fn yield_bridge(&mut self) -> Bridge {
        match (self.sync_rx.take(), self.async_tx.take()) {
            (Some(sync_rx), Some(async_tx)) => Bridge { sync_rx, async_tx },
            (_, _) => panic!("the bridge was already taken from this shipper"),
        }
    }

    /// Creates a `Shipper`
    pub fn new(sync_rx: sync_mpsc::Receiver<WriteLogEntriesRequest>, client: Client) -> Self {
        let (async_tx, async_rx) = async_mpsc::channel::<WriteLogEntriesRequest>(100);

        Shipper {
            client,
            sync_rx: Some(sync_rx),
            async_rx,
            async_tx: Some(async_tx),
        }
    }

    /// The process that receives log entries and sends them to the Google Logging API
    pub async fn run_log_shipper(mut self) {
        while let Some(log_entry) = self.async_rx.recv().await {
            if let Err(e) = self.client.write_entries(&log_entry).await {
                eprintln!("Failed to send log entry: {}", e);
            }
        }
    }
}
