use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use google_logging2::api::{LogEntry, MonitoredResource, WriteLogEntriesRequest};

use crate::auth::{self, get_error_response, Authenticator, ServiceAccountKey, TokenSource};
use crate::error::Error;
use crate::logger::GLOBAL_RESOURCE;

const DEFAULT_SERVICE_ENDPOINT: &str = "https://logging.googleapis.com";
const CREDENTIALS_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";
const PROJECT_VARS: [&str; 2] = ["GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"];
const METADATA_TIMEOUT: Duration = Duration::from_secs(3);

/// A client for the [Google Cloud Logging API](https://cloud.google.com/logging/docs/reference/v2/rest).
///
/// Cloning is cheap, clones share the HTTP connection pool and the cached access token.
#[derive(Clone, Debug)]
pub struct Client {
    project: String,
    api_base_url: String,
    http: reqwest::Client,
    auth: Arc<Authenticator>,
}

impl Client {
    fn new(project: String, source: TokenSource) -> Self {
        Client {
            project,
            api_base_url: DEFAULT_SERVICE_ENDPOINT.to_string(),
            http: reqwest::Client::new(),
            auth: Arc::new(Authenticator::new(source)),
        }
    }

    /// Creates a client from a service account key file. The project is taken from the key file.
    ///
    /// No network calls are made, a bad key is reported here and an unauthorized account only
    /// when the first entry is written.
    pub fn from_service_account_json<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let key = ServiceAccountKey::from_file(path)?;
        Self::from_service_account_key(&key)
    }

    pub fn from_service_account_key(key: &ServiceAccountKey) -> Result<Self, Error> {
        Ok(Self::new(
            key.project_id.clone(),
            TokenSource::service_account(key)?,
        ))
    }

    /// Creates a client from the credentials found in the environment:
    ///
    /// 1. the key file named by `GOOGLE_APPLICATION_CREDENTIALS`,
    /// 2. otherwise the metadata server of the GCE/GKE/Cloud Run instance we run on.
    ///
    /// With the metadata server the project is taken from `GOOGLE_CLOUD_PROJECT` when set.
    pub async fn from_default_credentials() -> Result<Self, Error> {
        if let Some(path) = std::env::var_os(CREDENTIALS_VAR).filter(|p| !p.is_empty()) {
            return Self::from_service_account_json(path);
        }

        let base_url = auth::metadata_base_url();
        let project = PROJECT_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|p| !p.is_empty()));
        match project {
            Some(project) => Ok(Self::new(project, TokenSource::Metadata { base_url })),
            None => Self::from_metadata_server(&base_url).await.map_err(|e| {
                Error::NoDefaultCredentials(format!(
                    "{CREDENTIALS_VAR} is not set and the metadata server is not usable: {e}"
                ))
            }),
        }
    }

    /// Creates a client that gets its project and access tokens from the metadata server at
    /// `base_url`, for example `http://metadata.google.internal`.
    pub async fn from_metadata_server(base_url: &str) -> Result<Self, Error> {
        let http = reqwest::Client::new();
        let response = http
            .get(format!("{base_url}/computeMetadata/v1/project/project-id"))
            .header("Metadata-Flavor", "Google")
            .timeout(METADATA_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::ShipperReqwestError {
                context: "performing HTTP GET project id from metadata server".to_string(),
                source: e,
            })?;
        if !response.status().is_success() {
            return Err(get_error_response(response, "fetching project id".to_string()).await);
        }
        let project = response.text().await.map_err(|e| Error::ShipperReqwestError {
            context: "consuming response body of project id request".to_string(),
            source: e,
        })?;
        let project = project.trim();
        if project.is_empty() {
            return Err(Error::ProjectNotFound(
                "metadata server returned an empty project id".to_string(),
            ));
        }

        Ok(Self::new(
            project.to_string(),
            TokenSource::Metadata {
                base_url: base_url.to_string(),
            },
        ))
    }

    /// Sends requests to `api_base` instead of `https://logging.googleapis.com`.
    #[must_use]
    pub fn with_api_base<Str: Into<String>>(self, api_base: Str) -> Self {
        Client {
            api_base_url: api_base.into(),
            ..self
        }
    }

    /// The project log entries are written to.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// The full resource name of log `log_id`: `projects/{project}/logs/{log_id}`, with the log id
    /// percent-encoded.
    pub fn log_name(&self, log_id: &str) -> String {
        // form encoding writes spaces as '+' and a literal '+' as %2B
        let encoded = url::form_urlencoded::byte_serialize(log_id.as_bytes())
            .collect::<String>()
            .replace('+', "%20");
        format!("projects/{}/logs/{}", self.project, encoded)
    }

    /// A handle to write entries to log `log_id`.
    pub fn logger(&self, log_id: &str) -> CloudLogger {
        CloudLogger {
            name: log_id.to_string(),
            log_name: self.log_name(log_id),
            resource: MonitoredResource {
                type_: Some(GLOBAL_RESOURCE.to_string()),
                labels: None,
            },
            client: self.clone(),
        }
    }

    /// Builds a slog drain that ships to log `log_id` through this client.
    ///
    /// The bridge and shipper tasks are spawned on the current tokio runtime, so this has to be
    /// called from within one.
    #[cfg(feature = "shipper")]
    pub fn handler(&self, log_id: &str) -> Result<crate::logger::Logger, Error> {
        let runtime = tokio::runtime::Handle::try_current().map_err(Error::NoRuntime)?;
        let (drain, mut shipper) =
            crate::logger::Builder::new(&self.log_name(log_id), GLOBAL_RESOURCE)
                .build_with_async_shipper(self.clone());

        // The drain creates the entries and sends them over the sync channel, the bridge
        // forwards them to the async channel the shipper reads from.
        let bridge = shipper.yield_bridge();
        runtime.spawn_blocking(move || {
            bridge.run_sync_to_async_bridge();
        });
        runtime.spawn(async move {
            shipper.run_log_shipper().await;
        });

        Ok(drain)
    }

    /// Writes the entries of `body` with a single
    /// [entries.write](https://cloud.google.com/logging/docs/reference/v2/rest/v2/entries/write) call.
    pub async fn write_entries(&self, body: &WriteLogEntriesRequest) -> Result<(), Error> {
        let token = self.auth.access_token(&self.http).await?;
        let url = format!("{}/v2/entries:write", self.api_base_url);

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::ShipperReqwestError {
                context: "performing HTTP POST request to the Google Logging API".to_string(),
                source: e,
            })?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(get_error_response(
                response,
                "response when sending log entry to Google Logging API".to_string(),
            )
            .await)
        }
    }
}

/// A named log in a project, written to directly through its [`Client`].
#[derive(Clone, Debug)]
pub struct CloudLogger {
    name: String,
    log_name: String,
    resource: MonitoredResource,
    client: Client,
}

impl CloudLogger {
    /// The log id this logger was created with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full `projects/{project}/logs/{log_id}` name.
    pub fn full_name(&self) -> &str {
        &self.log_name
    }

    /// Writes `text` as a `textPayload` entry. `severity` is passed to the API as is.
    pub async fn log_text(&self, text: &str, severity: &str) -> Result<(), Error> {
        self.write(LogEntry {
            text_payload: Some(text.to_string()),
            ..self.entry(severity)
        })
        .await
    }

    /// Writes `payload` as a `jsonPayload` entry. Anything but a JSON object is wrapped in
    /// `{"message": payload}`.
    pub async fn log_struct(&self, payload: serde_json::Value, severity: &str) -> Result<(), Error> {
        let json_payload = match payload {
            serde_json::Value::Object(map) => map.into_iter().collect(),
            other => [("message".to_string(), other)].into_iter().collect(),
        };
        self.write(LogEntry {
            json_payload: Some(json_payload),
            ..self.entry(severity)
        })
        .await
    }

    fn entry(&self, severity: &str) -> LogEntry {
        LogEntry {
            log_name: Some(self.log_name.clone()),
            severity: Some(severity.to_string()),
            timestamp: Some(Utc::now()),
            resource: Some(self.resource.clone()),
            ..Default::default()
        }
    }

    async fn write(&self, entry: LogEntry) -> Result<(), Error> {
        let body = WriteLogEntriesRequest {
            log_name: Some(self.log_name.clone()),
            entries: Some(vec![entry]),
            ..Default::default()
        };
        self.client.write_entries(&body).await
    }
}
