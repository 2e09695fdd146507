use thiserror;

use reqwest::{self, StatusCode};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to read the 'default_labels' object from the JSON file, does it exist by this name?. Parse error: {0}")]
    DefaultLabelsError(serde_json::Error),
    #[error("Failed to read the 'resource_labels' object from the JSON file, does it exist by this name?. Parse error: {0}")]
    ResourceLabelsError(serde_json::Error),
    #[error("Could not read the service account key file '{path}'. Error: {source}")]
    CredentialsFileError {
        path: String,
        source: std::io::Error,
    },
    #[error("The service account key file '{path}' is not valid JSON. Parse error: {source}")]
    CredentialsParseError {
        path: String,
        source: serde_json::Error,
    },
    #[error("Unsupported credentials type '{0}', expected 'service_account'")]
    CredentialsTypeError(String),
    #[error("The service account private key could not be used for signing. Error: {0}")]
    PrivateKeyError(jsonwebtoken::errors::Error),
    #[error("No default credentials found: {0}")]
    NoDefaultCredentials(String),
    #[error("Could not determine the Google Cloud project: {0}")]
    ProjectNotFound(String),
    #[error("A tokio runtime is required to ship log entries. Error: {0}")]
    NoRuntime(tokio::runtime::TryCurrentError),
    #[error("Serde JSON serialization failed with context '{context}'. Error: {source}")]
    ShipperSerializeError {
        context: String,
        source: serde_json::Error,
    },
    #[error("Reqwest error with context '{context}'. Error: {source}")]
    ShipperReqwestError {
        context: String,
        source: reqwest::Error,
    },
    #[error("No 'access_token' found in the token response body")]
    ShipperTokenNotFound,
    #[error("No 'expires_in' found in the token response body")]
    ShipperTokenExpiryNotFound,
    #[error("unsuccessful HTTP response error with context '{context}'. HTTP status code: '{status}', body: '{body}'")]
    HttpResponseError {
        context: String,
        status: StatusCode,
        body: String,
    },
}

impl Error {
    /// A stable name for the kind of error, used when reporting failures without the full message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DefaultLabelsError(_) => "DefaultLabelsError",
            Self::ResourceLabelsError(_) => "ResourceLabelsError",
            Self::CredentialsFileError { .. } => "CredentialsFileError",
            Self::CredentialsParseError { .. } => "CredentialsParseError",
            Self::CredentialsTypeError(_) => "CredentialsTypeError",
            Self::PrivateKeyError(_) => "PrivateKeyError",
            Self::NoDefaultCredentials(_) => "NoDefaultCredentials",
            Self::ProjectNotFound(_) => "ProjectNotFound",
            Self::NoRuntime(_) => "NoRuntime",
            Self::ShipperSerializeError { .. } => "ShipperSerializeError",
            Self::ShipperReqwestError { .. } => "ShipperReqwestError",
            Self::ShipperTokenNotFound => "ShipperTokenNotFound",
            Self::ShipperTokenExpiryNotFound => "ShipperTokenExpiryNotFound",
            Self::HttpResponseError { .. } => "HttpResponseError",
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::ShipperReqwestError {
            context: "Error sending HTTP request".to_string(),
            source: err,
        }
    }
}
