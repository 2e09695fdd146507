use std::fmt;
use std::path::Path;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::Error;

/// The OAuth scope needed to write log entries.
pub const LOGGING_WRITE_SCOPE: &str = "https://www.googleapis.com/auth/logging.write";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

// Environment variable specifying the GCE metadata hostname.
const METADATA_HOST_VAR: &str = "GCE_METADATA_HOST";
const METADATA_HOST: &str = "metadata.google.internal";

/// The base URL of the metadata server, honouring `GCE_METADATA_HOST`.
pub fn metadata_base_url() -> String {
    let host = std::env::var(METADATA_HOST_VAR)
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| METADATA_HOST.to_string());
    format!("http://{host}")
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The parts of a service account key file needed to obtain access tokens.
#[derive(Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub key_type: String,
    pub project_id: String,
    pub client_email: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("key_type", &self.key_type)
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    /// Reads and parses a service account key file as downloaded from the Google Cloud console.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| Error::CredentialsFileError {
            path: path.display().to_string(),
            source: e,
        })?;
        let key: ServiceAccountKey =
            serde_json::from_str(&contents).map_err(|e| Error::CredentialsParseError {
                path: path.display().to_string(),
                source: e,
            })?;
        if key.key_type != "service_account" {
            return Err(Error::CredentialsTypeError(key.key_type));
        }
        Ok(key)
    }

    fn encoding_key(&self) -> Result<EncodingKey, Error> {
        EncodingKey::from_rsa_pem(self.private_key.as_bytes()).map_err(Error::PrivateKeyError)
    }
}

/// Where access tokens come from.
#[derive(Clone)]
pub(crate) enum TokenSource {
    ServiceAccount {
        client_email: String,
        key_id: Option<String>,
        token_uri: String,
        key: EncodingKey,
    },
    Metadata {
        base_url: String,
    },
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenSource::ServiceAccount {
                client_email,
                token_uri,
                ..
            } => f
                .debug_struct("ServiceAccount")
                .field("client_email", client_email)
                .field("token_uri", token_uri)
                .finish_non_exhaustive(),
            TokenSource::Metadata { base_url } => f
                .debug_struct("Metadata")
                .field("base_url", base_url)
                .finish(),
        }
    }
}

impl TokenSource {
    pub(crate) fn service_account(key: &ServiceAccountKey) -> Result<Self, Error> {
        Ok(TokenSource::ServiceAccount {
            client_email: key.client_email.clone(),
            key_id: key.private_key_id.clone(),
            token_uri: key.token_uri.clone(),
            key: key.encoding_key()?,
        })
    }
}

pub(crate) async fn get_error_response(response: Response, context: String) -> Error {
    let status = response.status();

    let body = match response.bytes().await {
        Ok(bytes) => match serde_json::from_slice::<String>(&bytes) {
            Ok(json) => json,
            Err(_) => String::from_utf8_lossy(&bytes).to_string(),
        },
        Err(e) => format!("could not decode body of HTTP Error response: {e}"),
    };

    Error::HttpResponseError {
        context,
        status,
        body,
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Token caching
#[derive(Default)]
struct Token {
    token: Option<String>,
    renew_after: DateTime<Utc>,
}

impl Token {
    fn renew_after_from_expires_in(expires_in: u64) -> DateTime<Utc> {
        let renew_after = TimeDelta::seconds(expires_in.saturating_sub(60) as i64);
        Utc::now() + renew_after
    }

    fn current(&self) -> Option<String> {
        match &self.token {
            Some(token) if Utc::now() < self.renew_after => Some(token.clone()),
            _ => None,
        }
    }

    fn store(&mut self, body: &str) -> Result<String, Error> {
        let token_data: serde_json::Value =
            serde_json::from_str(body).map_err(|e| Error::ShipperSerializeError {
                context: "deserializing token data".to_string(),
                source: e,
            })?;
        let token_str = token_data["access_token"]
            .as_str()
            .ok_or(Error::ShipperTokenNotFound)?
            .to_string();
        let expires_in = token_data["expires_in"]
            .as_u64()
            .ok_or(Error::ShipperTokenExpiryNotFound)?;
        self.token = Some(token_str.clone());
        self.renew_after = Self::renew_after_from_expires_in(expires_in);
        Ok(token_str)
    }
}

/// Hands out access tokens for a [`TokenSource`], fetching a new one shortly before the cached one
/// expires.
#[derive(Debug)]
pub(crate) struct Authenticator {
    source: TokenSource,
    token: Mutex<Token>,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("cached", &self.token.is_some())
            .field("renew_after", &self.renew_after)
            .finish()
    }
}

impl Authenticator {
    pub(crate) fn new(source: TokenSource) -> Self {
        Authenticator {
            source,
            token: Mutex::new(Token::default()),
        }
    }

    pub(crate) async fn access_token(&self, client: &Client) -> Result<String, Error> {
        let mut token = self.token.lock().await;
        if let Some(current) = token.current() {
            return Ok(current);
        }

        let response = match &self.source {
            TokenSource::Metadata { base_url } => {
                fetch_metadata_token(client, base_url).await?
            }
            TokenSource::ServiceAccount {
                client_email,
                key_id,
                token_uri,
                key,
            } => fetch_service_account_token(client, client_email, key_id, token_uri, key).await?,
        };

        if response.status().is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| Error::ShipperReqwestError {
                    context: "consuming response body of access token request".to_string(),
                    source: e,
                })?;
            token.store(&body)
        } else {
            Err(get_error_response(response, "fetching token".to_string()).await)
        }
    }
}

async fn fetch_metadata_token(client: &Client, base_url: &str) -> Result<Response, Error> {
    client
        .get(format!(
            "{base_url}/computeMetadata/v1/instance/service-accounts/default/token"
        ))
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(|e| Error::ShipperReqwestError {
            context: "performing HTTP GET token credentials from metadata server".to_string(),
            source: e,
        })
}

async fn fetch_service_account_token(
    client: &Client,
    client_email: &str,
    key_id: &Option<String>,
    token_uri: &str,
    key: &EncodingKey,
) -> Result<Response, Error> {
    let iat = Utc::now().timestamp();
    let claims = Claims {
        iss: client_email,
        scope: LOGGING_WRITE_SCOPE,
        aud: token_uri,
        iat,
        exp: iat + ASSERTION_LIFETIME_SECS,
    };
    let mut header = Header::new(Algorithm::RS256);
    header.kid = key_id.clone();
    let assertion = jsonwebtoken::encode(&header, &claims, key).map_err(Error::PrivateKeyError)?;

    let body = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("grant_type", JWT_BEARER_GRANT)
        .append_pair("assertion", &assertion)
        .finish();

    client
        .post(token_uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(body)
        .send()
        .await
        .map_err(|e| Error::ShipperReqwestError {
            context: "performing HTTP POST token exchange for service account".to_string(),
            source: e,
        })
}
