//! Settings of the log manager: where they come from (command line, then environment, then
//! defaults) and the check that decides whether they are usable.
use crate::args;
use clap::ArgMatches;
use std::env;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_DISPLAY_NAME: &str = "gcpLogDemo";
pub const DEFAULT_CREDENTIALS_FILE: &str = "/etc/secrets/sa_key_lg.json";
pub const STANDARD_MODE: &str = "standard";

pub const DISPLAY_NAME_ENV: Arg = Arg::WithDefault("APP_DISPLAY_NAME", DEFAULT_DISPLAY_NAME);
pub const CREDENTIALS_FILE_ENV: Arg = Arg::WithDefault("LG_SA_KEY_JSON_FILE", DEFAULT_CREDENTIALS_FILE);
pub const LOGGER_NAME_ENV: Arg = Arg::NoDefault("GC_LOGGER_NAME");
pub const APP_LOG_ID_ENV: Arg = Arg::NoDefault("APP_LOG_ID");
pub const LOG_MODE_ENV: Arg = Arg::WithDefault("GC_LOG_MODE", STANDARD_MODE);

/// Created to define and use the environment variables in use by gcpLogDemo.
pub enum Arg {
    NoDefault(&'static str),
    WithDefault(&'static str, &'static str),
}

impl Arg {
    pub fn name(&self) -> &'static str {
        match self {
            Arg::NoDefault(name) | Arg::WithDefault(name, _) => name,
        }
    }

    fn default(&self) -> Option<String> {
        match self {
            Arg::NoDefault(_) => None,
            Arg::WithDefault(_, default) => Some(default.to_string()),
        }
    }

    /// The value of the variable, or the default when it is unset or empty.
    pub fn val(&self) -> Option<String> {
        env::var(self.name())
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| self.default())
    }

    /// Like [`val`](Arg::val) but an empty value is returned as is instead of the default.
    pub fn val_allow_empty(&self) -> Option<String> {
        env::var(self.name()).ok().or_else(|| self.default())
    }
}

/// How log entries reach Google Cloud Logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum LogMode {
    /// Through the application's logger, with the cloud handler installed into it
    Standard,
    /// With the Cloud Logging API, one write per entry
    Direct,
}

impl From<&str> for LogMode {
    fn from(mode: &str) -> Self {
        if mode == STANDARD_MODE {
            LogMode::Standard
        } else {
            LogMode::Direct
        }
    }
}

/// The configuration of the log manager. `None` stands for a setting that was not given at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    /// The service account key file, empty for the default credentials of the environment
    pub credentials_path: Option<String>,
    /// Refers to this application in the startup messages
    pub app_log_id: Option<String>,
    /// The Cloud Logging log id. Not checked here, the API enforces its naming rules.
    pub logger_name: Option<String>,
    pub log_mode: Option<LogMode>,
}

/// Everything the application needs at startup besides the HTTP address.
#[derive(Debug, Clone)]
pub struct Settings {
    pub display_name: String,
    pub log: LogConfig,
    pub startup_example: bool,
}

impl Settings {
    /// Command line values win over environment variables, which win over the defaults. The
    /// logger name and log id default to the display name.
    pub fn from_matches(m: &ArgMatches) -> Settings {
        let from = |flag: &str, env: &Arg| m.value_of(flag).map(String::from).or_else(|| env.val());

        let display_name =
            from(args::DISPLAY_NAME, &DISPLAY_NAME_ENV).unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());
        let credentials_path = m
            .value_of(args::CREDENTIALS_FILE)
            .map(String::from)
            .or_else(|| CREDENTIALS_FILE_ENV.val_allow_empty());

        Settings {
            log: LogConfig {
                credentials_path,
                app_log_id: from(args::APP_LOG_ID, &APP_LOG_ID_ENV).or_else(|| Some(display_name.clone())),
                logger_name: from(args::LOGGER_NAME, &LOGGER_NAME_ENV).or_else(|| Some(display_name.clone())),
                log_mode: from(args::LOG_MODE, &LOG_MODE_ENV).map(|mode| LogMode::from(mode.as_str())),
            },
            startup_example: m.value_of(args::STARTUP_EXAMPLE) != Some("false"),
            display_name,
        }
    }
}

/// Why a [`LogConfig`] is not usable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required setting '{0}' is missing")]
    Missing(&'static str),
    #[error("credentials file '{0}' does not exist or is not a readable file")]
    CredentialsFile(String),
}

impl ConfigError {
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigError::Missing(_) => "MissingSetting",
            ConfigError::CredentialsFile(_) => "CredentialsFileNotReadable",
        }
    }
}

/// Checks that all settings are present and that the credentials file, unless empty, is a regular
/// file we can open. An empty path always passes, the client checks the default credentials itself.
pub fn check(config: &LogConfig) -> Result<(), ConfigError> {
    let credentials_path = config
        .credentials_path
        .as_deref()
        .ok_or(ConfigError::Missing("credentials_path"))?;
    if config.app_log_id.is_none() {
        return Err(ConfigError::Missing("app_log_id"));
    }
    if config.log_mode.is_none() {
        return Err(ConfigError::Missing("log_mode"));
    }
    if config.logger_name.is_none() {
        return Err(ConfigError::Missing("logger_name"));
    }

    if credentials_path.is_empty() || is_readable_file(Path::new(credentials_path)) {
        Ok(())
    } else {
        Err(ConfigError::CredentialsFile(credentials_path.to_string()))
    }
}

#[cfg(test)]
pub fn validate(config: &LogConfig) -> bool {
    check(config).is_ok()
}

fn is_readable_file(path: &Path) -> bool {
    path.is_file() && File::open(path).is_ok()
}
