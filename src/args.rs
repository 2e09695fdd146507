use crate::app;
use clap::{Arg, Command};
use strum::VariantNames;

pub const VERBOSITY: &str = "verbose";
pub const LOG_LEVEL: &str = "log-level";
pub const HTTP_BIND_ADDRESS: &str = "bind-address-http";
pub const DISPLAY_NAME: &str = "display-name";
pub const CREDENTIALS_FILE: &str = "gc-credentials-file";
pub const LOGGER_NAME: &str = "gc-logger-name";
pub const APP_LOG_ID: &str = "app-log-id";
pub const LOG_MODE: &str = "gc-log-mode";
pub const STARTUP_EXAMPLE: &str = "startup-example";

#[derive(strum_macros::EnumString, strum_macros::VariantNames, Debug, Clone, Copy)]
#[strum(serialize_all = "lowercase")]
#[allow(non_camel_case_types)]
pub enum LogLevelType {
    error,
    warn,
    info,
    debug,
    trace,
}

pub(crate) fn clap_app() -> Command<'static> {
    Command::new(app::NAME)
        .version(app::VERSION)
        .long_version(app::long_version())
        .about("A web form that sends log entries to Google Cloud Logging")
        .author("The gcpLogDemo team")
        .arg(
            Arg::new(VERBOSITY)
                .short('v')
                .multiple_occurrences(true)
                .help("verbosity level"),
        )
        .arg(
            Arg::new(LOG_LEVEL)
                .long(LOG_LEVEL)
                .value_name("LEVEL")
                .help("Sets the minimum level of the terminal log, overrides -v")
                .possible_values(LogLevelType::VARIANTS.iter().copied())
                .env("GLD_LOG_LEVEL")
                .takes_value(true),
        )
        .arg(
            Arg::new(HTTP_BIND_ADDRESS)
                .long(HTTP_BIND_ADDRESS)
                .value_name("HOST_PORT")
                .help("Sets the host and port for the HTTP server serving the form, health and metrics endpoints")
                .default_value("0.0.0.0:8080")
                .env("GLD_HTTP_ADDRESS")
                .takes_value(true),
        )
        .arg(
            Arg::new(DISPLAY_NAME)
                .long(DISPLAY_NAME)
                .value_name("NAME")
                .help("The application name shown on the web page and the default for the log id and logger name [env: APP_DISPLAY_NAME]")
                .takes_value(true),
        )
        .arg(
            Arg::new(CREDENTIALS_FILE)
                .long(CREDENTIALS_FILE)
                .value_name("JSON_FILE")
                .help("The service account key file for Google Cloud Logging, empty to use the default credentials of the environment [env: LG_SA_KEY_JSON_FILE]")
                .takes_value(true),
        )
        .arg(
            Arg::new(LOGGER_NAME)
                .long(LOGGER_NAME)
                .value_name("NAME")
                .help("The Google Cloud log to write to, must follow the Cloud Logging log name constraints [env: GC_LOGGER_NAME]")
                .takes_value(true),
        )
        .arg(
            Arg::new(APP_LOG_ID)
                .long(APP_LOG_ID)
                .value_name("ID")
                .help("Refers to this application in log messages [env: APP_LOG_ID]")
                .takes_value(true),
        )
        .arg(
            Arg::new(LOG_MODE)
                .long(LOG_MODE)
                .value_name("MODE")
                .help("'standard' sends entries through the application logger, anything else writes them to Cloud Logging directly [env: GC_LOG_MODE]")
                .takes_value(true),
        )
        .arg(
            Arg::new(STARTUP_EXAMPLE)
                .long(STARTUP_EXAMPLE)
                .value_name("BOOL")
                .help("Whether to write a few example entries on startup")
                .possible_values(["true", "false"])
                .default_value("true")
                .env("GC_LOG_STARTUP_EXAMPLE")
                .takes_value(true),
        )
}
