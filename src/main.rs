#[macro_use]
extern crate lazy_static;

extern crate clap;

mod app;
mod args;
mod config;
mod domain;
mod form;
mod http;
mod infra;
mod logging;
mod manager;
mod metrics;

use clap::ArgMatches;
use config::Settings;
use infra::GoogleConnector;
use logging::StandardSink;
use manager::{InitStatus, LogManager};
use slog::*;
use std::{process, result::Result, sync::Arc};

#[derive(PartialEq)]
struct ExitSignal(pub &'static str);

async fn listen_for_signals() -> Result<ExitSignal, String> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term_sig = signal(SignalKind::terminate())
            .map_err(|e| format!("could not listen for TERM signals: {}", e))?;
        let mut int_sig = signal(SignalKind::interrupt())
            .map_err(|e| format!("Could not listen for INT signal: {}", e))?;
        let mut hup_sig = signal(SignalKind::hangup())
            .map_err(|e| format!("Could not listen for HUP signal: {}", e))?;

        let sig_name = tokio::select! {
            Some(_signal) = term_sig.recv() => {
                "SIG_TERM"
            },
            Some(_signal) = int_sig.recv() => {
                "SIG_INT"
            },
            Some(_signal) = hup_sig.recv() => {
                "SIG_HUP"
            },
        };
        Ok(ExitSignal(sig_name))
    }

    #[cfg(windows)]
    {
        use tokio::signal;
        signal::ctrl_c()
            .await
            .map_err(|e| format!("could not listen for ctrl-c: {}", e))?;
        Ok(ExitSignal("CTRL-C"))
    }
}

// Sets up Cloud Logging from the settings. Failures are logged and reported in the outcome but
// never stop the web form from being served.
async fn create_log_manager(log: &Logger, sink: &StandardSink, settings: &Settings) -> LogManager {
    let mut manager = LogManager::new(
        log.new(o!("module" => "manager")),
        Box::new(GoogleConnector::new()),
        Arc::new(sink.clone()),
    );

    let outcome = manager.initialize(&settings.log).await;
    match outcome.status {
        InitStatus::Initialized => info!(log, "Google Cloud Logging initialized";
            "standard-mode" => manager.standard_mode(),
            "cloud-log" => manager.logger_name(),
            "cloud-handlers" => sink.handler_count(),
        ),
        status => warn!(log, "Google Cloud Logging not fully initialized, entries may not reach it";
            "status" => %status,
            "failures" => outcome.failures.len(),
        ),
    }

    if settings.startup_example && manager.has_logger() {
        if let Err(e) = manager.log_startup_example().await {
            error!(log, "Could not write the startup example entries: {}", e; "class" => e.kind());
        }
    }
    manager
}

async fn main_task(
    arg_matches: &ArgMatches,
    log: &Logger,
    manager: Arc<LogManager>,
    settings: &Settings,
) -> Result<ExitSignal, String> {
    let (shutdown_sender, http_receiver) = tokio::sync::broadcast::channel(1);
    let (http_done_sender, mut shutdown_done_received) = tokio::sync::mpsc::channel(1);

    let addr = arg_matches
        .value_of(args::HTTP_BIND_ADDRESS)
        .ok_or("missing HTTP address")?
        .to_string();
    let handler =
        http::HttpHandler::new(log.new(o!("module" => "http")), manager, &settings.display_name);
    let http_log = log.clone();
    tokio::spawn(async move {
        if let Err(e) = http::start(&http_log, &addr, handler, http_receiver, http_done_sender).await {
            error!(http_log, "HTTP Server error: {}", e)
        }
    });

    let signal = listen_for_signals().await?;
    info!(log, "Received signal {}, shutting down...", signal.0);

    drop(shutdown_sender);

    // When every sender has gone out of scope, the recv call
    // will return with an error. We ignore the error.
    let _ = shutdown_done_received.recv().await;

    Ok(signal)
}

async fn run(arg_matches: ArgMatches) -> Result<(), String> {
    let (root_logger, sink) = logging::create_logger(&arg_matches)?;
    let log = root_logger.new(o!("module" => "main"));

    let settings = Settings::from_matches(&arg_matches);
    info!(log, "Starting {}.", app::NAME;
        "version" => app::VERSION,
        "slog-google-version" => app::slog_google_version(),
        "http-address" => arg_matches.value_of(args::HTTP_BIND_ADDRESS),
        "display-name" => &settings.display_name,
        "log-mode" => settings.log.log_mode.map(|m| m.to_string()),
        "logger-name" => &settings.log.logger_name,
    );

    let manager = Arc::new(create_log_manager(&root_logger, &sink, &settings).await);

    // We wait for a signal (HUP, INT, TERM). If the signal is a HUP,
    // we restart the HTTP service, otherwise we exit the loop and the program ends.
    while main_task(&arg_matches, &log, manager.clone(), &settings).await? == ExitSignal("SIG_HUP") {
        info!(log, "Received SIG_HUP, restarting");
    }
    info!(log, "Exiting...");
    Ok(())
}

#[tokio::main]
async fn main() {
    #[cfg(feature = "tokio_console")]
    {
        console_subscriber::ConsoleLayer::builder()
            // set the address the server is bound to
            .server_addr(([127, 0, 0, 1], 6669))
            .init();
    }

    let arg_matches = args::clap_app().get_matches();
    if let Err(e) = run(arg_matches).await {
        eprintln!("\nError: {}", e);
        process::exit(1);
    };
}
