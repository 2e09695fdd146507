use crate::args;
use crate::domain::logging::{Handler, LogSink};

use args::{LOG_LEVEL, VERBOSITY};
use clap::ArgMatches;
use slog::{crit, debug, error, info, o, trace, warn, Drain, Duplicate, Level, Logger, Never, OwnedKVList, Record};
use slog_async::Async;
use slog_term::{CompactFormat, TermDecorator};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::{fmt::Display, result::Result};

/// The level installed handlers start at. Log mode standard lowers it to info.
pub const DEFAULT_HANDLER_LEVEL: Level = Level::Warning;

#[derive(Clone)]
struct FallbackToStderr<D: Drain> {
    drain: D,
}

impl<D: Drain> Drain for FallbackToStderr<D>
where
    D::Err: Display,
{
    type Ok = ();
    type Err = ();
    fn log(&self, record: &Record, logger_values: &OwnedKVList) -> Result<(), ()> {
        if let Err(err) = self.drain.log(record, logger_values) {
            eprint!("A drain could not log to its destination: {}", err);
        }
        Ok(())
    }

    #[inline]
    fn is_enabled(&self, level: Level) -> bool {
        self.drain.is_enabled(level)
    }
}

/// The drain that handlers get installed into after startup. Passes records at or above its
/// minimum level to every handler.
#[derive(Clone)]
pub struct HandlerSlot {
    inner: Arc<Slot>,
}

struct Slot {
    handlers: RwLock<Vec<Handler>>,
    min_level: AtomicUsize,
}

impl HandlerSlot {
    pub fn new(min_level: Level) -> Self {
        HandlerSlot {
            inner: Arc::new(Slot {
                handlers: RwLock::new(vec![]),
                min_level: AtomicUsize::new(min_level.as_usize()),
            }),
        }
    }

    fn min_level(&self) -> Level {
        Level::from_usize(self.inner.min_level.load(Ordering::Relaxed)).unwrap_or(DEFAULT_HANDLER_LEVEL)
    }

    fn len(&self) -> usize {
        self.inner.handlers.read().map(|h| h.len()).unwrap_or(0)
    }
}

impl Drain for HandlerSlot {
    type Ok = ();
    type Err = Never;

    fn log(&self, record: &Record, values: &OwnedKVList) -> Result<(), Never> {
        if !record.level().is_at_least(self.min_level()) {
            return Ok(());
        }
        if let Ok(handlers) = self.inner.handlers.read() {
            for handler in handlers.iter() {
                handler.log(record, values)?;
            }
        }
        Ok(())
    }
}

/// The application logger seen as a [`LogSink`]: messages go to the terminal and to whatever
/// handlers were installed.
#[derive(Clone)]
pub struct StandardSink {
    log: Logger,
    slot: HandlerSlot,
}

impl StandardSink {
    fn new(log: Logger, slot: HandlerSlot) -> Self {
        StandardSink { log, slot }
    }

    /// The number of installed handlers.
    pub fn handler_count(&self) -> usize {
        self.slot.len()
    }
}

impl LogSink for StandardSink {
    fn install(&self, handler: Handler) {
        if let Ok(mut handlers) = self.slot.inner.handlers.write() {
            handlers.push(handler);
        }
    }

    fn clear(&self) {
        if let Ok(mut handlers) = self.slot.inner.handlers.write() {
            handlers.clear();
        }
        self.set_min_level(DEFAULT_HANDLER_LEVEL);
    }

    fn set_min_level(&self, level: Level) {
        self.slot.inner.min_level.store(level.as_usize(), Ordering::Relaxed);
    }

    fn emit(&self, level: Level, message: &str) {
        match level {
            Level::Critical => crit!(self.log, "{}", message),
            Level::Error => error!(self.log, "{}", message),
            Level::Warning => warn!(self.log, "{}", message),
            Level::Info => info!(self.log, "{}", message),
            Level::Debug => debug!(self.log, "{}", message),
            Level::Trace => trace!(self.log, "{}", message),
        }
    }
}

fn min_log_level(arg_matches: &ArgMatches) -> Result<Level, String> {
    let min_log_level = match arg_matches.occurrences_of(VERBOSITY) {
        0 => Level::Warning,
        1 => Level::Info,
        2 => Level::Debug,
        _ => Level::Trace,
    };

    Ok(match arg_matches.value_of(LOG_LEVEL) {
        Some(level) => match level
            .parse::<args::LogLevelType>()
            .map_err(|e| format!("invalid log level '{}': {}", level, e))?
        {
            args::LogLevelType::error => Level::Error,
            args::LogLevelType::warn => Level::Warning,
            args::LogLevelType::info => Level::Info,
            args::LogLevelType::debug => Level::Debug,
            args::LogLevelType::trace => Level::Trace,
        },
        None => min_log_level,
    })
}

/// Creates the root logger: the terminal, filtered by `-v` or `--log-level`, duplicated into a
/// [`HandlerSlot`] that cloud handlers can be installed into later.
pub fn create_logger(arg_matches: &ArgMatches) -> Result<(Logger, StandardSink), String> {
    let min_log_level = min_log_level(arg_matches)?;

    let decorator = TermDecorator::new().force_color().build();
    let term_drain = CompactFormat::new(decorator)
        .build()
        .filter_level(min_log_level)
        .map(|drain| FallbackToStderr { drain })
        .fuse();

    let slot = HandlerSlot::new(DEFAULT_HANDLER_LEVEL);
    let both = Duplicate::new(term_drain, slot.clone()).fuse();
    let drain = Async::new(both).build().fuse();

    let root = Logger::root(drain, o!());
    let sink = StandardSink::new(root.new(o!("module" => "app")), slot);
    Ok((root, sink))
}
