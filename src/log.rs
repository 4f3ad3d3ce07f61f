use log::{LevelFilter, Log, Metadata, Record};
use once_cell::sync::Lazy;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError, RwLock};

/// Global logger. Front-ends may replace the active logger at any time
/// (for example, to redirect records into a console printer).
pub static LOGGER_SWITCHER: Lazy<LoggerSwitcher> = Lazy::new(LoggerSwitcher::default);

#[derive(Default)]
pub struct LoggerSwitcher {
    logger: RwLock<Option<Box<dyn Log>>>,
}

impl LoggerSwitcher {
    /// Install `logger` as the active logger with a `filter` max level.
    pub fn switch(&'static self, logger: impl Log + 'static, filter: LevelFilter) {
        if let Ok(mut active) = self.logger.write() {
            *active = Some(Box::new(logger));
        }
        // only the first call registers the switcher itself, later calls just swap the inner logger
        _ = log::set_logger(self);
        log::set_max_level(filter);
    }
}

impl Log for LoggerSwitcher {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.logger
            .read()
            .map(|l| l.as_ref().map(|l| l.enabled(metadata)).unwrap_or(false))
            .unwrap_or(false)
    }

    fn log(&self, record: &Record) {
        if let Ok(logger) = self.logger.read() {
            if let Some(logger) = logger.as_ref() {
                logger.log(record)
            }
        }
    }

    fn flush(&self) {
        if let Ok(logger) = self.logger.read() {
            if let Some(logger) = logger.as_ref() {
                logger.flush()
            }
        }
    }
}

/// Logger sending messages of one log target into a channel, other records
/// go to the inner logger.
///
/// Used to receive server notices, which the driver reports as log records.
pub struct ForwardingLogger<L: Log> {
    inner: L,
    target: &'static str,
    tx: Mutex<Sender<String>>,
}

impl<L: Log> ForwardingLogger<L> {
    pub fn new(inner: L, target: &'static str) -> (Self, Receiver<String>) {
        let (tx, rx) = mpsc::channel();
        let logger = Self {
            inner,
            target,
            tx: Mutex::new(tx),
        };
        (logger, rx)
    }
}

impl<L: Log> Log for ForwardingLogger<L> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.target() == self.target || self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if record.target() == self.target {
            let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
            _ = tx.send(record.args().to_string());
        }
        if self.inner.enabled(record.metadata()) {
            self.inner.log(record);
        }
    }

    fn flush(&self) {
        self.inner.flush()
    }
}
