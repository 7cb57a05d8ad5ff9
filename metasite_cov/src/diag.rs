use std::fmt;

use log::Level;

/// Sink for progress and warning messages from the pipeline stages
pub trait Diagnostics: Sync {
    fn emit(&self, level: Level, args: fmt::Arguments<'_>);

    fn warn(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Warn, args)
    }
    fn info(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Info, args)
    }
    fn debug(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Debug, args)
    }
    fn trace(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Trace, args)
    }
}

/// Forwards messages to the log facade (set up by utils::init_log)
pub struct LogSink;

impl Diagnostics for LogSink {
    fn emit(&self, level: Level, args: fmt::Arguments<'_>) {
        log!(level, "{}", args)
    }
}
