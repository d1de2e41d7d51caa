use log::{Level, LevelFilter, Log, Metadata, Record};

/// Prints records on stdout as `info: ...` or `warning [target]: ...`.
struct StdoutLogger;

static LOGGER: StdoutLogger = StdoutLogger;

impl Log for StdoutLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = record.args().to_string();
        println!("{}", format_record(record.level(), record.target(), &message));
    }

    fn flush(&self) {}
}

fn format_record(level: Level, target: &str, message: &str) -> String {
    // module paths are noise on the command line, explicit targets are not
    let target = if target.starts_with("footing") {
        None
    } else {
        Some(target)
    };

    let label = match level {
        Level::Error => "error",
        Level::Warn => "warning",
        Level::Info => return format!("info: {message}"),
        Level::Debug => "debug",
        Level::Trace => "trace",
    };

    match target {
        Some(t) => format!("{label} [{t}]: {message}"),
        None => format!("{label}: {message}"),
    }
}

/// Installs the stdout logger. Calling it twice is harmless.
///
/// # Arguments
/// * `verbose` - Whether debug records should be printed
pub fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
