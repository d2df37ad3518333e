use colored::{ColoredString, Colorize};
use log::{Level, LevelFilter, Metadata, Record};

/// Logger for the whole process. Plain lines for info, labelled lines for
/// everything else, and source locations once `--verbose` is on. Always
/// writes to stderr so `probe` can keep stdout for its JSON.
struct Logger;

static LOGGER: Logger = Logger;

pub fn init(verbose: bool) {
    log::set_logger(&LOGGER).expect("logger is initialized once");
    log::set_max_level(if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        if log::max_level() >= LevelFilter::Debug {
            let location = match (record.file(), record.line()) {
                (Some(file), Some(line)) => format!("[{file}:{line}]"),
                _ => "[unk]".to_owned(),
            };

            eprintln!(
                "{} {} {}",
                label(record.level()),
                location.dimmed(),
                record.args()
            );
        } else if record.level() == Level::Info {
            eprintln!("{}", record.args());
        } else {
            eprintln!("{} {}", label(record.level()), record.args());
        }
    }

    fn flush(&self) {}
}

fn label(level: Level) -> ColoredString {
    match level {
        Level::Debug => "[DEBUG]".bold().blue(),
        Level::Error => "[ERROR]".bold().red(),
        Level::Info => "[INFO]".bold().green(),
        Level::Trace => "[TRACE]".bold().purple(),
        Level::Warn => "[WARN]".bold().yellow(),
    }
}
