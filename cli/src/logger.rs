use console::Style;
use log::{Level, LevelFilter, Log, Metadata, Record};

struct StderrLogger;
static STDERR_LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(
        &self,
        metadata: &Metadata<'_>,
    ) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(
        &self,
        record: &Record<'_>,
    ) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let style = match record.level() {
            Level::Error => Style::new().red().bold(),
            Level::Warn => Style::new().yellow(),
            Level::Info => Style::new().green(),
            Level::Debug | Level::Trace => Style::new().dim(),
        };
        eprintln!(
            "{} {}",
            style.apply_to(format!("{:>5}", record.level())),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// Installs the stderr logger. `verbose` lowers the threshold to debug.
pub fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let _ = log::set_logger(&STDERR_LOGGER).map(|_| log::set_max_level(level));
}
