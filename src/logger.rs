use tracing::{debug, level_filters::LevelFilter};
use tracing_subscriber::{
    fmt::format::{Format, Writer},
    EnvFilter,
};

struct MergeLogTimer;

impl tracing_subscriber::fmt::time::FormatTime for MergeLogTimer {
    fn format_time(&self, writer: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Local::now();
        write!(writer, "{} - {}", now.format("%d %B"), now.format("%H:%M:%S%.6f"))
    }
}

/// Installs the global subscriber that receives the engine's statement and
/// transaction logging. Directives from `RUST_LOG` stack on top of
/// `log_level`, so individual merge runs can be traced without recompiling.
pub fn setup_logger(log_level: LevelFilter) {
    let filter = EnvFilter::from_default_env().add_directive(log_level.into());

    let format = Format::default().with_timer(MergeLogTimer).with_level(true).with_target(false);

    let subscriber =
        tracing_subscriber::fmt().with_env_filter(filter).event_format(format).finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        debug!("Logger already installed, keeping the existing subscriber");
    }
}

/// Info-level logging: one line per merge run, no per-chunk detail.
pub fn setup_info_logger() {
    setup_logger(LevelFilter::INFO);
}
