use tracing::{debug, level_filters::LevelFilter};
use tracing_subscriber::{
    filter::Directive,
    fmt::format::{Format, Writer},
    EnvFilter,
};

/// Crate name as it shows up in `RUST_LOG` directives.
pub const LOG_TARGET: &str = "pgbulk";

struct StatementTimer;

impl tracing_subscriber::fmt::time::FormatTime for StatementTimer {
    fn format_time(&self, writer: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Local::now();
        write!(writer, "{}", now.format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Installs a global subscriber logging this crate at `log_level` and everything else at warn.
///
/// `RUST_LOG` is read first, so `RUST_LOG=tokio_postgres=debug` still works. At debug level
/// every statement is printed before it runs.
pub fn setup_logger(log_level: LevelFilter) {
    let crate_directive: Directive = format!("{}={}", LOG_TARGET, log_level)
        .parse()
        .unwrap_or_else(|_| log_level.into());

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy()
        .add_directive(crate_directive);

    let format = Format::default().with_timer(StatementTimer).with_level(true).with_target(true);

    let subscriber =
        tracing_subscriber::fmt().with_env_filter(filter).event_format(format).finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        debug!("Logger has already been set up, continuing...");
    }
}

pub fn setup_info_logger() {
    setup_logger(LevelFilter::INFO);
}
