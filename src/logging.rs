use std::{path::PathBuf, sync::Once};

use tracing::{info, metadata::LevelFilter, Level};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Wire up tracing output.
///
/// Stdout always gets the stream at `stdout_level`. When `file_logging`
/// is given, a daily-rolling `gateway.log` in that directory receives it
/// too, at its own level and without ANSI colors. Only the first call
/// does anything, so tests can call this as often as they like.
pub fn init(stdout_level: Level, file_logging: Option<(Level, PathBuf)>) {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let stdout = fmt::layer().with_filter(LevelFilter::from_level(stdout_level));

        let file = file_logging.map(|(level, directory)| {
            fmt::layer()
                .with_writer(rolling::daily(directory, "gateway.log"))
                .with_ansi(false)
                .with_filter(LevelFilter::from_level(level))
        });

        tracing_subscriber::registry()
            .with(stdout)
            .with(file)
            .init();

        info!("Logging initialized");
    });
}
