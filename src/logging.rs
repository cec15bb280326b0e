use std::fs;
use tracing_subscriber::{filter::Directive, fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "whatnext_scraper=info";

/// Initializes the logging system with both console and file output.
///
/// Console lines are human readable; the daily rolling file under `logs/`
/// carries the same events as JSON.
pub fn init_logging() {
    let _ = fs::create_dir_all("logs");

    let file_appender = tracing_appender::rolling::daily("logs", "scraper.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stdout);

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = DEFAULT_DIRECTIVE.parse::<Directive>() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    // Keep the writer alive for the whole process so buffered lines are flushed.
    std::mem::forget(guard);
}
