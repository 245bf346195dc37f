use tracing::{Level, info};
use tracing_subscriber::{
    EnvFilter,
    fmt::{Layer, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Installs the global subscriber. File and line numbers are added at debug,
/// thread ids and names at trace. `NO_COLOR` turns off ANSI output.
pub fn init_tracing(log_level: Level) {
    let mut fmt_layer = Layer::new()
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(std::env::var("NO_COLOR").is_err());

    match log_level {
        Level::DEBUG => fmt_layer = fmt_layer.with_file(true).with_line_number(true),
        Level::TRACE => {
            fmt_layer = fmt_layer
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
        }
        _ => {}
    }

    tracing_subscriber::registry()
        .with(env_filter(log_level))
        .with(fmt_layer)
        .init();

    info!(
        event.name = "system.tracing_initialized",
        system.log_level = %log_level,
        "internal tracing and logging initialized"
    );
}

fn env_filter(log_level: Level) -> EnvFilter {
    let level = log_level.as_str().to_lowercase();
    EnvFilter::new(format!("warn,portblock={level},aya={level}"))
}
