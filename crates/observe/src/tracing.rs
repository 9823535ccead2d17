use {
    std::sync::Once,
    time::macros::format_description,
    tracing_subscriber::{
        EnvFilter,
        Layer,
        fmt::time::UtcTime,
        prelude::*,
        util::SubscriberInitExt,
    },
};

/// Initializes the tracing subscriber shared between the binaries.
/// `env_filter` has similar syntax to env_logger, documented at
/// https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html
pub fn initialize(env_filter: &str, use_json_format: bool) {
    set_tracing_subscriber(env_filter, use_json_format);
}

/// Like [`initialize`], but can be called multiple times in a row. Later
/// calls are ignored.
///
/// Useful for tests.
pub fn initialize_reentrant(env_filter: &str) {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        set_tracing_subscriber(env_filter, false);
    });
}

fn set_tracing_subscriber(env_filter: &str, use_json_format: bool) {
    let timer = UtcTime::new(format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    ));
    let filter = EnvFilter::new(env_filter);
    if use_json_format {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_timer(timer)
                    .json()
                    .with_filter(filter),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_timer(timer)
                    .with_filter(filter),
            )
            .init();
    }
}
