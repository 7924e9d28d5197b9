use std::io::{stderr, IsTerminal};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable that overrides the log filter.
pub const LOG_ENV: &str = "TSH_LOG";

/// Install the tracing subscriber.
///
/// `TSH_LOG` wins when set; otherwise `-v` selects `debug` and the default
/// is `warn`, which keeps scripted output clean.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(stderr)
                .with_ansi(stderr().is_terminal())
                .with_target(false)
                .without_time()
                .compact(),
        )
        .init();
}
