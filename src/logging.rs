use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing with a compact stderr layer.
///
/// - Default level: `warn`, or `info,expense_tracker=debug` with `--verbose`
/// - `RUST_LOG` overrides either default
/// - Output goes to stderr so command output on stdout stays clean
pub fn init(verbose: bool) {
    let default_filter = if verbose {
        "info,expense_tracker=debug"
    } else {
        "warn"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .compact();

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init();

    tracing::debug!("Tracing initialized");
}
