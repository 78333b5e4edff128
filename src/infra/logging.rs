//! Subscriber setup for the binary. Logs go to stderr so `--json` output on
//! stdout stays machine-readable.

use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins when set; otherwise `warn`, or `debug` with `--verbose`.
pub fn init(verbose: bool, no_color: bool) {
    let default = if verbose { "dtacat=debug,info" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_ansi(!no_color)
        .compact()
        .finish();

    // Already set in tests
    let _ = tracing::subscriber::set_global_default(subscriber);
}
