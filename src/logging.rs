use tracing_subscriber::EnvFilter;

/// Install a `tracing` fmt subscriber writing to stderr.
///
/// `RUST_LOG` wins when set; otherwise 0 → warn, 1 → info, 2+ → debug.
/// Calling this more than once is harmless: later calls are ignored.
pub fn init(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("apportion={level}")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
