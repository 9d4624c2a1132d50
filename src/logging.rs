use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise the crate logs at `debug` or `info`
/// depending on `debug`.
pub fn init(debug: bool, json: bool) {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gateway_pipeline={level},warn")));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(debug);

    // A subscriber may already be installed (tests, embedding binaries).
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
