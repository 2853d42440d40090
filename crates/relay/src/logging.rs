use relay_core::RelayConfig;
use tracing_log::LogTracer;
use tracing_subscriber::EnvFilter;

/// Route `log` records from relay-core into a stderr `fmt` subscriber.
///
/// The filter is `RELAY_LOG` when set, otherwise the configured `log_level`.
/// Installing twice is reported, not fatal.
pub fn init(config: &RelayConfig) {
    if let Err(e) = LogTracer::init() {
        eprintln!("Failed to bridge log records: {}", e);
        return;
    }

    let filter = EnvFilter::try_new(config.log_filter()).unwrap_or_else(|e| {
        eprintln!("Invalid log filter '{}': {}", config.log_filter(), e);
        EnvFilter::new(relay_core::kernel::constants::DEFAULT_LOG_LEVEL)
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install tracing subscriber: {}", e);
    }
}
