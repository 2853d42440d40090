/// Application name
pub const APP_NAME: &str = "relay";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Payload key of the return slot an event can declare
pub const RETURN_KEY: &str = "return";

/// Environment variable overriding the configured log filter
pub const ENV_LOG: &str = "RELAY_LOG";

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "relay.toml";

/// Default log filter
pub const DEFAULT_LOG_LEVEL: &str = "info";
