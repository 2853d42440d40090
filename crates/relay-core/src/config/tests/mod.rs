use std::io::Write;
use std::path::Path;

use serde_json::json;
use tempfile::{Builder, tempdir};

use crate::config::{ConfigError, ConfigFormat, RelayConfig};
use crate::event::{InterfaceManager, SubscriberInterface, SubscriptionSpec};

fn sample() -> RelayConfig {
    let mut config = RelayConfig {
        log_level: "debug".to_string(),
        drain_on_shutdown: false,
        ..RelayConfig::default()
    };
    config.subscriptions.insert("bootstrap".to_string(), json!("log"));
    config
        .subscriptions
        .insert("output".to_string(), json!([["stamp", 10], ["reply", true]]));
    config.defaults.insert("env".to_string(), json!("test"));
    config
}

#[test]
fn test_defaults() {
    let config = RelayConfig::default();
    assert_eq!(config.log_level, "info");
    assert!(config.drain_on_shutdown);
    assert!(config.subscriptions.is_empty());
    assert!(config.defaults.is_empty());
}

#[test]
fn test_format_from_path() {
    assert_eq!(ConfigFormat::from_path(Path::new("relay.json")), Some(ConfigFormat::Json));
    assert_eq!(ConfigFormat::from_path(Path::new("relay.JSON")), Some(ConfigFormat::Json));
    assert_eq!(ConfigFormat::from_path(Path::new("relay.ini")), None);
    assert_eq!(ConfigFormat::from_path(Path::new("relay")), None);
    assert_eq!(ConfigFormat::Json.extension(), "json");
}

#[cfg(all(feature = "yaml-config", feature = "toml-config"))]
#[test]
fn test_feature_gated_formats_from_path() {
    assert_eq!(ConfigFormat::from_path(Path::new("relay.yml")), Some(ConfigFormat::Yaml));
    assert_eq!(ConfigFormat::from_path(Path::new("relay.yaml")), Some(ConfigFormat::Yaml));
    assert_eq!(ConfigFormat::from_path(Path::new("relay.toml")), Some(ConfigFormat::Toml));
    assert_eq!(ConfigFormat::Toml.extension(), "toml");
}

#[test]
fn test_json_round_trip() {
    let config = sample();
    let text = config.serialize(ConfigFormat::Json).unwrap();
    assert_eq!(RelayConfig::deserialize(&text, ConfigFormat::Json).unwrap(), config);
}

#[cfg(feature = "yaml-config")]
#[test]
fn test_yaml_round_trip() {
    let config = sample();
    let text = config.serialize(ConfigFormat::Yaml).unwrap();
    assert_eq!(RelayConfig::deserialize(&text, ConfigFormat::Yaml).unwrap(), config);
}

#[cfg(feature = "toml-config")]
#[test]
fn test_toml_round_trip() {
    let config = sample();
    let text = config.serialize(ConfigFormat::Toml).unwrap();
    assert_eq!(RelayConfig::deserialize(&text, ConfigFormat::Toml).unwrap(), config);
}

#[test]
fn test_missing_fields_take_defaults() {
    let config = RelayConfig::deserialize(r#"{ "log_level": "warn" }"#, ConfigFormat::Json).unwrap();
    assert_eq!(config.log_level, "warn");
    assert!(config.drain_on_shutdown);
}

#[test]
fn test_malformed_input_is_a_deserialize_error() {
    let err = RelayConfig::deserialize("{ not json", ConfigFormat::Json).unwrap_err();
    assert!(matches!(err, ConfigError::Deserialize { format: "JSON", .. }));
}

#[test]
fn test_load_from_file() {
    let mut file = Builder::new().suffix(".json").tempfile().unwrap();
    write!(file, "{}", sample().serialize(ConfigFormat::Json).unwrap()).unwrap();

    let loaded = RelayConfig::load(file.path()).unwrap();
    assert_eq!(loaded, sample());
}

#[test]
fn test_load_errors() {
    let dir = tempdir().unwrap();

    let missing = dir.path().join("missing.json");
    assert!(matches!(RelayConfig::load(&missing), Err(ConfigError::Io { .. })));

    let unsupported = dir.path().join("relay.ini");
    std::fs::write(&unsupported, "x=1").unwrap();
    assert!(matches!(
        RelayConfig::load(&unsupported),
        Err(ConfigError::UnsupportedFormat { .. })
    ));
}

struct FromConfig(Vec<(String, SubscriptionSpec)>);

impl SubscriberInterface for FromConfig {
    fn subscriptions(&self) -> Vec<(String, SubscriptionSpec)> {
        self.0.clone()
    }
}

#[test]
fn test_subscription_specs_normalize() {
    let specs = sample().subscription_specs().unwrap();
    assert_eq!(specs.len(), 2);

    let owner: std::sync::Arc<dyn SubscriberInterface> = std::sync::Arc::new(FromConfig(specs));
    let map = InterfaceManager::normalize(&owner).unwrap();
    assert_eq!(map["bootstrap"].len(), 1);
    assert_eq!(map["output"].len(), 2);
    assert_eq!(map["output"][0].priority, 10);
    assert!(map["output"][1].only_once);
}

#[test]
fn test_invalid_subscription_value() {
    let mut config = RelayConfig::default();
    config.subscriptions.insert("x".to_string(), json!({ "method": "log" }));
    assert!(config.subscription_specs().is_err());
}
