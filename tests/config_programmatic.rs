//! Integration test for driver configuration
//!
//! Tests that slots can be configured in code, from resolved key/value pairs
//! and from TOML, without a broker.

use rabbitmq_driver::{
    DriverConfig, DriverSettings, Endpoint, RetrySettings, DEFAULT_SOCKET_BUFFER, MAX_HOSTS,
};
use std::collections::HashMap;

#[test]
fn test_programmatic_driver_config() {
    let config = DriverConfig {
        exchange: "noit.firehose".to_string(),
        routingkey: "check".to_string(),
        username: "noit".to_string(),
        password: "secret".to_string(),
        vhost: "/noit".to_string(),
        heartbeat: 10_500,
        hostname: "mq1.example.com,mq2.example.com".to_string(),
        port: 5671,
    };

    assert!(config.validate().is_ok());
    assert_eq!(config.heartbeat_secs(), 11);
    assert_eq!(
        config.endpoints(),
        vec![
            Endpoint::new("mq1.example.com", 5671),
            Endpoint::new("mq2.example.com", 5671),
        ]
    );
}

#[test]
fn test_config_from_resolved_settings() {
    let settings: HashMap<String, String> = [
        ("exchange", "noit.firehose"),
        ("hostname", "10.0.0.1, 10.0.0.2 ,10.0.0.3"),
        ("heartbeat", "999"),
        ("unrelated", "ignored"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let config = DriverConfig::from_settings(&settings).unwrap();
    assert_eq!(config.exchange, "noit.firehose");
    assert_eq!(config.routingkey, "");
    assert_eq!(config.vhost, "/");
    assert_eq!(config.port, 5672);
    assert_eq!(config.heartbeat_secs(), 1);

    let hosts: Vec<String> = config.endpoints().into_iter().map(|e| e.to_string()).collect();
    assert_eq!(
        hosts,
        vec!["10.0.0.1:5672", "10.0.0.2:5672", "10.0.0.3:5672"]
    );
}

#[test]
fn test_config_from_toml_file() {
    let path = std::env::temp_dir().join(format!(
        "rabbitmq-driver-config-{}.toml",
        std::process::id()
    ));
    std::fs::write(
        &path,
        r#"
exchange = "noit.firehose"
routingkey = "check"
username = "guest"
password = "guest"
hostname = "mq1,mq2"
"#,
    )
    .unwrap();

    let config = DriverConfig::from_file(path.to_str().unwrap()).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(config.exchange, "noit.firehose");
    assert_eq!(config.heartbeat, 5000);
    assert_eq!(config.endpoints().len(), 2);
}

#[test]
fn test_missing_config_file() {
    let err = DriverConfig::from_file("/nonexistent/rabbitmq.toml").unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_host_list_limits() {
    let hosts: Vec<String> = (0..MAX_HOSTS + 3).map(|i| format!("mq{}", i)).collect();
    let config = DriverConfig {
        hostname: hosts.join(","),
        ..DriverConfig::default()
    };
    assert_eq!(config.endpoints().len(), MAX_HOSTS);

    let config = DriverConfig {
        hostname: format!("{}.example.com", "a".repeat(255)),
        ..DriverConfig::default()
    };
    assert!(config.validate().unwrap_err().is_configuration());
}

#[test]
fn test_programmatic_settings() {
    let settings = DriverSettings {
        sndbuf: 262_144,
        rcvbuf: 131_072,
        log_level: "debug".to_string(),
    };
    assert_eq!(settings.sndbuf, 262_144);

    let default_settings = DriverSettings::default();
    assert_eq!(default_settings.sndbuf, DEFAULT_SOCKET_BUFFER);
    assert_eq!(default_settings.rcvbuf, DEFAULT_SOCKET_BUFFER);
    assert_eq!(default_settings.log_level, "info");
}

#[test]
fn test_programmatic_retry_settings() {
    let retry = RetrySettings {
        max_retries: 10,
        retry_backoff_ms: 500,
        max_backoff_ms: 120000,
    };
    assert_eq!(retry.max_retries, 10);

    let default_retry = RetrySettings::default();
    assert_eq!(default_retry.max_retries, 3);
    assert_eq!(default_retry.retry_backoff_ms, 1000);
    assert_eq!(default_retry.max_backoff_ms, 30000);
}
