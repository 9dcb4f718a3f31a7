//! Integration tests for logging system

use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use core_runtime::Error;

#[test]
fn test_logging_config_defaults() {
    let config = LoggingConfig::default();

    assert_eq!(config.level, LogLevel::Info);
    assert!(config.filter.is_none());
    assert!(config.enable_spans);
    assert!(config.display_target);
    assert!(!config.display_thread_info);
    assert!(!config.capture_for_tests);
}

#[test]
fn test_level_round_trips_through_display() {
    for level in [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ] {
        assert_eq!(level.to_string().parse::<LogLevel>().unwrap(), level);
    }
}

#[test]
fn test_init_once_per_process() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Json)
        .with_level(LogLevel::Debug)
        .for_tests();

    init_logging(config.clone()).expect("first initialisation succeeds");
    tracing::info!(clip_ms = 4_000, "logging ready");

    match init_logging(config) {
        Err(Error::Config(msg)) => assert!(msg.contains("Failed to initialize logging")),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
fn test_bad_filter_rejected_before_install() {
    let config = LoggingConfig::default().with_filter("core_loop=notalevel");
    assert!(matches!(init_logging(config), Err(Error::Config(_))));
}
