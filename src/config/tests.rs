use clap::Parser;

use super::*;

#[test]
fn defaults_resolve_without_any_sources() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 8080);
    assert_eq!(settings.server.graceful_shutdown, Duration::from_secs(30));
    assert_eq!(settings.relay.path, "/store");
    assert_eq!(settings.relay.store, "store");
    assert_eq!(settings.relay.cache, "state");
    assert_eq!(settings.relay.queue_capacity, 16);
    assert_eq!(settings.cache.feed_capacity, 1024);
    assert_eq!(settings.cache.history_limit, 0);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn zero_port_is_rejected() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(0);

    let err = Settings::from_raw(raw).expect_err("invalid port");
    assert!(matches!(err, LoadError::Invalid { key: "server.port", .. }));
}

#[test]
fn zero_queue_capacity_is_rejected() {
    let mut raw = RawSettings::default();
    raw.relay.queue_capacity = Some(0);

    let err = Settings::from_raw(raw).expect_err("invalid capacity");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "relay.queue_capacity",
            ..
        }
    ));
}

#[test]
fn blank_relay_path_is_rejected() {
    let mut raw = RawSettings::default();
    raw.relay.path = Some("   ".to_string());

    let err = Settings::from_raw(raw).expect_err("blank path");
    assert!(matches!(err, LoadError::Invalid { key: "relay.path", .. }));
}

#[test]
fn unparseable_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("chatty".to_string());

    let err = Settings::from_raw(raw).expect_err("bad level");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "logging.level",
            ..
        }
    ));
}

#[test]
fn serve_arguments_parse() {
    let args = CliArgs::parse_from([
        "riverbero",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--relay-path",
        "/live",
        "--cache-history-limit",
        "64",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(serve.overrides.relay_path.as_deref(), Some("/live"));
            assert_eq!(serve.overrides.cache_history_limit, Some(64));
        }
    }
}
