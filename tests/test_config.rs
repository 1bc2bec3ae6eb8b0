use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use lantern::config::{Args, Config};

#[test]
fn test_config_defaults() {
    let cfg = Config::default();

    assert_eq!(cfg.server.host, "127.0.0.1");
    assert_eq!(cfg.server.port, 9000);
    assert_eq!(cfg.server.workers, 1);
    assert_eq!(cfg.server.document_root, PathBuf::from("."));
    assert_eq!(cfg.logging.level, "info");
    assert_eq!(cfg.logging.file, None);
}

#[test]
fn test_config_listen_addr() {
    let cfg = Config::default();

    let expected: std::net::SocketAddr = "127.0.0.1:9000".parse().unwrap();
    assert_eq!(cfg.server.listen_addr().unwrap(), expected);
}

#[test]
fn test_config_cli_flags() {
    let args = Args::try_parse_from([
        "lantern", "--host", "0.0.0.0", "--port", "8080", "--log", "debug", "--logfile",
        "server.log", "-w", "4", "-r", "/srv/www",
    ])
    .unwrap();
    let cfg = Config::load(&args).unwrap();

    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.server.port, 8080);
    assert_eq!(cfg.server.workers, 4);
    assert_eq!(cfg.server.document_root, PathBuf::from("/srv/www"));
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.logging.file, Some(PathBuf::from("server.log")));
    assert_eq!(args.worker, None);
}

#[test]
fn test_config_hidden_worker_flag() {
    let args = Args::try_parse_from(["lantern", "--worker", "2"]).unwrap();

    assert_eq!(args.worker, Some(2));
}

#[test]
fn test_config_rejects_bad_port() {
    assert!(Args::try_parse_from(["lantern", "--port", "70000"]).is_err());
}

#[test]
fn test_config_from_yaml_partial() {
    let cfg = Config::from_yaml_str(
        "server:\n  port: 3000\n  max_header_bytes: 1024\nlogging:\n  level: warn\n",
    )
    .unwrap();

    assert_eq!(cfg.server.port, 3000);
    assert_eq!(cfg.server.host, "127.0.0.1");
    assert_eq!(cfg.server.limits().max_header_bytes, 1024);
    assert_eq!(cfg.logging.level, "warn");
}

#[test]
fn test_config_cli_overrides_file() {
    let mut file = std::env::temp_dir();
    file.push(format!("lantern-config-{}.yaml", std::process::id()));
    std::fs::File::create(&file)
        .unwrap()
        .write_all(b"server:\n  host: 0.0.0.0\n  port: 3000\n  workers: 2\n")
        .unwrap();

    let args = Args {
        config: Some(file.clone()),
        port: Some(5000),
        ..Args::default()
    };
    let cfg = Config::load(&args).unwrap();
    std::fs::remove_file(&file).unwrap();

    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.server.port, 5000);
    assert_eq!(cfg.server.workers, 2);
}

#[test]
fn test_config_missing_file_is_an_error() {
    let args = Args {
        config: Some(PathBuf::from("/nonexistent/lantern.yaml")),
        ..Args::default()
    };

    assert!(Config::load(&args).is_err());
}

#[test]
fn test_config_rejects_zero_workers() {
    let args = Args {
        workers: Some(0),
        ..Args::default()
    };

    assert!(Config::load(&args).is_err());
}

#[test]
fn test_config_rejects_unknown_log_level() {
    let args = Args {
        log_level: Some("chatty".to_string()),
        ..Args::default()
    };

    assert!(Config::load(&args).is_err());
}

#[test]
fn test_config_clone() {
    let cfg1 = Config::default();
    let cfg2 = cfg1.clone();

    assert_eq!(cfg1, cfg2);
}
