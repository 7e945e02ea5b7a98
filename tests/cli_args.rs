// tests/cli_args.rs

use std::time::Duration;

use clap::Parser;

use runherd::cli::{CliArgs, Command, LogLevel};

#[test]
fn run_with_timeout_and_global_flags() {
    let args = CliArgs::try_parse_from([
        "runherd",
        "run",
        "links.spec.js",
        "--timeout",
        "90s",
        "--config",
        "demos/Runherd.toml",
        "--log-level",
        "debug",
    ])
    .expect("valid arguments");

    assert_eq!(args.config, "demos/Runherd.toml");
    assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    match args.command {
        Command::Run { name, timeout } => {
            assert_eq!(name, "links.spec.js");
            assert_eq!(timeout, Some(Duration::from_secs(90)));
        }
        other => panic!("expected run, got {other:?}"),
    }
}

#[test]
fn serve_defaults() {
    let args = CliArgs::try_parse_from(["runherd", "serve"]).expect("valid arguments");
    assert_eq!(args.config, "Runherd.toml");
    assert!(args.log_level.is_none());
    assert!(matches!(args.command, Command::Serve { bind: None }));

    let args = CliArgs::try_parse_from(["runherd", "serve", "--bind", "0.0.0.0:8080"])
        .expect("valid arguments");
    assert!(matches!(args.command, Command::Serve { bind: Some(ref b) } if b == "0.0.0.0:8080"));
}

#[test]
fn bad_input_is_rejected() {
    assert!(CliArgs::try_parse_from(["runherd"]).is_err());
    assert!(CliArgs::try_parse_from(["runherd", "run"]).is_err());
    assert!(CliArgs::try_parse_from(["runherd", "run", "x", "--timeout", "soon"]).is_err());
    assert!(
        CliArgs::try_parse_from(["runherd", "run", "x", "--timeout", "18446744073709551615h"])
            .is_err()
    );
    assert!(CliArgs::try_parse_from(["runherd", "list", "--log-level", "loud"]).is_err());
}
