//! Tests for serve and enqueue.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use tierd_core::queue::Priority;

#[test]
fn cli_parse_serve_defaults() {
    match parse(&["tierd", "serve"]) {
        CliCommand::Serve { bind } => assert!(bind.is_none()),
        _ => panic!("expected Serve"),
    }
}

#[test]
fn cli_parse_serve_bind() {
    match parse(&["tierd", "serve", "--bind", "0.0.0.0:9000"]) {
        CliCommand::Serve { bind } => assert_eq!(bind.as_deref(), Some("0.0.0.0:9000")),
        _ => panic!("expected Serve"),
    }
}

#[test]
fn cli_parse_enqueue_default_priority() {
    match parse(&["tierd", "enqueue", "alice"]) {
        CliCommand::Enqueue { user, priority } => {
            assert_eq!(user, "alice");
            assert_eq!(priority, Priority::Normal);
        }
        _ => panic!("expected Enqueue"),
    }
}

#[test]
fn cli_parse_enqueue_priority() {
    match parse(&["tierd", "enqueue", "bob", "--priority", "High"]) {
        CliCommand::Enqueue { user, priority } => {
            assert_eq!(user, "bob");
            assert_eq!(priority, Priority::High);
        }
        _ => panic!("expected Enqueue"),
    }
}

#[test]
fn cli_parse_enqueue_rejects_unknown_priority() {
    assert!(Cli::try_parse_from(["tierd", "enqueue", "bob", "--priority", "urgent"]).is_err());
}

#[test]
fn cli_parse_enqueue_requires_user() {
    assert!(Cli::try_parse_from(["tierd", "enqueue"]).is_err());
}
