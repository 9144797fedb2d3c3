//! Client Input Tests
//!
//! Tests verify:
//! - SUBSCRIBE / UNSUBSCRIBE take exactly one bracketed key
//! - DELAY and DISCONNECT stay local
//! - Other lines must be valid job-script commands
//! - Notifications print as `(key,value)`

use std::time::Duration;

use pipekv::client::{parse_client_line, ClientCommand};
use pipekv::protocol::{render_notification, Notification};

#[test]
fn test_subscription_lines() {
    assert_eq!(
        parse_client_line("SUBSCRIBE [a]").unwrap(),
        Some(ClientCommand::Subscribe("a".to_string()))
    );
    assert_eq!(
        parse_client_line("  UNSUBSCRIBE [ key ]  ").unwrap(),
        Some(ClientCommand::Unsubscribe("key".to_string()))
    );
    assert!(parse_client_line("SUBSCRIBE [a,b]").is_err());
    assert!(parse_client_line("SUBSCRIBE a").is_err());
    assert!(parse_client_line(&format!("SUBSCRIBE [{}]", "k".repeat(41))).is_err());
}

#[test]
fn test_local_lines() {
    assert_eq!(
        parse_client_line("DELAY 250").unwrap(),
        Some(ClientCommand::Delay(Duration::from_millis(250)))
    );
    assert_eq!(
        parse_client_line("DISCONNECT").unwrap(),
        Some(ClientCommand::Disconnect)
    );
    assert_eq!(parse_client_line("").unwrap(), None);
    assert_eq!(parse_client_line("# note").unwrap(), None);
    assert!(parse_client_line("DELAY soon").is_err());
    assert!(parse_client_line("DISCONNECT now").is_err());
}

#[test]
fn test_remote_lines() {
    assert_eq!(
        parse_client_line("WRITE [(a,1)]").unwrap(),
        Some(ClientCommand::Remote("WRITE [(a,1)]".to_string()))
    );
    assert_eq!(
        parse_client_line("SHOW").unwrap(),
        Some(ClientCommand::Remote("SHOW".to_string()))
    );
    assert!(parse_client_line("FETCH [a]").is_err());
}

#[test]
fn test_render_notification() {
    let changed = Notification::Changed {
        key: "a".to_string(),
        value: "9".to_string(),
    };
    let deleted = Notification::Deleted {
        key: "a".to_string(),
    };

    assert_eq!(render_notification(&changed), "(a,9)");
    assert_eq!(render_notification(&deleted), "(a,DELETED)");
}
