//! Tests for ProtocolService
//!
//! These tests verify:
//! - Lazy connection creation and reconnect after a fault
//! - Command entry points and usage errors
//! - Owner sweeps across every queue
//! - Shutdown and drop semantics
//! - Reactor forwarding and synchronous drain

use resplink::{LinkError, Reply, Role};

use crate::common::*;

// =============================================================================
// Connection Management Tests
// =============================================================================

#[test]
fn test_connections_created_lazily() {
    let (net, mut service) = setup_service();

    assert_eq!(net.created(Role::Command), 0);
    assert_eq!(net.created(Role::Subscriber), 0);
    assert!(!service.is_connected(Role::Command));

    service.send(None, &["PING"]).unwrap();

    assert_eq!(net.created(Role::Command), 1);
    assert_eq!(net.created(Role::Subscriber), 0);
    assert!(service.is_connected(Role::Command));
}

#[test]
fn test_connect_opens_both_roles() {
    let (net, mut service) = setup_service();

    service.connect().unwrap();

    assert_eq!(net.created(Role::Command), 1);
    assert_eq!(net.created(Role::Subscriber), 1);

    // Already connected: no new sockets
    service.connect().unwrap();
    assert_eq!(net.created(Role::Command), 1);
}

#[test]
fn test_reconnect_after_connection_fault() {
    let (net, mut service) = setup_service();
    let first = recorder();
    let second = recorder();

    service.send(Some(handle("test", &first)), &["GET", "a"]).unwrap();
    service.on_error(Role::Command, "connection reset by peer");

    assert_eq!(first.borrow().errors, vec!["connection lost".to_string()]);
    assert!(!service.is_connected(Role::Command));

    service.send(Some(handle("test", &second)), &["GET", "b"]).unwrap();
    assert_eq!(net.created(Role::Command), 2);
    assert_eq!(
        written_commands(&net.wire(Role::Command)),
        vec![
            command(&["CLIENT", "SETNAME", "tests"]),
            command(&["SELECT", "3"]),
            command(&["GET", "b"]),
        ]
    );

    service.on_readable(Role::Command, b"+OK\r\n+OK\r\n$1\r\nb\r\n");
    assert_eq!(second.borrow().results, vec![Reply::bulk("b")]);
    assert_eq!(first.borrow().calls(), 1);
}

#[test]
fn test_connect_failure_reported_to_caller() {
    let (net, mut service) = setup_service();
    let rec = recorder();
    *net.connect_error.borrow_mut() = true;

    let result = service.send(Some(handle("test", &rec)), &["GET", "a"]);

    assert!(matches!(result, Err(LinkError::Connection(_))));
    assert_eq!(rec.borrow().calls(), 0);
    assert!(service.connection(Role::Command).is_none());

    *net.connect_error.borrow_mut() = false;
    service.send(Some(handle("test", &rec)), &["GET", "a"]).unwrap();
    assert!(service.is_connected(Role::Command));
}

#[test]
fn test_handshake_waits_for_async_connect() {
    let (net, mut service) = setup_service();
    let rec = recorder();
    *net.in_progress.borrow_mut() = true;

    service.send(Some(handle("test", &rec)), &["GET", "a"]).unwrap();
    assert!(net.wire(Role::Command).borrow().written.is_empty());

    service.on_connect(Role::Command);

    assert_eq!(
        written_commands(&net.wire(Role::Command)),
        vec![
            command(&["CLIENT", "SETNAME", "tests"]),
            command(&["SELECT", "3"]),
            command(&["GET", "a"]),
        ]
    );
    service.on_readable(Role::Command, b"+OK\r\n+OK\r\n:5\r\n");
    assert_eq!(rec.borrow().results, vec![Reply::Integer(5)]);
}

// =============================================================================
// Command Tests
// =============================================================================

#[test]
fn test_empty_command_rejected() {
    let (net, mut service) = setup_service();
    let empty: [&str; 0] = [];

    assert!(matches!(service.send(None, &empty), Err(LinkError::EmptyCommand)));
    assert!(matches!(service.send_command(None, "   "), Err(LinkError::EmptyCommand)));
    assert_eq!(net.created(Role::Command), 0);
}

#[test]
fn test_send_command_splits_on_whitespace() {
    let (net, mut service) = setup_service();

    service.send_command(None, "SET  key\tvalue ").unwrap();

    assert_eq!(
        written_commands(&net.wire(Role::Command)).last(),
        Some(&command(&["SET", "key", "value"]))
    );
}

#[test]
fn test_binary_arguments_sent_verbatim() {
    let (net, mut service) = setup_service();

    service.send(None, &[b"SET".as_slice(), b"k".as_slice(), b"a b\r\nc".as_slice()]).unwrap();

    let written = net.wire(Role::Command).borrow().written.clone();
    assert!(written.ends_with(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$6\r\na b\r\nc\r\n"));
}

#[test]
fn test_pipelined_replies_in_order() {
    let (_net, mut service) = setup_service();
    let recs: Vec<_> = (0..4).map(|_| recorder()).collect();

    for (i, rec) in recs.iter().enumerate() {
        let key = format!("k{}", i);
        service.send(Some(handle("test", rec)), &["GET", key.as_str()]).unwrap();
    }

    let replies = b"+OK\r\n+OK\r\n$2\r\nv0\r\n$-1\r\n-ERR nope\r\n:3\r\n";
    let consumed = service.on_readable(Role::Command, replies);
    assert_eq!(consumed, replies.len());

    assert_eq!(recs[0].borrow().results, vec![Reply::bulk("v0")]);
    assert_eq!(recs[1].borrow().results, vec![Reply::nil()]);
    assert_eq!(recs[2].borrow().errors, vec!["ERR nope".to_string()]);
    assert_eq!(recs[3].borrow().results, vec![Reply::Integer(3)]);
}

// =============================================================================
// Owner Sweep Tests
// =============================================================================

#[test]
fn test_unload_owner_sweeps_every_queue() {
    let (net, mut service) = setup_service();
    let leaving = recorder();
    let staying = recorder();

    service.send(Some(handle("leaving", &leaving)), &["GET", "a"]).unwrap();
    service.send(Some(handle("staying", &staying)), &["GET", "b"]).unwrap();
    service.subscribe(handle("leaving", &leaving), "news").unwrap();

    let notified = service.unload_owner(&"leaving".into(), "owner unloading");

    assert_eq!(notified, 2);
    assert_eq!(
        leaving.borrow().errors,
        vec!["owner unloading".to_string(), "owner unloading".to_string()]
    );
    assert!(!service.subscriptions().contains("news"));
    assert_eq!(
        written_commands(&net.wire(Role::Subscriber)).last(),
        Some(&command(&["UNSUBSCRIBE", "news"]))
    );

    // The swept slot still absorbs its reply
    service.on_readable(Role::Command, b"+OK\r\n+OK\r\n$1\r\na\r\n$1\r\nb\r\n");
    assert_eq!(leaving.borrow().results.len(), 0);
    assert_eq!(staying.borrow().results, vec![Reply::bulk("b")]);
}

#[test]
fn test_unload_unknown_owner_is_noop() {
    let (_net, mut service) = setup_service();
    let rec = recorder();
    service.send(Some(handle("test", &rec)), &["GET", "a"]).unwrap();

    assert_eq!(service.unload_owner(&"nobody".into(), "owner unloading"), 0);
    assert_eq!(rec.borrow().calls(), 0);
}

// =============================================================================
// Shutdown Tests
// =============================================================================

#[test]
fn test_shutdown_fails_everything_once() {
    let (net, mut service) = setup_service();
    let plain = recorder();
    let queued = recorder();

    service.send(Some(handle("test", &plain)), &["GET", "a"]).unwrap();
    service.begin_transaction().unwrap();
    service.send(Some(handle("test", &queued)), &["GET", "b"]).unwrap();

    let notified = service.shutdown();

    assert_eq!(notified, 2);
    assert_eq!(plain.borrow().errors, vec!["interface going away".to_string()]);
    assert_eq!(queued.borrow().errors, vec!["interface going away".to_string()]);
    assert!(net.wire(Role::Command).borrow().closed_by_client);
    assert!(!service.in_transaction());

    // Second shutdown finds nothing left
    assert_eq!(service.shutdown(), 0);
}

#[test]
fn test_drop_fails_pending_handlers() {
    let (_net, mut service) = setup_service();
    let rec = recorder();

    service.send(Some(handle("test", &rec)), &["GET", "a"]).unwrap();
    drop(service);

    assert_eq!(rec.borrow().errors, vec!["interface going away".to_string()]);
}

// =============================================================================
// Driving Tests
// =============================================================================

#[test]
fn test_block_and_process_without_connection() {
    let (_net, mut service) = setup_service();
    assert!(!service.block_and_process().unwrap());
}

#[test]
fn test_block_and_process_drains_reply() {
    let (net, mut service) = setup_service();
    let rec = recorder();

    service.send(Some(handle("test", &rec)), &["GET", "a"]).unwrap();
    net.wire(Role::Command)
        .borrow_mut()
        .inbox
        .push_back(b"+OK\r\n+OK\r\n$1\r\nx\r\n".to_vec());

    let outstanding = service.block_and_process().unwrap();

    assert!(!outstanding);
    assert_eq!(rec.borrow().results, vec![Reply::bulk("x")]);
    assert_eq!(net.wire(Role::Command).borrow().blocking_calls, vec![true, false]);
}

#[test]
fn test_poll_drives_both_connections() {
    let (net, mut service) = setup_service();
    let reply = recorder();
    let news = recorder();

    service.send(Some(handle("test", &reply)), &["INCR", "n"]).unwrap();
    service.subscribe(handle("test", &news), "news").unwrap();

    {
        let command_wire = net.wire(Role::Command);
        let mut wire = command_wire.borrow_mut();
        wire.inbox.push_back(b"+OK\r\n+OK\r\n:".to_vec());
        wire.inbox.push_back(b"1\r\n".to_vec());
    }
    net.wire(Role::Subscriber)
        .borrow_mut()
        .inbox
        .push_back(b"*3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$2\r\nhi\r\n".to_vec());

    service.poll();

    assert_eq!(reply.borrow().results, vec![Reply::Integer(1)]);
    assert_eq!(news.borrow().results.len(), 1);
}

#[test]
fn test_poll_reconnects_on_next_send_after_peer_close() {
    let (net, mut service) = setup_service();
    let rec = recorder();

    service.send(Some(handle("test", &rec)), &["GET", "a"]).unwrap();
    net.wire(Role::Command).borrow_mut().peer_closed = true;
    service.poll();

    assert_eq!(rec.borrow().errors, vec!["connection lost".to_string()]);
    assert!(!service.is_connected(Role::Command));

    service.send(None, &["PING"]).unwrap();
    assert_eq!(net.created(Role::Command), 2);
}
