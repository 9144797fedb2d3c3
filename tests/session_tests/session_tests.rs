//! Session Tests
//!
//! End-to-end sessions over in-memory socket pairs standing in for the
//! named pipes.
//!
//! Tests verify:
//! - Connect / subscribe / unsubscribe / disconnect response codes
//! - Commands over the session and their notifications
//! - Undecodable commands and unknown opcodes leave the session open
//! - Cleanup when a client vanishes without disconnecting
//! - The admission gate caps active sessions
//! - The client API drives a full session through the registration channel

use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel;
use parking_lot::Mutex;
use pipekv::client::{Connector, KvsClient};
use pipekv::protocol::{
    encode_command_request, encode_connect, encode_key_request, read_command_response,
    read_notification, read_response_code, ConnectRequest, Notification, OpCode, ResponseCode,
};
use pipekv::session::{ChannelReader, ChannelWriter, SessionAdmission, Transport};
use pipekv::{Config, Engine};
use tempfile::tempdir;

// =============================================================================
// Helpers
// =============================================================================

/// Transport handing out the server ends of pre-registered socket pairs
#[derive(Default)]
struct MemoryTransport {
    channels: Mutex<HashMap<String, UnixStream>>,
}

impl MemoryTransport {
    fn take(&self, id: &str) -> io::Result<UnixStream> {
        self.channels
            .lock()
            .remove(id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, id.to_string()))
    }

    fn register(&self, id: &str) -> UnixStream {
        let (client, server) = UnixStream::pair().unwrap();
        self.channels.lock().insert(id.to_string(), server);
        client
    }
}

impl Transport for MemoryTransport {
    fn open_response(&self, id: &str) -> io::Result<ChannelWriter> {
        Ok(Box::new(self.take(id)?))
    }

    fn open_request(&self, id: &str) -> io::Result<ChannelReader> {
        Ok(Box::new(self.take(id)?))
    }

    fn open_notification(&self, id: &str) -> io::Result<ChannelWriter> {
        Ok(Box::new(self.take(id)?))
    }
}

/// Connector handing out the client ends registered with a `MemoryTransport`
struct MemoryConnector {
    ends: Mutex<HashMap<String, UnixStream>>,
}

impl MemoryConnector {
    fn register(transport: &MemoryTransport, connect: &ConnectRequest) -> Self {
        let mut ends = HashMap::new();
        for id in [
            &connect.request_channel,
            &connect.response_channel,
            &connect.notification_channel,
        ] {
            ends.insert(id.clone(), transport.register(id));
        }
        Self {
            ends: Mutex::new(ends),
        }
    }

    fn take(&self, id: &str) -> io::Result<UnixStream> {
        self.ends
            .lock()
            .remove(id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, id.to_string()))
    }
}

impl Connector for MemoryConnector {
    fn open_response(&self, id: &str) -> io::Result<ChannelReader> {
        Ok(Box::new(self.take(id)?))
    }

    fn open_request(&self, id: &str) -> io::Result<ChannelWriter> {
        Ok(Box::new(self.take(id)?))
    }

    fn open_notification(&self, id: &str) -> io::Result<ChannelReader> {
        Ok(Box::new(self.take(id)?))
    }
}

/// Client side of one session
struct Client {
    request: UnixStream,
    response: UnixStream,
    notification: UnixStream,
    connect: ConnectRequest,
}

impl Client {
    fn register(transport: &MemoryTransport, name: &str) -> Self {
        let connect = ConnectRequest {
            request_channel: format!("{}-req", name),
            response_channel: format!("{}-resp", name),
            notification_channel: format!("{}-notif", name),
        };
        Self {
            request: transport.register(&connect.request_channel),
            response: transport.register(&connect.response_channel),
            notification: transport.register(&connect.notification_channel),
            connect,
        }
    }

    fn response_code(&mut self) -> ResponseCode {
        read_response_code(&mut self.response).unwrap()
    }

    fn subscribe(&mut self, key: &str) -> ResponseCode {
        let frame = encode_key_request(OpCode::Subscribe, key).unwrap();
        self.request.write_all(&frame).unwrap();
        self.response_code()
    }

    fn unsubscribe(&mut self, key: &str) -> ResponseCode {
        let frame = encode_key_request(OpCode::Unsubscribe, key).unwrap();
        self.request.write_all(&frame).unwrap();
        self.response_code()
    }

    fn command(&mut self, line: &str) -> (ResponseCode, String) {
        let frame = encode_command_request(line).unwrap();
        self.request.write_all(&frame).unwrap();
        read_command_response(&mut self.response).unwrap()
    }

    fn disconnect(&mut self) -> ResponseCode {
        self.request.write_all(&[OpCode::Disconnect as u8]).unwrap();
        self.response_code()
    }

    fn notification(&mut self) -> Notification {
        read_notification(&mut self.notification).unwrap()
    }

    /// Block until the server has dropped its end of the response channel
    fn wait_closed(&mut self) {
        let mut buf = [0u8; 16];
        while self.response.read(&mut buf).unwrap() > 0 {}
    }
}

fn open_engine(backup_dir: &Path, max_sessions: usize) -> Arc<Engine> {
    let config = Config::builder()
        .backup_dir(backup_dir)
        .max_sessions(max_sessions)
        .session_workers(4)
        .build();
    let engine = Engine::open(config).unwrap();
    engine
        .store()
        .write(vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ])
        .unwrap();
    Arc::new(engine)
}

fn start(engine: &Arc<Engine>) -> (SessionAdmission, Arc<MemoryTransport>) {
    let transport = Arc::new(MemoryTransport::default());
    let admission = SessionAdmission::start(Arc::clone(engine), transport.clone()).unwrap();
    (admission, transport)
}

// =============================================================================
// Protocol Tests
// =============================================================================

#[test]
fn test_connect_and_disconnect() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path(), 4);
    let (admission, transport) = start(&engine);

    let mut client = Client::register(&transport, "c1");
    admission.admit(client.connect.clone()).unwrap();

    assert_eq!(client.response_code(), ResponseCode::ConnectOk);
    assert_eq!(client.disconnect(), ResponseCode::Disconnected);

    client.wait_closed();
    admission.shutdown();
    assert_eq!(engine.store().len().unwrap(), 2);
}

#[test]
fn test_subscribe_and_unsubscribe_codes() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path(), 4);
    let (admission, transport) = start(&engine);

    let mut client = Client::register(&transport, "c1");
    admission.admit(client.connect.clone()).unwrap();
    assert_eq!(client.response_code(), ResponseCode::ConnectOk);

    assert_eq!(client.subscribe("a"), ResponseCode::Subscribed);
    assert_eq!(client.subscribe("zz"), ResponseCode::SubscribeKeyNotFound);
    assert_eq!(client.unsubscribe("a"), ResponseCode::Unsubscribed);
    assert_eq!(client.unsubscribe("a"), ResponseCode::SubscriptionNotFound);
    assert_eq!(client.unsubscribe("zz"), ResponseCode::SubscriptionNotFound);

    assert_eq!(client.disconnect(), ResponseCode::Disconnected);
    admission.shutdown();
}

#[test]
fn test_commands_and_notifications() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path(), 4);
    let (admission, transport) = start(&engine);

    let mut watcher = Client::register(&transport, "watcher");
    let mut writer = Client::register(&transport, "writer");
    admission.admit(watcher.connect.clone()).unwrap();
    admission.admit(writer.connect.clone()).unwrap();
    assert_eq!(watcher.response_code(), ResponseCode::ConnectOk);
    assert_eq!(writer.response_code(), ResponseCode::ConnectOk);

    assert_eq!(watcher.subscribe("a"), ResponseCode::Subscribed);

    assert_eq!(
        writer.command("WRITE [(a,9)(c,3)]"),
        (ResponseCode::CommandOk, String::new())
    );
    assert_eq!(
        watcher.notification(),
        Notification::Changed {
            key: "a".to_string(),
            value: "9".to_string()
        }
    );

    assert_eq!(
        writer.command("READ [a,c,d]"),
        (ResponseCode::CommandOk, "[(a,9)(c,3)(d,KVSERROR)]\n".to_string())
    );
    assert_eq!(
        writer.command("DELETE [a,d]"),
        (ResponseCode::CommandOk, "[(d,KVSMISSING)]\n".to_string())
    );
    assert_eq!(
        watcher.notification(),
        Notification::Deleted {
            key: "a".to_string()
        }
    );
    assert_eq!(
        writer.command("SHOW"),
        (ResponseCode::CommandOk, "(b, 2)\n(c, 3)\n".to_string())
    );

    assert_eq!(watcher.disconnect(), ResponseCode::Disconnected);
    assert_eq!(writer.disconnect(), ResponseCode::Disconnected);
    admission.shutdown();
}

#[test]
fn test_rejected_command_keeps_session() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path(), 4);
    let (admission, transport) = start(&engine);

    let mut client = Client::register(&transport, "c1");
    admission.admit(client.connect.clone()).unwrap();
    assert_eq!(client.response_code(), ResponseCode::ConnectOk);

    let (code, text) = client.command("FETCH [a]");
    assert_eq!(code, ResponseCode::CommandRejected);
    assert!(!text.is_empty());

    let (code, _) = client.command("WRITE [(!bad,1)]");
    assert_eq!(code, ResponseCode::CommandRejected);

    assert_eq!(
        client.command("READ [b]"),
        (ResponseCode::CommandOk, "[(b,2)]\n".to_string())
    );
    assert_eq!(client.disconnect(), ResponseCode::Disconnected);
    admission.shutdown();
}

#[test]
fn test_non_utf8_command_keeps_session() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path(), 4);
    let (admission, transport) = start(&engine);

    let mut client = Client::register(&transport, "c1");
    admission.admit(client.connect.clone()).unwrap();
    assert_eq!(client.response_code(), ResponseCode::ConnectOk);
    assert_eq!(client.subscribe("a"), ResponseCode::Subscribed);

    client.request.write_all(&[0x05, 0x00, 0x02, 0xff, 0xfe]).unwrap();
    let (code, text) = read_command_response(&mut client.response).unwrap();
    assert_eq!(code, ResponseCode::CommandRejected);
    assert!(text.contains("UTF-8"));

    // Subscription survives and the next request is served
    assert_eq!(engine.store().subscriber_count("a").unwrap(), Some(1));
    assert_eq!(
        client.command("WRITE [(a,7)]"),
        (ResponseCode::CommandOk, String::new())
    );
    assert_eq!(
        client.notification(),
        Notification::Changed {
            key: "a".to_string(),
            value: "7".to_string()
        }
    );

    assert_eq!(client.disconnect(), ResponseCode::Disconnected);
    admission.shutdown();
}

#[test]
fn test_unknown_opcode_is_ignored() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path(), 4);
    let (admission, transport) = start(&engine);

    let mut client = Client::register(&transport, "c1");
    admission.admit(client.connect.clone()).unwrap();
    assert_eq!(client.response_code(), ResponseCode::ConnectOk);

    client.request.write_all(&[0x7f]).unwrap();
    assert_eq!(client.subscribe("a"), ResponseCode::Subscribed);
    assert_eq!(engine.store().subscriber_count("a").unwrap(), Some(1));

    assert_eq!(client.disconnect(), ResponseCode::Disconnected);
    admission.shutdown();
}

#[test]
fn test_session_backup() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path(), 4);
    let (admission, transport) = start(&engine);

    let mut client = Client::register(&transport, "c1");
    let id = admission.admit(client.connect.clone()).unwrap();
    assert_eq!(client.response_code(), ResponseCode::ConnectOk);

    assert_eq!(client.command("BACKUP").0, ResponseCode::CommandOk);
    assert_eq!(client.disconnect(), ResponseCode::Disconnected);
    admission.shutdown();
    engine.backups().wait_idle();

    let path = dir.path().join(format!("session-{}-1.bck", id));
    assert_eq!(
        std::fs::read_to_string(path).unwrap(),
        "(a, 1)\n(b, 2)\n"
    );
}

// =============================================================================
// Cleanup Tests
// =============================================================================

#[test]
fn test_vanished_client_loses_subscriptions() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path(), 4);
    let (admission, transport) = start(&engine);

    let mut client = Client::register(&transport, "c1");
    admission.admit(client.connect.clone()).unwrap();
    assert_eq!(client.response_code(), ResponseCode::ConnectOk);
    assert_eq!(client.subscribe("a"), ResponseCode::Subscribed);
    assert_eq!(client.subscribe("b"), ResponseCode::Subscribed);
    assert_eq!(engine.store().subscriber_count("a").unwrap(), Some(1));

    // Closing the request channel is an implicit disconnect
    client.request.shutdown(std::net::Shutdown::Both).unwrap();
    client.wait_closed();

    assert_eq!(engine.store().subscriber_count("a").unwrap(), Some(0));
    assert_eq!(engine.store().subscriber_count("b").unwrap(), Some(0));
    assert_eq!(engine.store().registry().subscriber_count(), 0);

    // Writes to formerly watched keys still succeed
    engine
        .store()
        .write(vec![("a".to_string(), "after".to_string())])
        .unwrap();
    admission.shutdown();
}

#[test]
fn test_missing_channel_aborts_session() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path(), 1);
    let (admission, transport) = start(&engine);

    let ghost = ConnectRequest {
        request_channel: "ghost-req".to_string(),
        response_channel: "ghost-resp".to_string(),
        notification_channel: "ghost-notif".to_string(),
    };
    admission.admit(ghost).unwrap();

    // The failed session returns its permit, so the next client gets in
    let mut client = Client::register(&transport, "c1");
    admission.admit(client.connect.clone()).unwrap();
    assert_eq!(client.response_code(), ResponseCode::ConnectOk);
    assert_eq!(client.disconnect(), ResponseCode::Disconnected);
    admission.shutdown();
}

// =============================================================================
// Admission Tests
// =============================================================================

#[test]
fn test_gate_caps_active_sessions() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path(), 1);
    let (admission, transport) = start(&engine);
    let admission = Arc::new(admission);

    let mut first = Client::register(&transport, "first");
    let mut second = Client::register(&transport, "second");

    admission.admit(first.connect.clone()).unwrap();
    assert_eq!(first.response_code(), ResponseCode::ConnectOk);
    assert_eq!(admission.active_sessions(), 1);

    let waiting = Arc::clone(&admission);
    let second_connect = second.connect.clone();
    let admitter = thread::spawn(move || waiting.admit(second_connect).unwrap());

    thread::sleep(Duration::from_millis(50));
    assert!(!admitter.is_finished());

    assert_eq!(first.disconnect(), ResponseCode::Disconnected);
    admitter.join().unwrap();
    assert_eq!(second.response_code(), ResponseCode::ConnectOk);
    assert_eq!(second.disconnect(), ResponseCode::Disconnected);

    let admission = Arc::try_unwrap(admission).ok().unwrap();
    admission.shutdown();
}

#[test]
fn test_listen_admits_until_eof() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path(), 4);
    let (admission, transport) = start(&engine);

    let mut one = Client::register(&transport, "one");
    let mut two = Client::register(&transport, "two");

    let mut registration = Vec::new();
    registration.extend_from_slice(&encode_connect(&one.connect).unwrap());
    registration.extend_from_slice(&[9u8; 121]);
    registration.extend_from_slice(&encode_connect(&two.connect).unwrap());

    let admitted = admission.listen(&mut Cursor::new(registration)).unwrap();
    assert_eq!(admitted, 2);

    assert_eq!(one.response_code(), ResponseCode::ConnectOk);
    assert_eq!(two.response_code(), ResponseCode::ConnectOk);
    assert_eq!(one.disconnect(), ResponseCode::Disconnected);
    assert_eq!(two.disconnect(), ResponseCode::Disconnected);
    admission.shutdown();
}

// =============================================================================
// Client API Tests
// =============================================================================

#[test]
fn test_client_api_session() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path(), 4);
    let (admission, transport) = start(&engine);
    let admission = Arc::new(admission);

    let connect = ConnectRequest {
        request_channel: "api-req".to_string(),
        response_channel: "api-resp".to_string(),
        notification_channel: "api-notif".to_string(),
    };
    let connector = MemoryConnector::register(&transport, &connect);

    let (mut registration, mut registration_end) = UnixStream::pair().unwrap();
    let listening = Arc::clone(&admission);
    let listener = thread::spawn(move || listening.listen(&mut registration_end).unwrap());

    let (tx, rx) = channel::unbounded();
    let mut client = KvsClient::connect(&mut registration, &connect, &connector, move |n| {
        let _ = tx.send(n);
    })
    .unwrap();

    assert_eq!(client.subscribe("a").unwrap(), ResponseCode::Subscribed);
    assert_eq!(
        client.subscribe("zz").unwrap(),
        ResponseCode::SubscribeKeyNotFound
    );

    assert_eq!(
        client.command("WRITE [(a,5)]").unwrap(),
        (ResponseCode::CommandOk, String::new())
    );
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        Notification::Changed {
            key: "a".to_string(),
            value: "5".to_string()
        }
    );
    assert_eq!(
        client.command("READ [a]").unwrap(),
        (ResponseCode::CommandOk, "[(a,5)]\n".to_string())
    );

    assert_eq!(client.unsubscribe("a").unwrap(), ResponseCode::Unsubscribed);
    assert_eq!(
        client.unsubscribe("a").unwrap(),
        ResponseCode::SubscriptionNotFound
    );
    assert_eq!(client.disconnect().unwrap(), ResponseCode::Disconnected);

    // The notification thread has finished, so its sender is gone
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(engine.store().subscriber_count("a").unwrap(), Some(0));

    drop(registration);
    assert_eq!(listener.join().unwrap(), 1);

    let admission = Arc::try_unwrap(admission).ok().unwrap();
    admission.shutdown();
}
