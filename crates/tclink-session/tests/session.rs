//! Integration tests for sessions over the in-process transport.
//!
//! Sessions are synchronous from the caller's side, so these are plain
//! `#[test]`s; listener callbacks report back through std channels.

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Duration;

use tclink_protocol::{ConversionRegistry, Packet, PacketKind, ToPacket, SHUTDOWN_SENTINEL};
use tclink_robot::{
    build_registry, DeviceDescriptionPacket, MotorPowerPacket, RobotPacket, VoltageDataPacket,
};
use tclink_session::{
    ConnectionState, PacketListener, RawPacketListener, ReplyHandler, Session, SessionConfig,
    SessionError,
};
use tclink_transport::{Connection, MemoryNetwork, MemoryTransport, Transport};

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(200);

type RobotSession = Session<MemoryTransport, RobotPacket>;

// =========================================================================
// Helpers
// =========================================================================

fn open(network: &MemoryNetwork, name: &str, opposite: Option<&str>) -> RobotSession {
    let config = SessionConfig {
        opposite: opposite.map(str::to_owned),
        connect_timeout_ms: 2_000,
        reply_timeout_ms: 1_000,
        ..SessionConfig::default()
    };
    Session::open(config, build_registry(), std::future::ready(network.join(name)))
        .expect("session should open")
}

/// A master/slave pair that accept only each other.
fn pair(network: &MemoryNetwork) -> (RobotSession, RobotSession) {
    let master = open(network, "master", Some("slave"));
    let slave = open(network, "slave", Some("master"));
    (master, slave)
}

fn packet_channel() -> (Arc<PacketListener<RobotPacket>>, Receiver<RobotPacket>) {
    let (tx, rx) = mpsc::channel();
    let listener: Arc<PacketListener<RobotPacket>> = Arc::new(move |packet: &RobotPacket| {
        let _ = tx.send(packet.clone());
    });
    (listener, rx)
}

fn raw_channel() -> (Arc<RawPacketListener>, Receiver<Packet>) {
    let (tx, rx) = mpsc::channel();
    let listener: Arc<RawPacketListener> = Arc::new(move |packet: &Packet| {
        let _ = tx.send(packet.clone());
    });
    (listener, rx)
}

fn faulty_listener(_: &RobotPacket) {
    panic!("listener bug");
}

fn wait_for_state(session: &RobotSession, state: ConnectionState) {
    for _ in 0..100 {
        if session.state() == state {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("session {} never reached {state}", session.name());
}

// =========================================================================
// Broadcast and dispatch
// =========================================================================

#[test]
fn test_broadcast_delivers_domain_packet_to_listener() {
    let network = MemoryNetwork::new();
    let (master, slave) = pair(&network);
    let (listener, received) = packet_channel();
    slave.add_packet_listener(listener);

    let description = DeviceDescriptionPacket::new(0, "foo").unwrap();
    master.broadcast(&description).unwrap();

    match received.recv_timeout(WAIT).unwrap() {
        RobotPacket::DeviceDescription(packet) => {
            assert_eq!(packet.device_id(), 0);
            assert_eq!(packet.name(), "foo");
        }
        other => panic!("expected a device description, got {other:?}"),
    }
}

#[test]
fn test_unrecognized_children_reach_raw_listeners() {
    let network = MemoryNetwork::new();
    let (master, slave) = pair(&network);
    let (packets, domain) = packet_channel();
    let (raws, raw) = raw_channel();
    slave.add_packet_listener(packets);
    slave.add_raw_packet_listener(raws);

    let bundle = Packet::combined(
        3,
        vec![MotorPowerPacket::new(3, 0.5).to_packet().unwrap(), Packet::long(3, 9)],
    )
    .unwrap();
    master.broadcast(&bundle).unwrap();

    assert_eq!(
        domain.recv_timeout(WAIT).unwrap(),
        RobotPacket::MotorPower(MotorPowerPacket::new(3, 0.5))
    );
    let leftover = raw.recv_timeout(WAIT).unwrap();
    assert_eq!(leftover.kind(), PacketKind::Long);
    assert_eq!(leftover.as_long(), Some(9));
    assert!(raw.recv_timeout(QUIET).is_err(), "only the long is unrecognized");
}

#[test]
fn test_broadcast_from_non_opposite_is_ignored() {
    let network = MemoryNetwork::new();
    let (master, slave) = pair(&network);
    let intruder = open(&network, "intruder", None);
    let (listener, received) = packet_channel();
    slave.add_packet_listener(listener);

    intruder.broadcast(&VoltageDataPacket::new(1.0)).unwrap();
    master.broadcast(&VoltageDataPacket::new(2.0)).unwrap();

    assert_eq!(
        received.recv_timeout(WAIT).unwrap(),
        RobotPacket::VoltageData(VoltageDataPacket::new(2.0))
    );
    assert!(received.recv_timeout(QUIET).is_err());
}

#[test]
fn test_removed_listener_is_not_called() {
    let network = MemoryNetwork::new();
    let (master, slave) = pair(&network);
    let (kept, kept_rx) = packet_channel();
    let (removed, removed_rx) = packet_channel();
    slave.add_packet_listener(kept);
    let id = slave.add_packet_listener(removed);

    assert!(slave.remove_packet_listener(id));
    assert!(!slave.remove_packet_listener(id));

    master.broadcast(&VoltageDataPacket::new(12.5)).unwrap();
    assert!(kept_rx.recv_timeout(WAIT).is_ok());
    assert!(removed_rx.recv_timeout(QUIET).is_err());
}

#[test]
fn test_listener_added_twice_is_called_once() {
    let network = MemoryNetwork::new();
    let (master, slave) = pair(&network);
    let (listener, received) = packet_channel();
    let first = slave.add_packet_listener(Arc::clone(&listener));
    let second = slave.add_packet_listener(listener);
    assert_eq!(first, second);

    master.broadcast(&VoltageDataPacket::new(12.5)).unwrap();
    assert!(received.recv_timeout(WAIT).is_ok());
    assert!(received.recv_timeout(QUIET).is_err());
}

#[test]
fn test_panicking_listener_does_not_stop_others() {
    let network = MemoryNetwork::new();
    let (master, slave) = pair(&network);
    slave.add_packet_listener(Arc::new(faulty_listener));
    let (listener, received) = packet_channel();
    slave.add_packet_listener(listener);

    master.broadcast(&VoltageDataPacket::new(1.0)).unwrap();
    master.broadcast(&VoltageDataPacket::new(2.0)).unwrap();

    assert!(received.recv_timeout(WAIT).is_ok());
    assert!(received.recv_timeout(WAIT).is_ok(), "dispatch survives the panic");
}

#[test]
fn test_set_conversion_registry_changes_dispatch() {
    let network = MemoryNetwork::new();
    let (master, slave) = pair(&network);
    let (packets, domain) = packet_channel();
    let (raws, raw) = raw_channel();
    slave.add_packet_listener(packets);
    slave.add_raw_packet_listener(raws);

    slave.set_conversion_registry(ConversionRegistry::new());
    assert!(slave.conversion_registry().is_empty());

    master.broadcast(&MotorPowerPacket::new(3, -0.2)).unwrap();
    let packet = raw.recv_timeout(WAIT).unwrap();
    assert_eq!(packet.as_double(), Some(-0.2));
    assert!(domain.recv_timeout(QUIET).is_err());
}

// =========================================================================
// Malformed frames
// =========================================================================

/// Kind byte past every known packet kind.
const UNDECODABLE: [u8; 3] = [0xEE, 0x00, 0x00];

#[test]
fn test_undecodable_broadcast_does_not_stop_discovery() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let network = MemoryNetwork::new();
    let master = network.join("master").unwrap();
    let slave = open(&network, "slave", Some("master"));
    let (listener, received) = packet_channel();
    slave.add_packet_listener(listener);

    let valid = tclink_protocol::encode(&VoltageDataPacket::new(3.3).to_packet().unwrap()).unwrap();
    runtime.block_on(master.broadcast(&UNDECODABLE)).unwrap();
    runtime.block_on(master.broadcast(&valid)).unwrap();

    assert_eq!(
        received.recv_timeout(WAIT).unwrap(),
        RobotPacket::VoltageData(VoltageDataPacket::new(3.3))
    );
    assert!(received.recv_timeout(QUIET).is_err());
    assert!(!slave.is_closed());
}

#[test]
fn test_undecodable_request_gets_empty_reply_and_connection_survives() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let network = MemoryNetwork::new();
    let master = network.join("master").unwrap();
    let slave = open(&network, "slave", Some("master"));
    let (listener, received) = packet_channel();
    slave.add_packet_listener(listener);
    let handler: Arc<ReplyHandler> = Arc::new(|_: &Packet| Some(b"ack".to_vec()));
    slave.set_reply_handler(handler);

    let client = runtime.block_on(master.connect("slave")).unwrap();
    let valid = tclink_protocol::encode(&VoltageDataPacket::new(3.3).to_packet().unwrap()).unwrap();
    let replies = runtime.block_on(async {
        client.send(&UNDECODABLE).await?;
        let first = tokio::time::timeout(WAIT, client.recv()).await.expect("reply in time")?;
        client.send(&valid).await?;
        let second = tokio::time::timeout(WAIT, client.recv()).await.expect("reply in time")?;
        Ok::<_, tclink_transport::TransportError>((first, second))
    });

    assert_eq!(replies.unwrap(), (Some(Vec::new()), Some(b"ack".to_vec())));
    assert_eq!(
        received.recv_timeout(WAIT).unwrap(),
        RobotPacket::VoltageData(VoltageDataPacket::new(3.3))
    );
}

// =========================================================================
// Connection and request/reply
// =========================================================================

#[test]
fn test_send_while_disconnected_fails() {
    let network = MemoryNetwork::new();
    let (master, _slave) = pair(&network);
    assert_eq!(master.state(), ConnectionState::Disconnected);

    let err = master.send(&MotorPowerPacket::new(3, 0.1)).unwrap_err();
    assert!(matches!(err, SessionError::NotConnected));
}

#[test]
fn test_connect_and_send_returns_reply() {
    let network = MemoryNetwork::new();
    let (master, slave) = pair(&network);
    let (listener, received) = packet_channel();
    slave.add_packet_listener(listener);
    let handler: Arc<ReplyHandler> = Arc::new(|_: &Packet| Some(b"ack".to_vec()));
    slave.set_reply_handler(handler);

    master.connect().unwrap();
    assert_eq!(master.state(), ConnectionState::Connected);
    assert!(master.is_connected());

    let reply = master.send(&MotorPowerPacket::new(3, -0.2)).unwrap();
    assert_eq!(reply, Some(b"ack".to_vec()));
    assert_eq!(
        received.recv_timeout(WAIT).unwrap(),
        RobotPacket::MotorPower(MotorPowerPacket::new(3, -0.2))
    );
}

#[test]
fn test_send_without_reply_handler_returns_none() {
    let network = MemoryNetwork::new();
    let (master, _slave) = pair(&network);

    master.connect().unwrap();
    let reply = master.send(&VoltageDataPacket::new(12.0)).unwrap();
    assert_eq!(reply, None);
}

#[test]
fn test_connect_twice_is_noop() {
    let network = MemoryNetwork::new();
    let (master, _slave) = pair(&network);

    master.connect().unwrap();
    master.connect().unwrap();
    assert!(master.is_connected());
}

#[test]
fn test_connect_without_opposite_fails() {
    let network = MemoryNetwork::new();
    let loner = open(&network, "loner", None);
    assert!(matches!(loner.connect(), Err(SessionError::NoOpposite)));
}

#[test]
fn test_connect_to_absent_peer_times_out() {
    let network = MemoryNetwork::new();
    let master = open(&network, "master", Some("ghost"));

    let err = master.connect_within(Duration::from_millis(100)).unwrap_err();
    assert!(matches!(err, SessionError::ConnectTimeout(_)));
    assert_eq!(master.state(), ConnectionState::Disconnected);
}

#[test]
fn test_connect_waits_for_late_peer() {
    let network = MemoryNetwork::new();
    let master = Arc::new(open(&network, "master", Some("slave")));

    let connecting = {
        let master = Arc::clone(&master);
        std::thread::spawn(move || master.connect())
    };
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(master.state(), ConnectionState::Connecting);

    let _slave = open(&network, "slave", Some("master"));
    connecting.join().unwrap().unwrap();
    assert!(master.is_connected());
}

#[test]
fn test_disconnect_returns_to_disconnected() {
    let network = MemoryNetwork::new();
    let (master, _slave) = pair(&network);

    master.connect().unwrap();
    master.disconnect().unwrap();
    assert_eq!(master.state(), ConnectionState::Disconnected);
    assert!(matches!(
        master.send(&VoltageDataPacket::new(1.0)),
        Err(SessionError::NotConnected)
    ));
}

#[test]
fn test_disconnect_does_not_wait_for_pending_reply() {
    let network = MemoryNetwork::new();
    let (master, slave) = pair(&network);
    let master = Arc::new(master);
    let handler: Arc<ReplyHandler> = Arc::new(|_: &Packet| {
        std::thread::sleep(Duration::from_millis(800));
        Some(b"late".to_vec())
    });
    slave.set_reply_handler(handler);
    master.connect().unwrap();

    let sending = {
        let master = Arc::clone(&master);
        std::thread::spawn(move || master.send(&VoltageDataPacket::new(1.0)))
    };
    std::thread::sleep(Duration::from_millis(100));

    let started = std::time::Instant::now();
    master.disconnect().unwrap();
    assert!(started.elapsed() < Duration::from_millis(400), "disconnect waited for the reply");
    assert_eq!(master.state(), ConnectionState::Disconnected);

    let _ = sending.join().unwrap();
    assert_eq!(master.state(), ConnectionState::Disconnected);
}

#[test]
fn test_set_opposite_drops_connection() {
    let network = MemoryNetwork::new();
    let (master, _slave) = pair(&network);
    master.connect().unwrap();

    master.set_opposite(Some("other".into())).unwrap();
    assert_eq!(master.opposite().as_deref(), Some("other"));
    assert_eq!(master.state(), ConnectionState::Disconnected);
}

// =========================================================================
// Close
// =========================================================================

#[test]
fn test_close_is_idempotent_and_rejects_later_calls() {
    let network = MemoryNetwork::new();
    let (master, _slave) = pair(&network);

    master.close();
    master.close();
    assert!(master.is_closed());
    assert_eq!(master.state(), ConnectionState::Disconnected);

    let packet = VoltageDataPacket::new(1.0);
    assert!(matches!(master.send(&packet), Err(SessionError::Closed)));
    assert!(matches!(master.broadcast(&packet), Err(SessionError::Closed)));
    assert!(matches!(master.connect(), Err(SessionError::Closed)));
    assert!(!network.members().contains(&"master".to_owned()));
}

#[test]
fn test_close_sends_shutdown_sentinel_to_peer() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let network = MemoryNetwork::new();
    let device = network.join("device").unwrap();
    runtime.block_on(device.announce()).unwrap();

    let master = open(&network, "master", Some("device"));
    master.connect().unwrap();
    let server = runtime.block_on(device.accept()).unwrap();
    assert_eq!(server.peer(), "master");

    master.close();
    let frame = runtime
        .block_on(async { tokio::time::timeout(WAIT, server.recv()).await })
        .expect("sentinel should arrive in time")
        .unwrap();
    assert_eq!(frame, Some(SHUTDOWN_SENTINEL.to_vec()));
}

#[test]
fn test_peer_close_disconnects_opposite() {
    let network = MemoryNetwork::new();
    let (master, slave) = pair(&network);
    master.connect().unwrap();
    slave.connect().unwrap();

    master.close();
    wait_for_state(&slave, ConnectionState::Disconnected);
    assert!(!slave.is_closed(), "only the connection goes away");
}

#[test]
fn test_invalid_config_is_rejected() {
    let network = MemoryNetwork::new();
    let config = SessionConfig {
        discovery_workers: 0,
        ..SessionConfig::default()
    };
    let result: Result<RobotSession, _> =
        Session::open(config, build_registry(), std::future::ready(network.join("x")));
    assert!(matches!(result, Err(SessionError::InvalidConfig(_))));
}
