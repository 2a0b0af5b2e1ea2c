//! Integration tests for the LAN transport.
//!
//! These tests bind real UDP and TCP sockets on the loopback interface.
//! Each test uses its own fixed discovery ports and points the two
//! transports' broadcast targets at each other, which stands in for a
//! subnet broadcast without needing one.

#[cfg(feature = "lan")]
mod lan {
    use std::sync::Arc;
    use std::time::Duration;

    use tclink_transport::{Connection, LanConfig, LanTransport, Transport, TransportError};

    const HANDSHAKE_TIMEOUT_MS: u64 = 300;

    /// Helper: binds a pair of transports that see each other.
    async fn pair(port_a: u16, port_b: u16) -> (Arc<LanTransport>, Arc<LanTransport>) {
        let config = |own: u16, other: u16| LanConfig {
            discovery_bind: format!("127.0.0.1:{own}").parse().unwrap(),
            broadcast_targets: vec![format!("127.0.0.1:{other}").parse().unwrap()],
            connection_bind: "127.0.0.1:0".parse().unwrap(),
            handshake_timeout_ms: HANDSHAKE_TIMEOUT_MS,
        };
        let a = LanTransport::bind("alpha", config(port_a, port_b))
            .await
            .expect("alpha should bind");
        let b = LanTransport::bind("beta", config(port_b, port_a))
            .await
            .expect("beta should bind");
        (Arc::new(a), Arc::new(b))
    }

    /// Helper: runs both discovery loops in the background.
    fn spawn_discovery(transports: [&Arc<LanTransport>; 2]) -> Vec<tokio::task::JoinHandle<()>> {
        transports
            .into_iter()
            .map(|t| {
                let t = Arc::clone(t);
                tokio::spawn(async move {
                    loop {
                        if t.recv_broadcast().await.is_err() {
                            break;
                        }
                    }
                })
            })
            .collect()
    }

    /// Helper: polls until `transport` knows `peer`, or panics.
    async fn wait_until_known(transport: &LanTransport, peer: &str) {
        for _ in 0..100 {
            if transport.knows(peer) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("{peer} was never discovered");
    }

    #[tokio::test]
    async fn test_broadcast_delivers_packet_with_sender_name() {
        let (a, b) = pair(39101, 39102).await;

        let receiver = {
            let b = Arc::clone(&b);
            tokio::spawn(async move { b.recv_broadcast().await })
        };

        a.announce().await.expect("announce should succeed");
        a.broadcast(&[0, 1, 0xFF, 7]).await.expect("broadcast should succeed");

        let datagram = tokio::time::timeout(Duration::from_secs(2), receiver)
            .await
            .expect("should receive in time")
            .expect("task should complete")
            .expect("recv should succeed");
        assert_eq!(datagram.sender, "alpha");
        assert_eq!(datagram.payload, vec![0, 1, 0xFF, 7]);

        // The announce sent before the packet was recorded on the way.
        assert_eq!(
            b.peer_addr("alpha").map(|addr| addr.port()),
            Some(a.connection_port())
        );
    }

    #[tokio::test]
    async fn test_ask_triggers_announce_and_connection_exchanges_frames() {
        let (a, b) = pair(39103, 39104).await;

        // Both discovery loops run in the background for the whole test.
        let loops = spawn_discovery([&a, &b]);

        assert!(!b.knows("alpha"));
        b.ask("alpha").await.expect("ask should succeed");
        wait_until_known(&b, "alpha").await;

        let acceptor = {
            let a = Arc::clone(&a);
            tokio::spawn(async move { a.accept().await })
        };
        let client = b.connect("alpha").await.expect("connect should succeed");
        let server = acceptor
            .await
            .expect("task should complete")
            .expect("accept should succeed");

        assert_eq!(client.peer(), "alpha");
        assert_eq!(server.peer(), "beta");

        client.send(b"request").await.expect("send should succeed");
        assert_eq!(server.recv().await.unwrap(), Some(b"request".to_vec()));
        server.send(b"reply").await.expect("send should succeed");
        assert_eq!(client.recv().await.unwrap(), Some(b"reply".to_vec()));

        client.close().await.expect("close should succeed");
        assert_eq!(server.recv().await.unwrap(), None);

        for handle in loops {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn test_connect_unknown_peer_fails() {
        let (a, _b) = pair(39105, 39106).await;
        assert!(a.connect("nobody").await.is_err());
    }

    #[tokio::test]
    async fn test_accept_silent_client_times_out_and_next_peer_connects() {
        let (a, b) = pair(39107, 39108).await;
        let loops = spawn_discovery([&a, &b]);
        b.ask("alpha").await.expect("ask should succeed");
        wait_until_known(&b, "alpha").await;

        // Connects at the TCP level and never sends a byte.
        let _silent = tokio::net::TcpStream::connect(("127.0.0.1", a.connection_port()))
            .await
            .expect("raw connect should succeed");

        let client = {
            let b = Arc::clone(&b);
            tokio::spawn(async move { b.connect("alpha").await })
        };

        let wait = Duration::from_secs(2);
        let first = tokio::time::timeout(wait, a.accept())
            .await
            .expect("silent client should not block accept");
        assert!(matches!(first, Err(TransportError::Handshake(_))));

        let server = tokio::time::timeout(wait, a.accept())
            .await
            .expect("second accept should finish in time")
            .expect("accept should succeed");
        assert_eq!(server.peer(), "beta");

        let client = client
            .await
            .expect("task should complete")
            .expect("connect should succeed");
        assert_eq!(client.peer(), "alpha");

        for handle in loops {
            handle.abort();
        }
    }
}
