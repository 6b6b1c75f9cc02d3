use super::*;
use crate::protocol::{ClientSignal, ProducedPayload, ServerSignal};
use crate::signaling::ConnectionStatus;
use crate::testing::{loopback_channel, router_caps, settle, transport_created, FakeEngine, LoopbackServer};

fn client(engine: Arc<FakeEngine>) -> (LiveClient, LoopbackServer) {
    let (channel, server) = loopback_channel();
    let client = LiveClient::with_channel(LiveConfig::default(), engine, channel);
    (client, server)
}

async fn expect_join(server: &LoopbackServer, room: &str) {
    let frame = server.next_frame().await;
    assert_eq!(frame.event, "user-join-room");
    assert_eq!(frame.data, serde_json::json!(room));
}

#[tokio::test]
async fn second_join_is_rejected_while_active() {
    let (client, server) = client(Arc::new(FakeEngine::default()));

    let (session, _events) = client.join("42", Role::Subscriber).await.unwrap();
    expect_join(&server, "42").await;
    assert!(client.has_active_session());

    let err = client.join("43", Role::Subscriber).await.err().unwrap();
    assert!(matches!(err, LiveError::SessionActive));
    assert!(server.try_next_frame().await.is_none());

    session.leave().await;
    assert!(!client.has_active_session());

    let (again, _events) = client.join("43", Role::Subscriber).await.unwrap();
    expect_join(&server, "43").await;
    assert_eq!(again.room().as_str(), "43");
    again.leave().await;
}

#[tokio::test]
async fn dropping_a_session_frees_the_client() {
    let (client, server) = client(Arc::new(FakeEngine::default()));

    let (session, _events) = client.join("7", Role::Publisher).await.unwrap();
    expect_join(&server, "7").await;
    drop(session);

    assert!(!client.has_active_session());
    assert!(client.join("7", Role::Publisher).await.is_ok());
}

#[tokio::test]
async fn publisher_negotiates_and_produces() {
    let engine = Arc::new(FakeEngine::default());
    let (client, server) = client(engine.clone());
    let (session, mut events) = client.join("1", Role::Publisher).await.unwrap();
    expect_join(&server, "1").await;

    let script = async {
        let (signal, frame) = server.expect_signal().await;
        assert!(matches!(signal, ClientSignal::GetRouterRtpCapabilities));
        server.reply(&frame, router_caps()).await;

        let (signal, frame) = server.expect_signal().await;
        assert!(matches!(signal, ClientSignal::CreateProducerTransport { .. }));
        server
            .reply(&frame, transport_created(Direction::Publish, "send-1"))
            .await;

        let (signal, frame) = server.expect_signal().await;
        assert!(matches!(signal, ClientSignal::ConnectProducerTransport { .. }));
        server.reply(&frame, ServerSignal::ProducerConnected).await;

        let (signal, frame) = server.expect_signal().await;
        assert!(matches!(signal, ClientSignal::Produce { kind: MediaKind::Video, .. }));
        server
            .reply(
                &frame,
                ServerSignal::Produced {
                    data: ProducedPayload { id: "prod-v".into() },
                },
            )
            .await;
    };
    let cam = MediaTrack::new("cam", MediaKind::Video);
    let (result, ()) = tokio::join!(session.publish(vec![cam.clone()]), script);

    let producers = result.unwrap();
    assert_eq!(producers[0].id, "prod-v");
    assert_eq!(session.current_status(), SessionStatus::Connected);
    assert_eq!(engine.load_count(), 1);

    let mut statuses = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::StatusChanged(status) = event {
            statuses.push(status);
        }
    }
    assert_eq!(
        statuses,
        vec![SessionStatus::Connecting, SessionStatus::Connected]
    );

    session.toggle_camera(false).await;
    assert!(!cam.is_enabled());

    session.leave().await;
    assert!(cam.is_stopped());
    assert!(engine.last_transport(Direction::Publish).unwrap().is_closed());
    let frame = server.next_frame().await;
    assert_eq!(frame.event, "teacher-leave-room");
}

#[tokio::test]
async fn publish_failure_marks_the_session_failed() {
    let engine = Arc::new(FakeEngine::rejecting_load());
    let (client, server) = client(engine);
    let (session, mut events) = client.join("1", Role::Publisher).await.unwrap();
    expect_join(&server, "1").await;

    let script = async {
        let (_, frame) = server.expect_signal().await;
        server.reply(&frame, router_caps()).await;
    };
    let (result, ()) = tokio::join!(
        session.publish(vec![MediaTrack::new("cam", MediaKind::Video)]),
        script
    );

    assert!(matches!(result, Err(LiveError::CapabilityLoad(_))));
    assert_eq!(session.current_status(), SessionStatus::Failed);
    let mut failed = false;
    while let Ok(event) = events.try_recv() {
        failed |= matches!(event, SessionEvent::NegotiationFailed(_));
    }
    assert!(failed);
    session.leave().await;
}

#[tokio::test]
async fn role_mismatches_are_rejected() {
    let (client, server) = client(Arc::new(FakeEngine::default()));
    let (session, _events) = client.join("1", Role::Subscriber).await.unwrap();
    expect_join(&server, "1").await;

    assert!(session.producer().is_none());
    assert!(session.consumer().is_some());
    let err = session.publish(Vec::new()).await.unwrap_err();
    assert!(matches!(err, LiveError::Protocol(_)));
    assert!(server.try_next_frame().await.is_none());
    session.leave().await;
}

#[tokio::test]
async fn leaving_subscriber_ignores_later_producers() {
    let engine = Arc::new(FakeEngine::default());
    let (client, server) = client(engine.clone());
    let (session, _events) = client.join("1", Role::Subscriber).await.unwrap();
    expect_join(&server, "1").await;

    session.leave().await;
    assert_eq!(
        client.signaling().inner().dispatcher.listener_count().await,
        0
    );

    server.push("new-producer", serde_json::Value::Null).await;
    settle().await;
    assert!(server.try_next_frame().await.is_none());
    assert_eq!(engine.load_attempts(), 0);
}

#[tokio::test]
async fn signaling_loss_fails_the_session_until_restored() {
    let (client, server) = client(Arc::new(FakeEngine::default()));
    let (session, mut events) = client.join("9", Role::Subscriber).await.unwrap();
    expect_join(&server, "9").await;
    assert_eq!(session.current_status(), SessionStatus::Idle);

    server.set_connection(ConnectionStatus::Disconnected);
    settle().await;
    assert_eq!(session.current_status(), SessionStatus::Failed);

    let rejoin = server.rejoin_frames().await;
    assert_eq!(rejoin.len(), 1);
    assert_eq!(rejoin[0].event, "user-join-room");
    assert_eq!(rejoin[0].data, serde_json::json!("9"));

    server.set_connection(ConnectionStatus::Connected);
    settle().await;
    assert_eq!(session.current_status(), SessionStatus::Idle);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::SignalingLost => seen.push("lost"),
            SessionEvent::SignalingRestored => seen.push("restored"),
            _ => {}
        }
    }
    assert_eq!(seen, ["lost", "restored"]);

    session.leave().await;
    assert!(server.rejoin_frames().await.is_empty());
}
