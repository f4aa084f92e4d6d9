//! Integration tests for the session engine: registry semantics, bind
//! tables, request/response correlation, dispatch routing, teardown, and the
//! notification bus.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use brazier_protocol::{
    ATTR_FORWARD_TO_CLIENT, ATTR_TARGET_ID, Attribute, AttributeValue, ConnectRequest,
    ConnectResponse, EntityId, Header, NOTIFY_FIND_GAME_REQUEST, NOTIFY_FIND_GAME_RESPONSE,
    Notification, RESPONSE_SERVICE_ID, WireNotification, encode_frame, read_frame, service_hash,
};
use brazier_session::{
    CONNECTION_SERVICE_NAME, ConnectionServiceBinder, GameServer, NOTIFICATION_LISTENER_NAME,
    Service, ServiceBinder, ServiceError, ServiceFuture, ServiceRegistry, Session, SessionConfig,
    SessionError, SessionState,
};
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};

// =========================================================================
// Test services
// =========================================================================

const ECHO_NAME: &str = "test.EchoService";
const SHOUT_NAME: &str = "test.ShoutService";

/// Replies with the request body unchanged.
struct EchoService;

impl Service for EchoService {
    fn name(&self) -> &'static str {
        ECHO_NAME
    }

    fn methods(&self) -> &'static [&'static str] {
        &["", "Echo"]
    }

    fn invoke<'a>(&'a self, method_id: u32, body: &'a [u8]) -> ServiceFuture<'a> {
        Box::pin(async move {
            match method_id {
                1 => Ok(Some(body.to_vec())),
                _ => Err(ServiceError::UnknownMethod {
                    service: ECHO_NAME,
                    method_id,
                }),
            }
        })
    }
}

struct EchoBinder;

impl ServiceBinder for EchoBinder {
    fn bind(&self, _session: Option<&Arc<Session>>) -> Arc<dyn Service> {
        Arc::new(EchoService)
    }
}

/// Replies with a fixed marker, used to observe which binding won a slot.
struct ShoutService;

impl Service for ShoutService {
    fn name(&self) -> &'static str {
        SHOUT_NAME
    }

    fn methods(&self) -> &'static [&'static str] {
        &["", "Shout"]
    }

    fn invoke<'a>(&'a self, _method_id: u32, _body: &'a [u8]) -> ServiceFuture<'a> {
        Box::pin(async move { Ok(Some(b"SHOUT".to_vec())) })
    }
}

struct ShoutBinder;

impl ServiceBinder for ShoutBinder {
    fn bind(&self, _session: Option<&Arc<Session>>) -> Arc<dyn Service> {
        Arc::new(ShoutService)
    }
}

/// Same wire name as [`EchoService`] but reversed output, used to pin the
/// hash-collision last-registrant-wins hazard.
struct ReverseEchoService;

impl Service for ReverseEchoService {
    fn name(&self) -> &'static str {
        ECHO_NAME
    }

    fn methods(&self) -> &'static [&'static str] {
        &["", "Echo"]
    }

    fn invoke<'a>(&'a self, _method_id: u32, body: &'a [u8]) -> ServiceFuture<'a> {
        Box::pin(async move {
            let mut reversed = body.to_vec();
            reversed.reverse();
            Ok(Some(reversed))
        })
    }
}

struct ReverseEchoBinder;

impl ServiceBinder for ReverseEchoBinder {
    fn bind(&self, _session: Option<&Arc<Session>>) -> Arc<dyn Service> {
        Arc::new(ReverseEchoService)
    }
}

/// Client-export stub standing in for the notification listener import.
struct ListenerService;

impl Service for ListenerService {
    fn name(&self) -> &'static str {
        NOTIFICATION_LISTENER_NAME
    }

    fn methods(&self) -> &'static [&'static str] {
        &["", "OnNotificationReceived"]
    }

    fn invoke<'a>(&'a self, _method_id: u32, _body: &'a [u8]) -> ServiceFuture<'a> {
        Box::pin(async move { Err(ServiceError::ClientExport(NOTIFICATION_LISTENER_NAME)) })
    }
}

struct ListenerBinder;

impl ServiceBinder for ListenerBinder {
    fn bind(&self, _session: Option<&Arc<Session>>) -> Arc<dyn Service> {
        Arc::new(ListenerService)
    }
}

// =========================================================================
// Helpers
// =========================================================================

type ClientIo = tokio::io::DuplexStream;

fn registry() -> Arc<ServiceRegistry> {
    let mut registry = ServiceRegistry::new();
    registry.register(Arc::new(ConnectionServiceBinder));
    registry.register(Arc::new(EchoBinder));
    registry.register(Arc::new(ShoutBinder));
    registry.register(Arc::new(ListenerBinder));
    Arc::new(registry)
}

fn no_games() -> Arc<HashMap<String, Arc<dyn GameServer>>> {
    Arc::new(HashMap::new())
}

/// Spawns a session over an in-memory stream. Tests feed `handle_packet`
/// directly and read the frames the session writes from the returned client
/// end. The unused server read half is kept alive alongside.
fn spawn_session(
    registry: Arc<ServiceRegistry>,
    config: SessionConfig,
) -> (Arc<Session>, ClientIo, ReadHalf<ClientIo>) {
    let (server_io, client_io) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write): (_, WriteHalf<ClientIo>) = tokio::io::split(server_io);
    let session = Session::spawn(registry, no_games(), config, server_write);
    (session, client_io, server_read)
}

async fn next_frame(client: &mut ClientIo) -> (Header, Vec<u8>) {
    tokio::time::timeout(Duration::from_secs(5), read_frame(client))
        .await
        .expect("frame should arrive")
        .expect("frame should decode")
}

async fn assert_no_frame(client: &mut ClientIo) {
    let result = tokio::time::timeout(Duration::from_millis(100), read_frame(client)).await;
    assert!(result.is_err(), "no further frame should be written");
}

// =========================================================================
// Registry
// =========================================================================

#[tokio::test]
async fn test_registry_lookup_returns_binder_with_matching_name() {
    let registry = registry();
    let binder = registry
        .lookup(service_hash(ECHO_NAME))
        .expect("echo should be registered");
    assert_eq!(binder.bind(None).name(), ECHO_NAME);
}

#[tokio::test]
async fn test_registry_lookup_unknown_hash_is_none() {
    let registry = registry();
    assert!(registry.lookup(0xdead_beef).is_none());
}

#[tokio::test]
async fn test_registry_identical_names_last_registrant_wins() {
    // Two binders whose names hash identically silently overwrite; the
    // registry keeps whichever registered last.
    let mut registry = ServiceRegistry::new();
    registry.register(Arc::new(EchoBinder));
    registry.register(Arc::new(ReverseEchoBinder));

    let binder = registry.lookup(service_hash(ECHO_NAME)).unwrap();
    let service = binder.bind(None);
    let out = service.invoke(1, b"ab").await.unwrap().unwrap();
    assert_eq!(out, b"ba", "the later registrant's behavior should win");
}

// =========================================================================
// Export / import binding
// =========================================================================

#[tokio::test]
async fn test_bind_export_unknown_hash_installs_placeholder() {
    let (session, _client, _srv) = spawn_session(registry(), SessionConfig::default());

    // Binding an unknown hash must not fail...
    session.bind_export(5, 0x0bad_cafe);
    assert_eq!(session.export_count(), 6);

    // ...but invoking the placeholder slot is fatal.
    let header = Header::request(5, 1, 1, 0);
    let err = session.handle_packet(&header, Vec::new()).await.unwrap_err();
    assert!(matches!(err, SessionError::UnknownService { service_id: 5 }));
}

#[tokio::test]
async fn test_bind_export_rebind_overwrites() {
    let (session, mut client, _srv) = spawn_session(registry(), SessionConfig::default());

    session.bind_export(1, service_hash(ECHO_NAME));
    session.bind_export(1, service_hash(SHOUT_NAME));

    let header = Header::request(1, 1, 9, 2);
    session.handle_packet(&header, b"hi".to_vec()).await.unwrap();

    let (reply, body) = next_frame(&mut client).await;
    assert_eq!(reply.token, 9);
    assert_eq!(body, b"SHOUT", "the second binding should win the slot");
}

#[tokio::test]
async fn test_imported_service_found_by_name() {
    let (session, _client, _srv) = spawn_session(registry(), SessionConfig::default());
    session.bind_import(1, service_hash(ECHO_NAME));

    assert!(session.imported_service(ECHO_NAME).is_some());
    assert!(session.imported_service("test.NoSuchService").is_none());
    // The connection service is implicitly imported at index 0.
    assert!(session.imported_service(CONNECTION_SERVICE_NAME).is_some());
}

// =========================================================================
// Request / response correlation
// =========================================================================

#[tokio::test]
async fn test_make_request_header_tokens_strictly_increase() {
    let (session, _client, _srv) = spawn_session(registry(), SessionConfig::default());
    session.bind_import(1, service_hash(ECHO_NAME));

    let tokens: Vec<u32> = (0..5)
        .map(|_| {
            session
                .make_request_header(&EchoService, 1, 0)
                .unwrap()
                .token
        })
        .collect();

    for pair in tokens.windows(2) {
        assert!(pair[1] > pair[0], "tokens must strictly increase: {tokens:?}");
    }
}

#[tokio::test]
async fn test_make_request_header_undeclared_import_fails() {
    let (session, _client, _srv) = spawn_session(registry(), SessionConfig::default());

    let err = session.make_request_header(&EchoService, 1, 0).unwrap_err();
    assert!(matches!(
        err,
        SessionError::UndeclaredImport { name: ECHO_NAME }
    ));
}

#[tokio::test]
async fn test_call_delivers_correlated_response() {
    let (session, mut client, _srv) = spawn_session(registry(), SessionConfig::default());
    session.bind_import(1, service_hash(ECHO_NAME));

    let caller = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.call(&EchoService, 1, b"ping").await })
    };

    // The request goes out with the import's index and a fresh token.
    let (request, body) = next_frame(&mut client).await;
    assert_eq!(request.service_id, 1);
    assert_eq!(request.method_id, 1);
    assert_eq!(body, b"ping");

    // Answer it on the same token.
    let reply = Header::response(request.token, 4);
    session.handle_packet(&reply, b"pong".to_vec()).await.unwrap();

    let response = caller.await.unwrap().unwrap();
    assert_eq!(response, b"pong");
}

#[tokio::test]
async fn test_stale_response_token_dropped_not_fatal() {
    let (session, mut client, _srv) = spawn_session(registry(), SessionConfig::default());

    let reply = Header::response(4242, 3);
    session.handle_packet(&reply, b"old".to_vec()).await.unwrap();

    // Nothing goes out and the session stays alive.
    assert_no_frame(&mut client).await;
    assert_ne!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_call_with_response_timeout_times_out() {
    let config = SessionConfig {
        response_timeout: Some(Duration::from_millis(50)),
        ..SessionConfig::default()
    };
    let (session, _client, _srv) = spawn_session(registry(), config);
    session.bind_import(1, service_hash(ECHO_NAME));

    let err = session.call(&EchoService, 1, b"ping").await.unwrap_err();
    assert!(matches!(err, SessionError::ResponseTimeout { .. }));
}

#[tokio::test]
async fn test_disconnect_fails_in_flight_call() {
    let (session, mut client, _srv) = spawn_session(registry(), SessionConfig::default());
    session.bind_import(1, service_hash(ECHO_NAME));

    let caller = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.call(&EchoService, 1, b"ping").await })
    };
    // Wait for the request to be in flight.
    let _ = next_frame(&mut client).await;

    session.disconnect().await;

    let err = caller.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::ResponseDropped { .. }));
}

// =========================================================================
// Dispatch routing
// =========================================================================

#[tokio::test]
async fn test_response_service_id_never_routes_to_exports() {
    let (session, mut client, _srv) = spawn_session(registry(), SessionConfig::default());
    // Even with an export bound at index 254, a frame with service id 254 is
    // response correlation, never an invocation.
    session.bind_export(RESPONSE_SERVICE_ID as usize, service_hash(ECHO_NAME));

    let header = Header::response(7, 2);
    session.handle_packet(&header, b"xy".to_vec()).await.unwrap();

    // A stale response: dropped, no echo reply frame.
    assert_no_frame(&mut client).await;
}

#[tokio::test]
async fn test_request_to_bound_export_yields_single_response_frame() {
    let (session, mut client, _srv) = spawn_session(registry(), SessionConfig::default());
    session.bind_export(3, service_hash(ECHO_NAME));

    let header = Header::request(3, 1, 77, 5);
    session.handle_packet(&header, b"hello".to_vec()).await.unwrap();

    let (reply, body) = next_frame(&mut client).await;
    assert_eq!(reply.service_id, RESPONSE_SERVICE_ID);
    assert_eq!(reply.token, 77);
    assert_eq!(body, b"hello");
    assert_no_frame(&mut client).await;
}

#[tokio::test]
async fn test_invoke_error_is_fatal_handler_error() {
    let (session, _client, _srv) = spawn_session(registry(), SessionConfig::default());
    session.bind_export(1, service_hash(ECHO_NAME));

    // Method 9 is outside the echo service's table.
    let header = Header::request(1, 9, 5, 0);
    let err = session.handle_packet(&header, Vec::new()).await.unwrap_err();
    assert!(matches!(err, SessionError::Handler { service: ECHO_NAME, .. }));
}

#[tokio::test]
async fn test_handle_packet_after_disconnect_is_protocol_violation() {
    let (session, _client, _srv) = spawn_session(registry(), SessionConfig::default());
    session.disconnect().await;

    let header = Header::request(0, 1, 1, 0);
    let err = session.handle_packet(&header, Vec::new()).await.unwrap_err();
    assert!(matches!(err, SessionError::ProtocolViolation(_)));
}

// =========================================================================
// Connect handshake (connection service)
// =========================================================================

#[tokio::test]
async fn test_connect_handshake_assigns_new_export_indices() {
    let (session, mut client, _srv) = spawn_session(registry(), SessionConfig::default());

    let request = ConnectRequest {
        imported_service_hashes: vec![service_hash(ECHO_NAME), service_hash(SHOUT_NAME)],
        exported_service_hashes: vec![service_hash(NOTIFICATION_LISTENER_NAME)],
    }
    .encode();
    let header = Header::request(0, 1, 1, request.len() as u32);
    session.handle_packet(&header, request).await.unwrap();

    let (reply, body) = next_frame(&mut client).await;
    assert_eq!(reply.service_id, RESPONSE_SERVICE_ID);
    assert_eq!(reply.token, 1);
    let response = ConnectResponse::decode(&body).unwrap();
    assert_eq!(response.bind_result, 0);
    // Index 0 is the connection service; the requested imports follow in
    // request order.
    assert_eq!(response.imported_service_ids, vec![1, 2]);

    // The client's export list populated our import table.
    assert!(session.imported_service(NOTIFICATION_LISTENER_NAME).is_some());

    // The freshly bound exports are live.
    let echo = Header::request(1, 1, 2, 3);
    session.handle_packet(&echo, b"abc".to_vec()).await.unwrap();
    let (echo_reply, echo_body) = next_frame(&mut client).await;
    assert_eq!(echo_reply.token, 2);
    assert_eq!(echo_body, b"abc");
}

#[tokio::test]
async fn test_connect_handshake_reports_implicit_connection_index() {
    let (session, mut client, _srv) = spawn_session(registry(), SessionConfig::default());

    let request = ConnectRequest {
        imported_service_hashes: vec![service_hash(CONNECTION_SERVICE_NAME)],
        exported_service_hashes: Vec::new(),
    }
    .encode();
    let header = Header::request(0, 1, 1, request.len() as u32);
    session.handle_packet(&header, request).await.unwrap();

    let (_, body) = next_frame(&mut client).await;
    let response = ConnectResponse::decode(&body).unwrap();
    assert_eq!(response.bind_result, 0);
    assert_eq!(
        response.imported_service_ids,
        vec![0],
        "the connection service keeps its pre-bound index"
    );
}

// =========================================================================
// Writer ordering and teardown
// =========================================================================

#[tokio::test]
async fn test_outgoing_frames_preserve_queue_order() {
    let (session, mut client, _srv) = spawn_session(registry(), SessionConfig::default());

    for token in 1..=3u32 {
        session
            .queue_packet(&Header::response(token, 0), &[])
            .await
            .unwrap();
    }

    for expected in 1..=3u32 {
        let (header, _) = next_frame(&mut client).await;
        assert_eq!(header.token, expected, "frames must leave in queue order");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disconnect_releases_all_waiters_before_returning() {
    let (session, _client, _srv) = spawn_session(registry(), SessionConfig::default());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let session = Arc::clone(&session);
        handles.push(tokio::spawn(async move {
            session.wait_for(SessionState::Disconnected).await;
        }));
    }
    // Give the waiters a beat to register.
    tokio::time::sleep(Duration::from_millis(20)).await;

    session.disconnect().await;

    for handle in handles {
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should have been released")
            .unwrap();
    }
}

#[tokio::test]
async fn test_signal_on_fires_once_state_is_reached() {
    let (session, _client, _srv) = spawn_session(registry(), SessionConfig::default());
    let signal = session.signal_on(SessionState::Ready);

    session.transition(SessionState::Ready).await;

    tokio::time::timeout(Duration::from_secs(1), signal)
        .await
        .expect("signal should fire")
        .unwrap();
}

// =========================================================================
// Notification bus
// =========================================================================

fn attach_bus(
    session: &Arc<Session>,
) -> (
    mpsc::UnboundedReceiver<Notification>,
    mpsc::UnboundedSender<Notification>,
) {
    let (to_game_tx, to_game_rx) = mpsc::unbounded_channel();
    let (from_game_tx, from_game_rx) = mpsc::unbounded_channel();
    session.attach_game_channels(to_game_tx, from_game_rx);
    (to_game_rx, from_game_tx)
}

#[tokio::test]
async fn test_once_notified_double_registration_is_typed_error() {
    let (session, _client, _srv) = spawn_session(registry(), SessionConfig::default());

    session
        .once_notified("X", Box::new(|_| Box::pin(async { Ok(()) })))
        .unwrap();
    let err = session
        .once_notified("X", Box::new(|_| Box::pin(async { Ok(()) })))
        .unwrap_err();

    assert!(matches!(err, SessionError::OnceAlreadyPending { kind } if kind == "X"));
}

#[tokio::test]
async fn test_once_notified_fires_exactly_once_then_falls_through() {
    let (session, _client, _srv) = spawn_session(registry(), SessionConfig::default());
    let (_to_game, from_game) = attach_bus(&session);

    let (fired_tx, fired_rx) = oneshot::channel();
    session
        .once_notified(
            "X",
            Box::new(move |n| {
                Box::pin(async move {
                    let _ = fired_tx.send(n.kind);
                    Ok(())
                })
            }),
        )
        .unwrap();

    // First delivery consumes the registration.
    from_game.send(Notification::new("X")).unwrap();
    let kind = tokio::time::timeout(Duration::from_secs(1), fired_rx)
        .await
        .expect("handler should fire")
        .unwrap();
    assert_eq!(kind, "X");

    // Second delivery finds no handler and no forward flag: fatal, the
    // dispatch loop tears the session down.
    from_game.send(Notification::new("X")).unwrap();
    tokio::time::timeout(
        Duration::from_secs(1),
        session.wait_for(SessionState::Disconnected),
    )
    .await
    .expect("unhandled notification should disconnect the session");
}

#[tokio::test]
async fn test_forward_to_client_fallback_reencodes_payload() {
    let (session, mut client, _srv) = spawn_session(registry(), SessionConfig::default());
    session.bind_import(1, service_hash(NOTIFICATION_LISTENER_NAME));
    let (_to_game, from_game) = attach_bus(&session);

    let notification = Notification::new("WTCG.UtilNotificationMessage")
        .with(ATTR_FORWARD_TO_CLIENT, true)
        .with(ATTR_TARGET_ID, EntityId::new(0, 0))
        .with("message_type", 116i64);
    from_game.send(notification).unwrap();

    let (header, body) = next_frame(&mut client).await;
    assert_eq!(header.service_id, 1, "goes out via the listener import");
    assert_eq!(header.method_id, 1);
    let wire = WireNotification::decode(&body).unwrap();
    assert_eq!(wire.kind, "WTCG.UtilNotificationMessage");
    assert_eq!(wire.target_id, Some(EntityId::new(0, 0)));
    // Reserved attributes are consumed, payload attributes forwarded.
    assert_eq!(wire.attributes.len(), 1);
    assert_eq!(wire.attributes[0].name, "message_type");
}

#[tokio::test]
async fn test_notify_game_without_game_layer_errors() {
    let (session, _client, _srv) = spawn_session(registry(), SessionConfig::default());
    let err = session.notify_game(Notification::new("X")).unwrap_err();
    assert!(matches!(err, SessionError::NoGameLayer));
}

#[tokio::test]
async fn test_cross_layer_find_game_round_trip() {
    // Scenario: the platform side pushes a find-game request onto the bus,
    // the game layer consumes it and answers, and the platform-side one-shot
    // handler recovers the response attributes via the flattened map.
    let (session, _client, _srv) = spawn_session(registry(), SessionConfig::default());
    let (mut to_game, from_game) = attach_bus(&session);

    let (resp_tx, resp_rx) = oneshot::channel::<Vec<Attribute>>();
    session
        .once_notified(
            NOTIFY_FIND_GAME_RESPONSE,
            Box::new(move |n| {
                Box::pin(async move {
                    let _ = resp_tx.send(n.attributes);
                    Ok(())
                })
            }),
        )
        .unwrap();

    session
        .notify_game(Notification::new(NOTIFY_FIND_GAME_REQUEST).with("deck", 42i64))
        .unwrap();

    // Game layer: receive the request, answer asynchronously.
    let request = tokio::time::timeout(Duration::from_secs(1), to_game.recv())
        .await
        .expect("game layer should receive the request")
        .unwrap();
    assert_eq!(request.kind, NOTIFY_FIND_GAME_REQUEST);
    assert_eq!(request.get("deck").and_then(AttributeValue::as_int), Some(42));

    from_game
        .send(
            Notification::new(NOTIFY_FIND_GAME_RESPONSE)
                .with("queued", true)
                .with("requestId", 1u64),
        )
        .unwrap();

    let attributes = tokio::time::timeout(Duration::from_secs(1), resp_rx)
        .await
        .expect("handler should fire")
        .unwrap();
    let response = Notification {
        kind: NOTIFY_FIND_GAME_RESPONSE.to_string(),
        attributes,
    };
    let map = response.flattened();
    assert_eq!(map.len(), 2);
    assert_eq!(map["queued"].as_bool(), Some(true));
    assert_eq!(map["requestId"].as_uint(), Some(1));
}

// =========================================================================
// Frame-level sanity through the codec
// =========================================================================

#[tokio::test]
async fn test_encoded_request_frame_round_trips_through_codec() {
    // The same codec serves both directions; a frame built for the queue
    // parses back identically.
    let header = Header::request(1, 1, 3, 4);
    let frame = encode_frame(&header, b"body").unwrap();
    let (decoded, body) = read_frame(&mut frame.as_slice()).await.unwrap();
    assert_eq!(decoded, header);
    assert_eq!(body, b"body");
}
