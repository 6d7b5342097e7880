//! WebSocket gateway: one task per connected client.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use inbox_types::{BroadcastMessage, ClientAction};

use super::registry::{Connection, ConnectionRegistry};
use super::Notifier;

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(notifier): State<Notifier>) -> impl IntoResponse {
    let registry = notifier.registry().clone();
    ws.on_upgrade(move |socket| handle_socket(socket, registry))
}

/// Drive one client connection until it disconnects.
///
/// Outbound frames (broadcasts and pongs) go through the connection's channel
/// and are written by a separate task, so a broadcast never waits on this
/// client's next inbound message.
pub async fn handle_socket(socket: WebSocket, registry: ConnectionRegistry) {
    let (connection, mut outbound) = Connection::open();
    let connection_id = connection.id();
    registry.register(connection.clone()).await;
    let connections = registry.len().await;
    tracing::info!(
        connection_id = %connection_id,
        connections,
        "WebSocket client connected"
    );

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task: forward queued frames to the socket
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if ws_tx.send(frame).await.is_err() {
                return;
            }
        }
        let _ = ws_tx.close().await;
    });

    loop {
        tokio::select! {
            // The socket can no longer be written to
            _ = &mut writer => {
                tracing::debug!(connection_id = %connection_id, "WebSocket writer finished");
                break;
            }
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(ClientAction::Ping) = ClientAction::parse(&text) {
                            connection.send_message(&BroadcastMessage::Pong);
                        } else {
                            tracing::trace!(connection_id = %connection_id, "Ignoring unrecognised message");
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Binary frames are ignored; protocol pings are answered by the transport
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %connection_id, "WebSocket receive error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    registry.unregister(connection_id).await;
    // Dropping the last sender lets the writer flush and close the socket
    drop(connection);
    tracing::info!(connection_id = %connection_id, "WebSocket client disconnected");
    if registry.is_empty().await {
        tracing::debug!("No WebSocket clients connected");
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::StaticSource;
    use super::super::{routes, ConnectionRegistry, Notifier};
    use axum::Router;
    use futures::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio_tungstenite::{
        connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
    };

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start_server(notifier: Notifier) -> SocketAddr {
        let app: Router = routes().with_state(notifier);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn connect(addr: SocketAddr) -> Client {
        let (client, _) = connect_async(format!("ws://{}/ws/mcp", addr))
            .await
            .expect("should connect");
        client
    }

    async fn wait_for_connections(registry: &ConnectionRegistry, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while registry.len().await != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("registry should reach expected size");
    }

    async fn next_json(client: &mut Client) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("should receive a frame")
            .expect("stream should be open")
            .expect("frame should be valid");
        match frame {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    fn notifier() -> Notifier {
        Notifier::new(ConnectionRegistry::new(), StaticSource::ok())
    }

    #[tokio::test]
    async fn test_ping_yields_single_pong() {
        let notifier = notifier();
        let addr = start_server(notifier.clone()).await;
        let mut client = connect(addr).await;
        wait_for_connections(notifier.registry(), 1).await;

        client
            .send(Message::Text(r#"{"action":"ping"}"#.to_string()))
            .await
            .unwrap();
        assert_eq!(next_json(&mut client).await, json!({"type": "pong"}));

        // Nothing else queued behind the pong
        let extra = tokio::time::timeout(Duration::from_millis(200), client.next()).await;
        assert!(extra.is_err());
        assert_eq!(notifier.registry().len().await, 1);
    }

    #[tokio::test]
    async fn test_malformed_input_is_ignored() {
        let notifier = notifier();
        let addr = start_server(notifier.clone()).await;
        let mut client = connect(addr).await;
        wait_for_connections(notifier.registry(), 1).await;

        client
            .send(Message::Text("this is not json".to_string()))
            .await
            .unwrap();
        client
            .send(Message::Text(r#"{"action":"subscribe"}"#.to_string()))
            .await
            .unwrap();
        client.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
        client
            .send(Message::Text(r#"{"action":"ping"}"#.to_string()))
            .await
            .unwrap();

        // The first frame back is the pong: the earlier messages produced nothing
        assert_eq!(next_json(&mut client).await, json!({"type": "pong"}));
        assert_eq!(notifier.registry().len().await, 1);
    }

    #[tokio::test]
    async fn test_broadcasts_reach_connected_clients() {
        let notifier = notifier();
        let addr = start_server(notifier.clone()).await;
        let mut first = connect(addr).await;
        let mut second = connect(addr).await;
        wait_for_connections(notifier.registry(), 2).await;

        let delivered = notifier.item_created(&json!({"title": "Essay due"})).await;
        assert_eq!(delivered, 2);

        for client in [&mut first, &mut second] {
            let frame = next_json(client).await;
            assert_eq!(frame["type"], "item:new");
            assert_eq!(frame["payload"]["title"], "Essay due");
        }

        notifier.refresh().await.unwrap();
        let frame = next_json(&mut first).await;
        assert_eq!(frame["type"], "context:update");
        assert_eq!(frame["payload"]["courses"][0]["course_id"], "123456");
    }

    /// Fails to compile if the per-socket future stops being `Send`.
    #[allow(dead_code)]
    fn socket_future_is_send(
        socket: axum::extract::ws::WebSocket,
        registry: ConnectionRegistry,
    ) -> impl std::future::Future<Output = ()> + Send {
        super::handle_socket(socket, registry)
    }

    #[tokio::test]
    async fn test_repeated_pings_then_dropped_socket() {
        let notifier = notifier();
        let addr = start_server(notifier.clone()).await;
        let mut client = connect(addr).await;
        wait_for_connections(notifier.registry(), 1).await;

        for _ in 0..5 {
            client
                .send(Message::Text(r#"{"action":"ping"}"#.to_string()))
                .await
                .unwrap();
            assert_eq!(next_json(&mut client).await, json!({"type": "pong"}));
        }

        // Drop the TCP stream without a close handshake
        drop(client);
        wait_for_connections(notifier.registry(), 0).await;

        assert_eq!(notifier.refresh().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_unregisters_connection() {
        let notifier = notifier();
        let addr = start_server(notifier.clone()).await;
        let mut client = connect(addr).await;
        wait_for_connections(notifier.registry(), 1).await;

        client.close(None).await.unwrap();
        wait_for_connections(notifier.registry(), 0).await;

        // Broadcasting afterwards is a harmless no-op
        assert_eq!(notifier.item_created(&json!({"title": "late"})).await, 0);
    }
}
