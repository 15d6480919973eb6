mod common;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Sink, SinkExt, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use devmon::sync::client::{read_pump, write_pump};
use devmon::sync::{KeepAlive, SyncServer, SYNC_MESSAGE, SYNC_ROUTE};

type TestResult = Result<(), Box<dyn Error>>;

fn loopback() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

async fn wait_for_clients(server: &SyncServer, expected: usize) {
    with_timeout(async {
        while server.hub().client_count().await != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}

#[tokio::test]
async fn connected_client_receives_sync() -> TestResult {
    init_tracing();
    let server = SyncServer::start(loopback(), KeepAlive::default()).await?;
    let url = format!("ws://{}{}", server.local_addr(), SYNC_ROUTE);

    let (mut ws, _) = connect_async(url.as_str()).await?;
    wait_for_clients(&server, 1).await;

    server.sync();
    let frame = with_timeout(ws.next()).await.ok_or("connection closed early")??;
    assert_eq!(frame.to_text()?, SYNC_MESSAGE);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn every_client_is_synced() -> TestResult {
    let server = SyncServer::start(loopback(), KeepAlive::default()).await?;
    let url = format!("ws://{}{}", server.local_addr(), SYNC_ROUTE);

    let (mut first, _) = connect_async(url.as_str()).await?;
    let (mut second, _) = connect_async(url.as_str()).await?;
    wait_for_clients(&server, 2).await;

    server.sync();
    for ws in [&mut first, &mut second] {
        let frame = with_timeout(ws.next()).await.ok_or("connection closed early")??;
        assert_eq!(frame.to_text()?, SYNC_MESSAGE);
    }

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn other_routes_are_rejected() -> TestResult {
    let server = SyncServer::start(loopback(), KeepAlive::default()).await?;
    let url = format!("ws://{}/elsewhere", server.local_addr());

    let result = connect_async(url.as_str()).await;
    match result {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 404),
        other => return Err(format!("expected a 404, got {:?}", other.err()).into()),
    }
    assert_eq!(server.hub().client_count().await, 0);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn disconnecting_client_is_unregistered() -> TestResult {
    let server = SyncServer::start(loopback(), KeepAlive::default()).await?;
    let url = format!("ws://{}{}", server.local_addr(), SYNC_ROUTE);

    let (mut ws, _) = connect_async(url.as_str()).await?;
    wait_for_clients(&server, 1).await;

    ws.close(None).await?;
    wait_for_clients(&server, 0).await;

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn stop_closes_client_connections() -> TestResult {
    let server = SyncServer::start(loopback(), KeepAlive::default()).await?;
    let url = format!("ws://{}{}", server.local_addr(), SYNC_ROUTE);

    let (mut ws, _) = connect_async(url.as_str()).await?;
    wait_for_clients(&server, 1).await;

    with_timeout(server.stop()).await;

    // The server sends a close frame; the stream then ends.
    let closed = with_timeout(async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return true,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed);
    Ok(())
}

#[tokio::test]
async fn connection_that_never_upgrades_is_dropped() -> TestResult {
    init_tracing();
    let keepalive = KeepAlive {
        write_wait: Duration::from_millis(100),
        ..KeepAlive::default()
    };
    let server = SyncServer::start(loopback(), keepalive).await?;

    let mut stream = TcpStream::connect(server.local_addr()).await?;
    let mut buf = [0u8; 64];
    // EOF or a reset both mean the server gave up on the handshake.
    if let Ok(n) = with_timeout(stream.read(&mut buf)).await {
        assert_eq!(n, 0, "server answered a request that was never sent");
    }
    assert_eq!(server.hub().client_count().await, 0);

    server.stop().await;
    Ok(())
}

/// A sink that never becomes ready, like a socket whose send buffer is full.
struct StalledSink;

impl Sink<Message> for StalledSink {
    type Error = WsError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Poll::Pending
    }

    fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), WsError> {
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Poll::Pending
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Poll::Pending
    }
}

/// A sink that hands frames to a channel, standing in for a socket.
fn channel_sink() -> (
    impl futures::Sink<Message, Error = WsError> + Unpin,
    futures::channel::mpsc::UnboundedReceiver<Message>,
) {
    let (tx, rx) = futures::channel::mpsc::unbounded();
    (tx.sink_map_err(|_| WsError::ConnectionClosed), rx)
}

#[tokio::test]
async fn queued_messages_are_coalesced_into_one_frame() -> TestResult {
    let (sink, mut frames) = channel_sink();
    let (queue, rx) = mpsc::channel(8);
    queue.send("a".to_string()).await?;
    queue.send("b".to_string()).await?;
    queue.send("c".to_string()).await?;
    drop(queue);

    with_timeout(write_pump(sink, rx, KeepAlive::default())).await;

    let first = frames.next().await.ok_or("no frame written")?;
    assert_eq!(first.to_text()?, "a\nb\nc");
    assert!(matches!(frames.next().await, Some(Message::Close(_))));
    assert!(frames.next().await.is_none());
    Ok(())
}

#[tokio::test]
async fn idle_connection_is_pinged() -> TestResult {
    let (sink, mut frames) = channel_sink();
    let (queue, rx) = mpsc::channel::<String>(8);
    let keepalive = KeepAlive {
        ping_period: Duration::from_millis(50),
        ..KeepAlive::default()
    };

    let pump = tokio::spawn(write_pump(sink, rx, keepalive));
    let frame = with_timeout(frames.next()).await.ok_or("no frame written")?;
    assert!(matches!(frame, Message::Ping(_)));

    drop(queue);
    with_timeout(pump).await?;
    Ok(())
}

#[tokio::test]
async fn silent_peer_times_out() -> TestResult {
    let silent = futures::stream::pending::<Result<Message, WsError>>();
    with_timeout(read_pump(silent, Duration::from_millis(50))).await;
    Ok(())
}

#[tokio::test]
async fn read_pump_ends_on_close_frame() -> TestResult {
    let frames = futures::stream::iter(vec![
        Ok(Message::Pong(Vec::new().into())),
        Ok(Message::text("hello")),
        Ok(Message::Close(None)),
        Ok(Message::text("never read")),
    ]);
    with_timeout(read_pump(frames, Duration::from_secs(60))).await;
    Ok(())
}

#[tokio::test]
async fn stalled_write_ends_the_pump() -> TestResult {
    let (queue, rx) = mpsc::channel(8);
    queue.send(SYNC_MESSAGE.to_string()).await?;
    let keepalive = KeepAlive {
        write_wait: Duration::from_millis(50),
        ..KeepAlive::default()
    };

    // The sender stays alive: only the write deadline can end the pump.
    with_timeout(write_pump(StalledSink, rx, keepalive)).await;
    drop(queue);
    Ok(())
}
