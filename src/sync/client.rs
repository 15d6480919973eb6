// src/sync/client.rs

//! Per-connection pumps.

use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::debug;

use crate::sync::hub::{ClientId, Hub};

/// Time allowed to write a message to the peer.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Time allowed to read the next message (pong) from the peer.
pub const PONG_WAIT: Duration = Duration::from_secs(60);

/// Send pings to the peer with this period. Must be less than `PONG_WAIT`.
pub const PING_PERIOD: Duration = Duration::from_secs(54);

/// Connection timing.
#[derive(Debug, Clone, Copy)]
pub struct KeepAlive {
    pub write_wait: Duration,
    pub pong_wait: Duration,
    pub ping_period: Duration,
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self {
            write_wait: WRITE_WAIT,
            pong_wait: PONG_WAIT,
            ping_period: PING_PERIOD,
        }
    }
}

/// Drain `queue` into `sink`, pinging on a fixed period.
///
/// Messages already queued are coalesced into one frame separated by
/// newlines. Ends on write failure or timeout, or after sending a close
/// frame once the queue is closed.
pub async fn write_pump<S>(mut sink: S, mut queue: mpsc::Receiver<String>, keepalive: KeepAlive)
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let mut ping = interval_at(Instant::now() + keepalive.ping_period, keepalive.ping_period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let frame = tokio::select! {
            message = queue.recv() => match message {
                Some(first) => {
                    let mut text = first;
                    while let Ok(next) = queue.try_recv() {
                        text.push('\n');
                        text.push_str(&next);
                    }
                    Message::text(text)
                }
                None => {
                    let _ = timeout(keepalive.write_wait, sink.send(Message::Close(None))).await;
                    break;
                }
            },
            _ = ping.tick() => Message::Ping(Vec::new().into()),
        };

        match timeout(keepalive.write_wait, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                debug!(target: "sync", error = %err, "write failed");
                break;
            }
            Err(_) => {
                debug!(target: "sync", "write timed out");
                break;
            }
        }
    }
}

/// Consume incoming frames until the peer goes away or stays silent for
/// longer than `pong_wait`.
pub async fn read_pump<S>(mut stream: S, pong_wait: Duration)
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        match timeout(pong_wait, stream.next()).await {
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => break,
            Ok(Some(Ok(_))) => {}
            Ok(Some(Err(err))) => {
                debug!(target: "sync", error = %err, "read failed");
                break;
            }
            Err(_) => {
                debug!(target: "sync", "no pong within {:?}", pong_wait);
                break;
            }
        }
    }
}

/// Run both pumps for a registered client until either ends, then
/// unregister it.
pub async fn serve_client<T>(socket: T, hub: Hub, id: ClientId, queue: mpsc::Receiver<String>, keepalive: KeepAlive)
where
    T: Sink<Message, Error = WsError> + Stream<Item = Result<Message, WsError>> + Unpin,
{
    let (sink, stream) = socket.split();
    tokio::select! {
        _ = write_pump(sink, queue, keepalive) => {}
        _ = read_pump(stream, keepalive.pong_wait) => {}
    }
    hub.unregister(id);
}
