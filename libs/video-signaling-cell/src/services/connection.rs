// libs/video-signaling-cell/src/services/connection.rs
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::models::ConnectionHandle;
use crate::services::relay::SignalingRelay;

// Interval used when the heartbeat is disabled; the tick branch is guarded
// off in that case.
const IDLE_TICK: Duration = Duration::from_secs(3600);

/// Drives one participant socket until it closes, then runs the relay's
/// disconnect cleanup exactly once.
///
/// Frames from the socket are handled in receipt order. A failed write or an
/// overflowed outbound queue is treated as a disconnect. With a heartbeat interval set, a ping is sent
/// every tick and the connection is dropped if the previous ping was not
/// answered by the next one.
pub async fn serve_connection(
    socket: WebSocket,
    relay: SignalingRelay,
    heartbeat: Option<Duration>,
) {
    let (connection, mut outbound) = ConnectionHandle::channel();
    let (mut sink, mut stream) = socket.split();

    info!("New WebSocket connection {}", connection.id());

    let mut ticker = interval(heartbeat.unwrap_or(IDLE_TICK));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.reset();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        relay.handle_text(&connection, text.as_str()).await;
                    }
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => relay.handle_text(&connection, text).await,
                        Err(e) => warn!(
                            "Ignoring non UTF-8 binary frame on connection {}: {}",
                            connection.id(),
                            e
                        ),
                    },
                    Some(Ok(Message::Pong(_))) => awaiting_pong = false,
                    Some(Ok(Message::Ping(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        debug!("Connection {} sent close frame: {:?}", connection.id(), frame);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error on connection {}: {}", connection.id(), e);
                        break;
                    }
                    None => break,
                }
            }
            Some(message) = outbound.recv() => {
                let text = match message.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to serialize {} message: {}", message.kind(), e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!("Failed to write to connection {}: {}", connection.id(), e);
                    break;
                }
            }
            _ = connection.overflowed() => {
                warn!("Connection {} is not draining its outbound queue, closing", connection.id());
                break;
            }
            _ = ticker.tick(), if heartbeat.is_some() => {
                if awaiting_pong {
                    warn!("Connection {} missed heartbeat, closing", connection.id());
                    break;
                }
                if let Err(e) = sink.send(Message::Ping(Default::default())).await {
                    warn!("Failed to ping connection {}: {}", connection.id(), e);
                    break;
                }
                awaiting_pong = true;
            }
        }
    }

    // Closing the receiver marks the handle closed before cleanup runs.
    outbound.close();
    relay.disconnect(connection.id()).await;
    let _ = sink.close().await;
    debug!("Connection {} finished", connection.id());
}
