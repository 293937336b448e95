//! Push endpoints for dashboards.
//!
//! Subscribers normally upgrade on the HTTP listener (`GET /`). A dedicated
//! tungstenite listener can also be enabled with `server.ws_addr`.
//!
//! Either way each socket becomes a `ChannelSubscriber`: broadcasts land in
//! its bounded channel and the connection task drains them onto the socket.
//! Inbound frames are ignored apart from Close (and Ping on the HTTP path).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, HttpRequest, HttpResponse};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use crate::relay::TradeRelay;
use crate::subscriber::{ChannelSubscriber, Subscriber};

// Time the writer gets to flush the closing handshake
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// WebSocket upgrade on the HTTP listener.
pub async fn subscribe(
    req: HttpRequest,
    body: web::Payload,
    relay: web::Data<TradeRelay>,
) -> Result<HttpResponse, actix_web::Error> {
    let (response, mut session, mut inbound) = actix_ws::handle(&req, body)?;

    let relay = relay.into_inner();
    let peer_addr = req.peer_addr();
    let (subscriber, mut frames) = ChannelSubscriber::new(peer_addr, relay.send_buffer());
    let subscriber = Arc::new(subscriber);
    let id = subscriber.id();

    actix_web::rt::spawn(async move {
        subscriber.mark_open();
        info!(subscriber = %id, peer = ?peer_addr, "Subscriber connected");
        relay.on_subscriber_connect(subscriber.clone());

        let close_reason = loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Some(frame) => {
                        if session.text(frame.to_string()).await.is_err() {
                            break None;
                        }
                    }
                    None => break None,
                },
                msg = inbound.recv() => match msg {
                    Some(Ok(actix_ws::Message::Close(reason))) => break reason,
                    Some(Ok(actix_ws::Message::Ping(bytes))) => {
                        if session.pong(&bytes).await.is_err() {
                            break None;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(subscriber = %id, error = %e, "WebSocket protocol error");
                        break None;
                    }
                    None => break None,
                },
            }
        };

        subscriber.mark_closed();
        relay.on_subscriber_disconnect(id);
        let _ = session.close(close_reason).await;
        info!(subscriber = %id, peer = ?peer_addr, "Subscriber disconnected");
    });

    Ok(response)
}

/// Standalone push listener.
pub struct WsServer {
    relay: Arc<TradeRelay>,
    send_buffer: usize,
}

impl WsServer {
    pub fn new(relay: Arc<TradeRelay>, send_buffer: usize) -> Self {
        Self { relay, send_buffer }
    }

    /// Accept loop. Runs until the task is dropped or aborted.
    pub async fn run(self, listener: TcpListener) {
        match listener.local_addr() {
            Ok(addr) => info!(addr = %addr, "WebSocket listener ready"),
            Err(e) => error!(error = %e, "WebSocket listener has no local address"),
        }

        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    let relay = Arc::clone(&self.relay);
                    let send_buffer = self.send_buffer;
                    tokio::spawn(async move {
                        handle_connection(relay, socket, peer_addr, send_buffer).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept WebSocket connection");
                }
            }
        }
    }
}

async fn handle_connection(
    relay: Arc<TradeRelay>,
    socket: TcpStream,
    peer_addr: SocketAddr,
    send_buffer: usize,
) {
    let ws_stream = match accept_async(socket).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(peer = %peer_addr, error = %e, "WebSocket handshake failed");
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    let (subscriber, mut frames) = ChannelSubscriber::new(Some(peer_addr), send_buffer);
    let subscriber = Arc::new(subscriber);
    let id = subscriber.id();

    // Exits once every sender is gone, closing the sink on the way out
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if let Err(e) = write.send(Message::Text(frame.to_string())).await {
                debug!(subscriber = %id, error = %e, "WebSocket write failed");
                break;
            }
        }
        let _ = write.close().await;
    });

    subscriber.mark_open();
    info!(subscriber = %id, peer = %peer_addr, "Subscriber connected");
    relay.on_subscriber_connect(subscriber.clone());

    let reader = async {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(subscriber = %id, error = %e, "WebSocket read error");
                    break;
                }
            }
        }
    };

    let writer_done = tokio::select! {
        _ = reader => false,
        _ = &mut writer => true,
    };

    subscriber.mark_closed();
    relay.on_subscriber_disconnect(id);
    // Last sender: the writer drains and replies to the peer's Close
    drop(subscriber);

    if !writer_done && tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
        warn!(subscriber = %id, "WebSocket writer did not finish closing");
        writer.abort();
    }
    info!(subscriber = %id, peer = %peer_addr, "Subscriber disconnected");
}
