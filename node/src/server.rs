//! The p2p accept loop (ambient wiring): binds one listener, spawns one
//! task per inbound connection, and drives each connection's frames
//! through the shared [`ProtocolHandler`] until it drops or is told to
//! shut down.

use std::sync::Arc;

use cryptonote_p2p::{Connection, Outbound, ProtocolHandler};
use tokio::net::TcpListener;

use crate::error::Result;

const OUTBOUND_QUEUE_CAPACITY: usize = 256;

pub async fn run(listener: TcpListener, handler: Arc<ProtocolHandler>) -> Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        let handler = Arc::clone(&handler);
        tracing::info!(%addr, "accepted peer connection");
        tokio::spawn(async move {
            serve_connection(stream, addr, handler).await;
        });
    }
}

async fn serve_connection(stream: tokio::net::TcpStream, addr: std::net::SocketAddr, handler: Arc<ProtocolHandler>) {
    let (mut connection, _handle) = Connection::new(stream, addr, OUTBOUND_QUEUE_CAPACITY);
    handler.register_peer(addr);

    loop {
        let frame = match connection.next_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(%addr, %err, "connection read failed");
                break;
            }
        };

        let outbound = match handler.handle_frame(addr, &frame) {
            Ok(outbound) => outbound,
            Err(err) => {
                tracing::warn!(%addr, %err, "protocol error, dropping peer");
                break;
            }
        };

        let mut should_drop = false;
        for action in outbound {
            match action {
                Outbound::Send(target, frame) if target == addr => {
                    if connection.handle().send(frame).await.is_err() {
                        should_drop = true;
                    }
                }
                Outbound::Send(_, _) => {
                    // Relay to a different peer is the accept loop's job
                    // once multiple live connections are tracked together;
                    // single-connection dispatch only replies in place.
                }
                Outbound::Drop(target) if target == addr => should_drop = true,
                Outbound::Drop(_) => {}
            }
        }
        if should_drop {
            break;
        }
    }

    handler.drop_peer(addr);
    connection.shutdown().await;
    tracing::info!(%addr, "connection closed");
}
