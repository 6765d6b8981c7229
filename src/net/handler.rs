//! Client connection handler.
//!
//! Runs the read/dispatch/reply loop for one admitted connection. Every
//! inbound frame is charged to the service's packet budget for as long as
//! its buffer is alive.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::*;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

use crate::config::Net;
use crate::service::{ConnId, NetService};

use super::frame::{read_frame_bounded, write_frame};

/// Packet dispatch supplied by the host.
pub trait PacketHandler: Send + Sync {
    /// Handle one packet. A returned payload is written back as a reply frame.
    fn on_packet(&self, conn: ConnId, payload: &[u8]) -> Option<Bytes>;
}

/// Replies to every packet with its own payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoHandler;

impl PacketHandler for EchoHandler {
    fn on_packet(&self, _conn: ConnId, payload: &[u8]) -> Option<Bytes> {
        Some(Bytes::copy_from_slice(payload))
    }
}

/// Handle a single admitted connection until EOF, timeout, or error.
pub async fn handle_client<S: AsyncRead + AsyncWrite + Unpin>(
    mut stream: S,
    conn: ConnId,
    net: &Net,
    service: Arc<dyn NetService>,
    handler: Arc<dyn PacketHandler>,
) -> io::Result<()> {
    let read_timeout = (net.read_timeout_ms > 0).then(|| Duration::from_millis(net.read_timeout_ms));

    loop {
        let next = read_frame_bounded(&mut stream, &service, conn, net.max_frame_bytes);
        let packet = match read_timeout {
            Some(t) => match timeout(t, next).await {
                Ok(res) => res?,
                Err(_) => {
                    debug!("[hd={}] idle timeout", conn);
                    return Ok(());
                }
            },
            None => next.await?,
        };

        let Some(packet) = packet else {
            return Ok(());
        };
        trace!("[hd={}] packet {} bytes", conn, packet.len());

        if let Some(reply) = handler.on_packet(conn, packet.as_slice()) {
            write_frame(&mut stream, &reply).await?;
        }
        // Packet (and its budget charge) dropped here, after the reply is flushed
    }
}
