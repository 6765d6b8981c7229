//! Frame reading with budget management.
//!
//! Frames are a 4-byte big-endian payload length followed by the payload.

use std::io;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::service::{ConnId, NetService, PacketLease};

/// A packet buffer together with the budget charge that covers it.
/// The charge is released when the packet is dropped.
pub struct OwnedPacket {
    buf: BytesMut,
    _lease: PacketLease,
}

impl OwnedPacket {
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Read one frame, charging its payload to the service before allocating.
///
/// Returns `Ok(None)` on a clean EOF between frames. EOF inside the length
/// header is an `UnexpectedEof` error.
///
/// # Arguments
/// * `r` - Async reader
/// * `service` - Service whose packet budget covers the payload
/// * `conn` - Connection the frame arrived on
/// * `max_frame_bytes` - Maximum allowed value for the length field
pub async fn read_frame_bounded<R: tokio::io::AsyncRead + Unpin>(
    r: &mut R,
    service: &Arc<dyn NetService>,
    conn: ConnId,
    max_frame_bytes: usize,
) -> io::Result<Option<OwnedPacket>> {
    let mut head = [0u8; 4];
    let mut filled = 0;
    while filled < head.len() {
        match r.read(&mut head[filled..]).await? {
            0 if filled == 0 => return Ok(None),
            0 => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated frame header",
                ))
            }
            n => filled += n,
        }
    }
    let len = u32::from_be_bytes(head) as usize;

    if len > max_frame_bytes {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
    }

    // Charge the budget before the allocation it accounts for
    let lease = PacketLease::acquire(service.clone(), conn, len)?;

    let mut buf = BytesMut::zeroed(len);
    r.read_exact(&mut buf[..]).await?;

    Ok(Some(OwnedPacket { buf, _lease: lease }))
}

/// Write `payload` as a single length-prefixed frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, payload: &Bytes) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
    let mut out = BytesMut::with_capacity(4 + payload.len());
    out.put_u32(len);
    out.put_slice(payload);
    w.write_all(&out).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{AdmissionPolicy, HostContext, IdentityAllocator, ServiceNet};

    fn service() -> Arc<ServiceNet> {
        let srv = ServiceNet::new(1024, &IdentityAllocator::new()).unwrap();
        srv.init(HostContext::new("frame_test", AdmissionPolicy::default()))
            .unwrap();
        assert!(srv.on_connection(ConnId(1)).is_admitted());
        Arc::new(srv)
    }

    #[tokio::test]
    async fn eof_between_frames_is_clean() {
        let svc: Arc<dyn NetService> = service();
        let mut r: &[u8] = &[];
        let got = read_frame_bounded(&mut r, &svc, ConnId(1), 64).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn eof_inside_header_is_an_error() {
        let svc: Arc<dyn NetService> = service();
        let mut r: &[u8] = &[0, 0];
        let err = read_frame_bounded(&mut r, &svc, ConnId(1), 64)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn frame_payload_is_charged_until_dropped() {
        let srv = service();
        let svc: Arc<dyn NetService> = srv.clone();
        let mut r: &[u8] = &[0, 0, 0, 3, b'a', b'b', b'c', 0, 0, 0, 1];
        let pkt = read_frame_bounded(&mut r, &svc, ConnId(1), 64)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pkt.as_slice(), b"abc");
        assert_eq!(srv.used_bytes(), 3);
        drop(pkt);
        assert_eq!(srv.used_bytes(), 0);

        // The next header promises a byte that never arrives.
        let err = read_frame_bounded(&mut r, &svc, ConnId(1), 64)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(srv.used_bytes(), 0);
    }
}
