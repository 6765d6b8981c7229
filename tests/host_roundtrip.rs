//! End-to-end tests of the reference TCP host
//!
//! Each test binds an in-process listener on 127.0.0.1:0 and drives it with
//! real sockets.

use std::sync::Arc;
use std::time::Duration;

use servicenet::config::Config;
use servicenet::net::{serve_listener, EchoHandler};
use servicenet::{AdmissionPolicy, HostContext, IdentityAllocator, NetService, ServiceNet};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};

async fn start(limit: i64, overhead: usize, max_frame: usize) -> (Arc<ServiceNet>, String) {
    let mut cfg = Config::default();
    cfg.service.packet_mem_limit = limit;
    cfg.service.connection_overhead_bytes = overhead;
    cfg.service.per_connection_packet_bytes = 0;
    cfg.net.max_frame_bytes = max_frame;
    cfg.net.read_timeout_ms = 5000;

    let srv = Arc::new(ServiceNet::from_config(&cfg.service, &IdentityAllocator::new()).unwrap());
    srv.init(cfg.to_host_context()).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let service: Arc<dyn NetService> = srv.clone();
    tokio::spawn(serve_listener(
        listener,
        Arc::new(cfg),
        service,
        Arc::new(EchoHandler),
    ));
    (srv, addr)
}

fn frame(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

async fn read_frame(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    let mut body = vec![0u8; u32::from_be_bytes(head) as usize];
    stream.read_exact(&mut body).await?;
    Ok(body)
}

async fn wait_until<F: Fn() -> bool>(cond: F) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    cond()
}

#[tokio::test]
async fn test_echo_roundtrip_and_release() {
    let (srv, addr) = start(1 << 20, 128, 64 * 1024).await;

    let mut stream = TcpStream::connect(&addr).await.unwrap();
    for payload in [&b"hello"[..], &b""[..], &[0xabu8; 4096][..]] {
        stream.write_all(&frame(payload)).await.unwrap();
        let echoed = timeout(Duration::from_secs(5), read_frame(&mut stream))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(echoed, payload);
    }
    assert!(wait_until(|| srv.active_connections() == 1).await);

    drop(stream);
    assert!(wait_until(|| srv.active_connections() == 0).await);
    assert!(wait_until(|| srv.used_bytes() == 0).await);
}

#[tokio::test]
async fn test_many_clients_budget_returns_to_zero() {
    let (srv, addr) = start(1 << 22, 1024, 64 * 1024).await;

    let mut tasks = Vec::new();
    for i in 0..32u8 {
        let addr = addr.clone();
        tasks.push(tokio::spawn(async move {
            let mut s = TcpStream::connect(&addr).await.unwrap();
            for j in 0..10u8 {
                let payload = vec![i ^ j; 100 + j as usize * 50];
                s.write_all(&frame(&payload)).await.unwrap();
                let back = read_frame(&mut s).await.unwrap();
                assert_eq!(back, payload);
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    assert!(wait_until(|| srv.active_connections() == 0).await);
    assert!(wait_until(|| srv.used_bytes() == 0).await);
    assert!(srv.render_metrics().contains("servicenet_packets_admitted_total"));
}

#[tokio::test]
async fn test_connection_rejected_when_overhead_exhausts_budget() {
    let (srv, addr) = start(1000, 600, 1024).await;

    let mut first = TcpStream::connect(&addr).await.unwrap();
    first.write_all(&frame(b"ping")).await.unwrap();
    assert_eq!(read_frame(&mut first).await.unwrap(), b"ping");

    // Second connection cannot cover its overhead; the host drops it.
    let mut second = TcpStream::connect(&addr).await.unwrap();
    let _ = second.write_all(&frame(b"ping")).await;
    let mut buf = [0u8; 8];
    let n = timeout(Duration::from_secs(5), second.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);
    assert_eq!(srv.active_connections(), 1);
    // The echoed packet's charge is dropped just after its reply is flushed.
    assert!(wait_until(|| srv.used_bytes() == 600).await);
}

#[tokio::test]
async fn test_oversized_packet_closes_connection() {
    let (srv, addr) = start(2048, 0, 64 * 1024).await;

    let mut s = TcpStream::connect(&addr).await.unwrap();
    s.write_all(&frame(&[7u8; 1024])).await.unwrap();
    assert_eq!(read_frame(&mut s).await.unwrap().len(), 1024);

    // Fits max_frame_bytes but not the packet budget: backpressure closes the socket.
    let _ = s.write_all(&frame(&[7u8; 4096])).await;
    let closed = timeout(Duration::from_secs(5), read_frame(&mut s)).await.unwrap();
    assert!(closed.is_err());

    assert!(wait_until(|| srv.active_connections() == 0).await);
    assert!(wait_until(|| srv.used_bytes() == 0).await);
    assert!(srv
        .render_metrics()
        .contains(&format!("servicenet_budget_exhausted_total{{service=\"{}\"}} 1\n", srv.identity())));
}

#[tokio::test]
async fn test_frame_over_limit_is_refused() {
    let (srv, addr) = start(1 << 20, 0, 16).await;

    let mut s = TcpStream::connect(&addr).await.unwrap();
    let _ = s.write_all(&frame(&[1u8; 17])).await;
    let res = timeout(Duration::from_secs(5), read_frame(&mut s)).await.unwrap();
    assert!(res.is_err());
    assert!(wait_until(|| srv.active_connections() == 0).await);
    assert!(wait_until(|| srv.used_bytes() == 0).await);
}

#[test]
fn test_host_context_from_config() {
    let cfg = Config::default();
    let ctx = cfg.to_host_context();
    assert_eq!(
        ctx,
        HostContext::new(
            "servicenet",
            AdmissionPolicy {
                connection_overhead_bytes: 4096,
                per_connection_packet_bytes: 8 * 1024 * 1024,
            }
        )
    );
}
