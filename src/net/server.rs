//! TCP host container for a `NetService`.
//!
//! Handles connection acceptance, admission through the service hooks, and
//! dispatching to the client handler.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::*;
use tokio::net::TcpListener as TokioTcpListener;

use crate::config::Config;
use crate::service::{AdmissionResult, ConnId, NetService};

use super::handler::{handle_client, PacketHandler};

/// Bind the configured address and serve connections forever.
pub async fn serve(
    cfg: Arc<Config>,
    service: Arc<dyn NetService>,
    handler: Arc<dyn PacketHandler>,
) -> io::Result<()> {
    let listener = TokioTcpListener::bind(&cfg.net.bind_addr).await?;
    serve_listener(listener, cfg, service, handler).await
}

/// Serve connections from an already bound listener.
pub async fn serve_listener(
    listener: TokioTcpListener,
    cfg: Arc<Config>,
    service: Arc<dyn NetService>,
    handler: Arc<dyn PacketHandler>,
) -> io::Result<()> {
    info!(
        "[srv={}] {} listening on {}",
        service.identity(),
        service.name(),
        listener.local_addr()?
    );

    let next_conn = AtomicU64::new(1);

    loop {
        let (socket, addr) = match listener.accept().await {
            Ok(v) => v,
            Err(e) => {
                error!("accept: {}", e);
                continue;
            }
        };

        let conn = ConnId(next_conn.fetch_add(1, Ordering::Relaxed));

        match service.on_connection(conn) {
            AdmissionResult::Admitted => {}
            AdmissionResult::Rejected(e) => {
                // Service already logged at the right severity
                debug!("refusing connection {} from {}: {}", conn, addr, e);
                drop(socket);
                continue;
            }
        }

        if let Err(e) = socket.set_nodelay(true) {
            debug!("[hd={}] set_nodelay: {}", conn, e);
        }

        let cfg = cfg.clone();
        let service = service.clone();
        let handler = handler.clone();

        tokio::spawn(async move {
            debug!("[hd={}] new connection from {}", conn, addr);

            let res = handle_client(socket, conn, &cfg.net, service.clone(), handler).await;
            match res {
                Ok(()) => debug!("[hd={}] connection {} closed cleanly", conn, addr),
                Err(e) if e.kind() == io::ErrorKind::OutOfMemory => {
                    debug!("[hd={}] closing {} under backpressure: {}", conn, addr, e)
                }
                Err(e) => debug!("[hd={}] connection {} ended: {}", conn, addr, e),
            }

            service.on_connection_closed(conn);
        });
    }
}
