#![deny(clippy::all)]

use std::io;
use std::sync::Arc;
use std::time::Duration;

use log::*;

use servicenet::config::Config;
use servicenet::net::{serve, EchoHandler};
use servicenet::{IdentityAllocator, NetService, ServiceNet};

const DEFAULT_CONFIG: &str = "servicenet.conf";

fn setup_logger() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", concat!(env!("CARGO_PKG_NAME"), "=debug"));
    }
    env_logger::init();
}

fn print_help() {
    println!("servicenet v{}", env!("CARGO_PKG_VERSION"));
    println!("Echo host for a network service with a bounded packet memory budget\n");
    println!("USAGE:");
    println!("    servicenet [OPTIONS] [CONFIG_FILE]\n");
    println!("OPTIONS:");
    println!("    -h, --help       Show this help message\n");
    println!("ARGUMENTS:");
    println!("    [CONFIG_FILE]    Path to configuration file (default: {DEFAULT_CONFIG})\n");
    println!("CONFIGURATION:");
    println!("The configuration file uses a simple key=value format with sections.\n");
    println!("[service] - Packet memory budget and admission policy");
    println!("  name = \"servicenet\"                        # Service name used in logs");
    println!("  packet_mem_limit = 67108864                # Packet memory ceiling (64MB, >= 0)");
    println!("  connection_overhead_bytes = 4096           # Bytes reserved per admitted connection");
    println!("  per_connection_packet_bytes = 8388608      # Per-connection packet cap (8MB, 0 = unlimited)\n");
    println!("[net] - Listener configuration");
    println!("  bind_addr = \"0.0.0.0:7400\"                 # Listen address");
    println!("  max_frame_bytes = 16777216                 # Max frame payload (16MB)");
    println!("  read_timeout_ms = 30000                    # Idle read timeout (0 = none)\n");
    println!("[metrics] - Metrics reporting");
    println!("  report_interval_ms = 0                     # Log metrics periodically (0 = disabled)\n");
    println!("EXAMPLES:");
    println!("    servicenet                                # Use {DEFAULT_CONFIG} or defaults");
    println!("    servicenet gate.conf                      # Use custom config file");
}

fn load(path: Option<&str>) -> io::Result<Config> {
    match path {
        Some(p) => Config::load(p),
        None => match Config::load(DEFAULT_CONFIG) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("{} not found; using defaults", DEFAULT_CONFIG);
                Ok(Config::default())
            }
            other => other,
        },
    }
}

fn main() {
    let arg = std::env::args().nth(1);
    if matches!(arg.as_deref(), Some("-h") | Some("--help")) {
        print_help();
        return;
    }

    setup_logger();
    let path = arg.as_deref();
    let cfg = load(path).unwrap_or_else(|e| {
        eprintln!(
            "failed to read config {}: {}",
            path.unwrap_or(DEFAULT_CONFIG),
            e
        );
        std::process::exit(1);
    });

    let allocator = IdentityAllocator::new();
    let service = ServiceNet::from_config(&cfg.service, &allocator).unwrap_or_else(|e| {
        eprintln!("failed to construct service: {}", e);
        std::process::exit(1);
    });
    let service = Arc::new(service);
    if let Err(e) = service.init(cfg.to_host_context()) {
        eprintln!("failed to initialize service: {}", e);
        std::process::exit(1);
    }

    run_server(Arc::new(cfg), service);
}

fn run_server(cfg: Arc<Config>, service: Arc<ServiceNet>) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("net-worker")
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("failed to build runtime: {e}");
            std::process::exit(1);
        });

    runtime.block_on(async {
        if cfg.reporting.report_interval_ms > 0 {
            let service = service.clone();
            let period = Duration::from_millis(cfg.reporting.report_interval_ms);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(period);
                loop {
                    tick.tick().await;
                    info!("metrics:\n{}", service.render_metrics());
                }
            });
        }

        let server = tokio::spawn(serve(cfg.clone(), service.clone(), Arc::new(EchoHandler)));
        info!("servicenet started; press Ctrl-C to stop.");

        tokio::select! {
            res = server => match res {
                Ok(Err(e)) => error!("server stopped: {}", e),
                Ok(Ok(())) => {}
                Err(e) => error!("server task failed: {}", e),
            },
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    error!("failed to listen for Ctrl-C: {}", e);
                }
                info!("shutting down...");
            }
        }
    });

    info!(
        "final metrics ({} connections open, {} bytes in use):\n{}",
        service.active_connections(),
        service.used_bytes(),
        service.render_metrics()
    );
    info!("Goodbye.");
}
