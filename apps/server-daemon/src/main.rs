//! Standalone rendezvous server process (§2, §4).

use std::net::SocketAddr;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use callifornia_server::ServerApp;

#[derive(Parser, Debug)]
#[command(author, version, about = "Callifornia rendezvous server", long_about = None)]
struct Args {
    /// Port to listen on, bound on every local interface.
    #[arg(default_value_t = 7777)]
    port: u16,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let addr: SocketAddr = SocketAddr::from(([0, 0, 0, 0], args.port));

    let server = match ServerApp::bind(addr) {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(%err, %addr, "failed to bind server");
            std::process::exit(1);
        }
    };

    let bound_addr = server.local_addr().unwrap_or(addr);
    tracing::info!(%bound_addr, "callifornia server listening");

    // The server runs entirely on background threads (§5); this thread
    // just keeps the process alive until it's killed.
    std::thread::park_timeout(std::time::Duration::MAX);
    drop(server);
}
