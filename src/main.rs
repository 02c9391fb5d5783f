use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sockeye::{demo, Error, Server, Version};

#[derive(Parser)]
#[command(name = "sockeye", version, about = "HTTP/1.x server built straight on the OS socket layer")]
struct Args {
    /// Address to listen on, as host:port; an empty host means all interfaces
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: String,

    /// Speak HTTP/1.0 (disables keep-alive)
    #[arg(long)]
    http10: bool,

    /// Root directory served under /static/
    #[arg(long, default_value = "public")]
    root: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let version = if args.http10 {
        Version::Http10
    } else {
        Version::Http11
    };

    let server = Server::bind(&args.addr, version, demo::demo_router(args.root))?;

    tokio::select! {
        _ = server.run() => {}
        _ = shutdown_signal() => {
            info!("shutdown signal received, stopping server");
        }
    }

    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM. Dropping the accept loop stops new
/// connections; in-flight workers run to their natural termination.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
