use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::compress;
use crate::error::Error;
use crate::headers::HeaderMap;
use crate::net::{parse_addr, Connection, Listener};
use crate::request::parse_request;
use crate::response::{write_response, Version};
use crate::router::{Dispatch, Router};

/// How long a connection may sit idle between requests.
pub const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Exchanges allowed on one connection before the server closes it.
pub const MAX_REQUESTS_PER_CONNECTION: u32 = 100;

/// Stamp the connection headers for this exchange: either
/// `Connection: keep-alive` plus the advertised timeout/budget, or
/// `Connection: close`.
pub fn connection_headers(headers: &mut HeaderMap, keep_alive: bool, remaining: u32) {
    if keep_alive {
        headers.insert("Connection", "keep-alive");
        headers.insert(
            "Keep-Alive",
            format!("timeout={}, max={}", KEEP_ALIVE_TIMEOUT.as_secs(), remaining),
        );
    } else {
        headers.insert("Connection", "close");
    }
}

/// The accept loop and everything it needs: a bound listener, the
/// protocol version spoken on responses, and the shared route table.
pub struct Server {
    listener: Listener,
    version: Version,
    router: Arc<Router>,
}

impl Server {
    /// Bind `addr` (`host:port`; empty host means all interfaces) and
    /// get ready to serve. Must be called from within a tokio runtime.
    pub fn bind(addr: &str, version: Version, router: Router) -> Result<Server, Error> {
        let listener = Listener::bind(parse_addr(addr)?)?;
        Ok(Server {
            listener,
            version,
            router: Arc::new(router),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Accept connections forever, one spawned worker per connection.
    ///
    /// The accept loop never touches connected sockets; each worker owns
    /// its connection exclusively until it terminates. Accept failures
    /// are transient and logged.
    pub async fn run(self) {
        info!(
            addr = %self.listener.local_addr(),
            protocol = %self.version,
            "server listening"
        );
        loop {
            let conn = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };
            debug!(peer = %conn.peer_addr(), "connection accepted");
            let router = Arc::clone(&self.router);
            let version = self.version;
            tokio::spawn(handle_connection(conn, router, version));
        }
    }
}

/// Per-connection driver: parse → dispatch → write → decide.
///
/// Owns the connection for its whole lifetime; returning drops it, which
/// closes the socket on every exit path. The read deadline is the only
/// mechanism that reaps idle peers.
async fn handle_connection(mut conn: Connection, router: Arc<Router>, version: Version) {
    conn.set_read_deadline(Some(Instant::now() + KEEP_ALIVE_TIMEOUT));
    let mut count: u32 = 0;

    loop {
        let req = match parse_request(&mut conn).await {
            Ok(req) => req,
            Err(e) if e.is_timeout() => {
                debug!(peer = %conn.peer_addr(), "idle connection reaped");
                return;
            }
            Err(e) => {
                debug!(peer = %conn.peer_addr(), error = %e, "connection ended");
                return;
            }
        };
        count += 1;
        debug!(method = %req.method, path = %req.path, "request");

        // HTTP/1.0 never keeps the connection; HTTP/1.1 does unless the
        // client opted out or the per-connection budget ran out.
        let mut keep_alive = match version {
            Version::Http10 => false,
            Version::Http11 => req
                .headers
                .get("Connection")
                .map(|v| !v.eq_ignore_ascii_case("close"))
                .unwrap_or(true),
        };
        if count >= MAX_REQUESTS_PER_CONNECTION {
            keep_alive = false;
        }
        let remaining = MAX_REQUESTS_PER_CONNECTION - count;

        match router.dispatch(&req) {
            Dispatch::Streaming(handler) => {
                if handler
                    .serve(&req, &mut conn, keep_alive, remaining)
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Dispatch::Buffered(mut resp) => {
                resp.version = version;
                connection_headers(&mut resp.headers, keep_alive, remaining);
                compress::apply(&mut resp, &req);
                if write_response(&mut conn, &mut resp).await.is_err() {
                    return;
                }
            }
        }

        if !keep_alive {
            return;
        }
        conn.set_read_deadline(Some(Instant::now() + KEEP_ALIVE_TIMEOUT));
    }
}
