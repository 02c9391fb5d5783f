use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use crate::error::Error;

/// Depth of the kernel accept queue.
pub const LISTEN_BACKLOG: i32 = 128;

/// Parse a `host:port` string into an IPv4 socket address.
///
/// An empty host means all interfaces (`0.0.0.0`). Hostnames are resolved
/// and the first IPv4 result wins; this server does not take the IPv6 path.
pub fn parse_addr(addr: &str) -> Result<SocketAddr, Error> {
    let colon = addr
        .rfind(':')
        .ok_or_else(|| Error::BadAddress(addr.to_string()))?;
    let (host, port) = (&addr[..colon], &addr[colon + 1..]);
    let port: u16 = port
        .parse()
        .map_err(|_| Error::BadAddress(addr.to_string()))?;

    if host.is_empty() {
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(SocketAddr::new(IpAddr::V4(ip), port));
    }

    (host, port)
        .to_socket_addrs()
        .map_err(|_| Error::BadAddress(addr.to_string()))?
        .find(|a| a.is_ipv4())
        .ok_or_else(|| Error::BadAddress(addr.to_string()))
}

/// A listening TCP socket.
///
/// One instance per server; the descriptor never migrates. Construction
/// walks the classic sequence by hand: socket() → setsockopt() → bind() →
/// listen(), each step with its own failure kind.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local: SocketAddr,
}

impl Listener {
    /// Create, configure, bind and start listening on `addr`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(addr: SocketAddr) -> Result<Listener, Error> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(Error::SocketCreate)?;

        // SO_REUSEADDR lets the server rebind right after a restart;
        // SO_KEEPALIVE surfaces dead peers. The descriptor stays in
        // blocking mode until it is handed to the runtime.
        socket
            .set_reuse_address(true)
            .map_err(Error::SocketConfigure)?;
        socket.set_keepalive(true).map_err(Error::SocketConfigure)?;

        socket.bind(&addr.into()).map_err(|e| match e.kind() {
            std::io::ErrorKind::AddrInUse => Error::AddressInUse(addr),
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied(addr),
            _ => Error::Io(e),
        })?;

        socket.listen(LISTEN_BACKLOG).map_err(Error::ListenFailed)?;

        socket
            .set_nonblocking(true)
            .map_err(Error::SocketConfigure)?;
        let std_listener: std::net::TcpListener = socket.into();
        let inner = TcpListener::from_std(std_listener)?;
        let local = inner.local_addr()?;

        Ok(Listener { inner, local })
    }

    /// Wait for the next completed handshake.
    ///
    /// Failures here are transient; the accept loop logs and continues.
    pub async fn accept(&self) -> std::io::Result<Connection> {
        let (stream, peer) = self.inner.accept().await?;
        stream.set_nodelay(true)?;
        let local = stream.local_addr()?;
        Ok(Connection::new(stream, local, peer))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }
}

/// One established connection, exclusively owned by its worker.
///
/// Reads and writes honour absolute deadlines: each I/O future is raced
/// against a timer for the remaining duration, so no operation can block
/// past the configured instant. Expiry surfaces as
/// `io::ErrorKind::TimedOut`, distinguishable from orderly close (`Ok(0)`).
/// Dropping the connection closes the socket.
pub struct Connection {
    stream: TcpStream,
    local: SocketAddr,
    peer: SocketAddr,
    read_deadline: Option<Instant>,
    write_deadline: Option<Instant>,
}

impl Connection {
    pub fn new(stream: TcpStream, local: SocketAddr, peer: SocketAddr) -> Connection {
        Connection {
            stream,
            local,
            peer,
            read_deadline: None,
            write_deadline: None,
        }
    }

    /// Wrap an already-connected stream, taking the addresses from it.
    pub fn from_stream(stream: TcpStream) -> std::io::Result<Connection> {
        let local = stream.local_addr()?;
        let peer = stream.peer_addr()?;
        Ok(Connection::new(stream, local, peer))
    }

    /// Read into `buf`, honouring the read deadline.
    ///
    /// May return any count in `1..=buf.len()`; returns 0 on orderly peer
    /// close. Callers must consume `buf[..n]`, never the whole buffer.
    pub async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match remaining(self.read_deadline) {
            None => self.stream.read(buf).await,
            Some(left) => timeout(left, self.stream.read(buf))
                .await
                .unwrap_or_else(|_| Err(timed_out("read deadline exceeded"))),
        }
    }

    /// Write all of `buf`, honouring the write deadline.
    pub async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match remaining(self.write_deadline) {
            None => self.stream.write_all(buf).await,
            Some(left) => timeout(left, self.stream.write_all(buf))
                .await
                .unwrap_or_else(|_| Err(timed_out("write deadline exceeded"))),
        }
    }

    /// Set both deadlines at once. `None` means no timeout.
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.read_deadline = deadline;
        self.write_deadline = deadline;
    }

    pub fn set_read_deadline(&mut self, deadline: Option<Instant>) {
        self.read_deadline = deadline;
    }

    pub fn set_write_deadline(&mut self, deadline: Option<Instant>) {
        self.write_deadline = deadline;
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

fn remaining(deadline: Option<Instant>) -> Option<Duration> {
    // A deadline already in the past clamps to zero and expires on the
    // first poll.
    deadline.map(|d| d.saturating_duration_since(Instant::now()))
}

fn timed_out(what: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::TimedOut, what.to_string())
}
