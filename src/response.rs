use std::fmt;
use std::time::SystemTime;

use crate::headers::HeaderMap;
use crate::net::Connection;

/// Product token stamped into every `Server` header.
pub const SERVER_TOKEN: &str = concat!("sockeye/", env!("CARGO_PKG_VERSION"));

/// The two protocol versions this server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    pub fn as_str(self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }

    /// Parse a request-line version token.
    pub fn from_token(token: &str) -> Option<Version> {
        match token {
            "HTTP/1.0" => Some(Version::Http10),
            "HTTP/1.1" => Some(Version::Http11),
            _ => None,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A buffered HTTP response: status line, headers, body.
#[derive(Debug, Clone)]
pub struct Response {
    pub version: Version,
    pub status: u16,
    pub reason: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(
        status: u16,
        reason: impl Into<String>,
        version: Version,
        body: impl Into<Vec<u8>>,
    ) -> Response {
        Response {
            version,
            status,
            reason: reason.into(),
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Plain-text response with `Content-Type` preset.
    pub fn text(status: u16, reason: impl Into<String>, version: Version, body: &str) -> Response {
        let mut resp = Response::new(status, reason, version, body.as_bytes().to_vec());
        resp.headers.insert("Content-Type", "text/plain");
        resp
    }

    /// Stamp the framing and identity headers, overwriting whatever the
    /// caller put there: `Content-Length` from the current body,
    /// `Date` in RFC 1123 GMT, and the `Server` token.
    pub fn finalize(&mut self) {
        self.headers
            .insert("Content-Length", self.body.len().to_string());
        self.headers
            .insert("Date", httpdate::fmt_http_date(SystemTime::now()));
        self.headers.insert("Server", SERVER_TOKEN);
    }

    /// Serialise the status line, headers and blank-line separator.
    ///
    /// Streaming paths write these bytes first and then copy the body
    /// straight from disk; the buffered writer appends the body.
    pub fn head_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(
            format!("{} {} {}\r\n", self.version, self.status, self.reason).as_bytes(),
        );
        for (name, value) in self.headers.iter() {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out
    }

    /// Full serialisation: head followed by the body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.head_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

/// Serialise a finalized response onto the connection in one write.
pub async fn write_response(conn: &mut Connection, resp: &mut Response) -> std::io::Result<()> {
    resp.finalize();
    conn.write_all(&resp.to_bytes()).await
}
