use crate::error::Error;
use crate::headers::HeaderMap;
use crate::net::Connection;
use crate::response::Version;

/// Hard cap on the whole request: request line, headers and body.
pub const MAX_REQUEST_SIZE: usize = 1_048_576;
/// Cap on the header section alone, enforced while the terminator is
/// still outstanding.
pub const MAX_HEADER_SIZE: usize = 16_384;

const READ_BUF_SIZE: usize = 4096;

/// A parsed request. Header names keep the casing they arrived with;
/// lookups through [`HeaderMap::get`] fold case.
#[derive(Debug, Clone)]
pub struct Request {
    /// Short ASCII token, e.g. `GET`.
    pub method: String,
    /// Raw request-target, query string included.
    pub path: String,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Request {
    /// Well-formed `Content-Length`, if any. Malformed values read as
    /// absent, matching the parser's posture on malformed header lines.
    pub fn content_length(&self) -> Option<usize> {
        self.headers
            .get("Content-Length")
            .and_then(|v| v.trim().parse().ok())
    }
}

/// Read one request off the connection.
///
/// Accumulates 4 KiB reads until the header terminator shows up (CRLF CRLF,
/// or LF LF for tools that emit bare newlines), then pulls the body to
/// exactly `Content-Length` bytes. The read buffer is reused across
/// iterations; every chunk is copied out before the next read, so total
/// allocation is bounded by [`MAX_REQUEST_SIZE`].
pub async fn parse_request(conn: &mut Connection) -> Result<Request, Error> {
    let mut data: Vec<u8> = Vec::with_capacity(READ_BUF_SIZE);
    let mut buf = [0u8; READ_BUF_SIZE];

    let (header_end, sep_len) = loop {
        let n = conn.read(&mut buf).await?;
        if n == 0 {
            return Err(Error::Io(closed_early()));
        }
        data.extend_from_slice(&buf[..n]);

        if data.len() > MAX_REQUEST_SIZE {
            return Err(Error::RequestTooLarge);
        }
        if let Some(found) = find_terminator(&data) {
            break found;
        }
        if data.len() > MAX_HEADER_SIZE {
            return Err(Error::HeaderTooLarge);
        }
    };

    let head = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = head.lines();

    let request_line = lines.next().ok_or(Error::MalformedRequestLine)?.trim();
    let mut parts = request_line.split_whitespace();
    let (method, path, version) = match (parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(p), Some(v)) => (m, p, v),
        _ => return Err(Error::MalformedRequestLine),
    };
    let version = Version::from_token(version).ok_or(Error::MalformedRequestLine)?;

    let mut headers = HeaderMap::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // Lines without a colon are skipped, not fatal.
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim(), value.trim());
        }
    }

    // Whatever followed the terminator is the initial body fragment.
    let mut body: Vec<u8> = data[header_end + sep_len..].to_vec();

    let content_length = headers
        .get("Content-Length")
        .and_then(|v| v.trim().parse::<usize>().ok());
    if let Some(expected) = content_length {
        if header_end + sep_len + expected > MAX_REQUEST_SIZE {
            return Err(Error::RequestTooLarge);
        }
        while body.len() < expected {
            let n = conn.read(&mut buf).await?;
            if n == 0 {
                return Err(Error::Io(closed_early()));
            }
            body.extend_from_slice(&buf[..n]);
        }
        body.truncate(expected);
    }

    Ok(Request {
        method: method.to_string(),
        path: path.to_string(),
        version,
        headers,
        body,
    })
}

/// First header terminator in `data`: byte offset plus separator width.
fn find_terminator(data: &[u8]) -> Option<(usize, usize)> {
    let crlf = find(data, b"\r\n\r\n").map(|i| (i, 4));
    let lf = find(data, b"\n\n").map(|i| (i, 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (found, None) => found,
        (None, found) => found,
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn closed_early() -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "connection closed mid-request",
    )
}
