use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::request::Request;
use crate::response::Response;

/// Bodies below this size aren't worth the gzip header overhead.
pub const MIN_COMPRESS_SIZE: usize = 1024;

/// Content types that compress well. Matched on the primary
/// type/subtype only, case-insensitively.
const COMPRESSIBLE_TYPES: &[&str] = &[
    "text/html",
    "text/css",
    "text/javascript",
    "text/plain",
    "text/xml",
    "application/json",
    "application/javascript",
    "application/xml",
    "application/xml+rss",
    "application/xhtml+xml",
    "image/svg+xml",
];

fn is_compressible(content_type: &str) -> bool {
    let ct = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    COMPRESSIBLE_TYPES.contains(&ct.as_str())
}

/// Does `Accept-Encoding` carry the `gzip` token (with or without
/// quality parameters)?
fn accepts_gzip(accept_encoding: &str) -> bool {
    accept_encoding.split(',').any(|token| {
        let token = token.trim().to_ascii_lowercase();
        token == "gzip" || token.starts_with("gzip;")
    })
}

fn gzip(content: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content)?;
    encoder.finish()
}

/// Conditionally replace the response body with its gzip encoding.
///
/// Runs on the buffered branch only. Skips empty and already-encoded
/// bodies, non-compressible content types, clients that didn't ask for
/// gzip, and bodies under [`MIN_COMPRESS_SIZE`]; whenever the content
/// type is compressible, `Vary: Accept-Encoding` is set either way so
/// caches keep the variants apart. An encoding that fails or comes out
/// no smaller is abandoned and the original body goes out.
///
/// Already-encoded responses pass through untouched, so a second
/// application is a no-op.
pub fn apply(resp: &mut Response, req: &Request) {
    if resp.body.is_empty() {
        return;
    }
    if resp.headers.contains("Content-Encoding") {
        return;
    }

    let content_type = resp
        .headers
        .get("Content-Type")
        .unwrap_or("text/plain")
        .to_string();
    let compressible = is_compressible(&content_type);
    if !compressible {
        return;
    }

    let client_gzip = req
        .headers
        .get("Accept-Encoding")
        .map(accepts_gzip)
        .unwrap_or(false);
    if !client_gzip || resp.body.len() < MIN_COMPRESS_SIZE {
        resp.headers.insert("Vary", "Accept-Encoding");
        return;
    }

    match gzip(&resp.body) {
        Ok(compressed) if compressed.len() < resp.body.len() => {
            resp.headers
                .insert("Content-Length", compressed.len().to_string());
            resp.body = compressed;
            resp.headers.insert("Content-Encoding", "gzip");
            resp.headers.insert("Vary", "Accept-Encoding");
        }
        // Failed or not actually smaller: send the original body.
        _ => {
            resp.headers.insert("Vary", "Accept-Encoding");
        }
    }
}
