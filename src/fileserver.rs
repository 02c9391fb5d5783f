use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use crate::compress;
use crate::headers::HeaderMap;
use crate::mime;
use crate::net::Connection;
use crate::request::Request;
use crate::response::{Response, SERVER_TOKEN};
use crate::router::StreamHandler;
use crate::server::connection_headers;

/// Files up to this size are read whole and sent in one write; anything
/// larger is streamed from disk.
pub const MAX_IN_MEMORY_SIZE: u64 = 1_048_576;

/// Chunk size for streamed delivery.
const STREAM_CHUNK_SIZE: usize = 32 * 1024;

const CACHE_CONTROL: &str = "public, max-age=3600";

/// Serves files under a root directory for `GET`/`HEAD` requests on
/// `/static/*`. The request path, prefix included, is joined onto the
/// root, so files live under `<root>/static/`.
pub struct FileServer {
    root: PathBuf,
}

impl FileServer {
    pub fn new(root: impl Into<PathBuf>) -> FileServer {
        FileServer { root: root.into() }
    }

    /// Resolve the request path and deliver the file.
    ///
    /// Emits the whole response itself: 200 in memory or streamed, 206
    /// for ranges, 304 for fresh caches, and plain-text 4xx/5xx
    /// otherwise. I/O errors bubble up and end the connection.
    pub async fn serve_file(
        &self,
        req: &Request,
        conn: &mut Connection,
        keep_alive: bool,
        remaining: u32,
    ) -> std::io::Result<()> {
        let is_head = req.method == "HEAD";

        // Query strings play no part in file resolution.
        let raw_path = req.path.split('?').next().unwrap_or(&req.path);

        let rel = match sanitize(raw_path) {
            Some(rel) => rel,
            None => {
                debug!(path = raw_path, "rejected traversal attempt");
                return self
                    .send_error(conn, req, 403, "Forbidden", "Forbidden", keep_alive, remaining)
                    .await;
            }
        };
        let mut path = self.root.join(rel);

        let mut meta = match fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return self
                    .send_error(conn, req, 404, "Not Found", "File Not Found", keep_alive, remaining)
                    .await;
            }
            Err(_) => {
                return self
                    .send_error(
                        conn,
                        req,
                        500,
                        "Internal Server Error",
                        "Internal Server Error",
                        keep_alive,
                        remaining,
                    )
                    .await;
            }
        };

        // Directories serve their index.html or nothing at all.
        if meta.is_dir() {
            let index = path.join("index.html");
            match fs::metadata(&index).await {
                Ok(index_meta) => {
                    path = index;
                    meta = index_meta;
                }
                Err(_) => {
                    return self
                        .send_error(
                            conn,
                            req,
                            403,
                            "Forbidden",
                            "Directory listing disabled",
                            keep_alive,
                            remaining,
                        )
                        .await;
                }
            }
        }

        // HTTP dates carry whole seconds only.
        let mod_time = truncate_to_seconds(meta.modified().unwrap_or(UNIX_EPOCH));

        if let Some(since) = req.headers.get("If-Modified-Since") {
            if let Ok(client_time) = httpdate::parse_http_date(since) {
                if mod_time <= truncate_to_seconds(client_time) {
                    return self
                        .send_not_modified(conn, req, mod_time, keep_alive, remaining)
                        .await;
                }
            }
        }

        let file_size = meta.len();
        debug!(path = %path.display(), size = file_size, "serving static file");

        if file_size <= MAX_IN_MEMORY_SIZE {
            self.serve_small(conn, req, &path, mod_time, keep_alive, remaining, is_head)
                .await
        } else {
            self.serve_large(conn, req, &path, file_size, mod_time, keep_alive, remaining, is_head)
                .await
        }
    }

    /// In-memory delivery: whole file, one write, compression eligible.
    #[allow(clippy::too_many_arguments)]
    async fn serve_small(
        &self,
        conn: &mut Connection,
        req: &Request,
        path: &Path,
        mod_time: SystemTime,
        keep_alive: bool,
        remaining: u32,
        is_head: bool,
    ) -> std::io::Result<()> {
        let content = match fs::read(path).await {
            Ok(content) => content,
            Err(_) => {
                return self
                    .send_error(
                        conn,
                        req,
                        500,
                        "Internal Server Error",
                        "Error reading file",
                        keep_alive,
                        remaining,
                    )
                    .await;
            }
        };

        let mut resp = Response::new(200, "OK", req.version, content);
        resp.headers.insert("Content-Type", mime::from_path(path));
        resp.headers.insert("Accept-Ranges", "bytes");
        resp.headers
            .insert("Last-Modified", httpdate::fmt_http_date(mod_time));
        resp.headers.insert("Cache-Control", CACHE_CONTROL);
        connection_headers(&mut resp.headers, keep_alive, remaining);

        compress::apply(&mut resp, req);
        resp.finalize();

        if is_head {
            conn.write_all(&resp.head_bytes()).await
        } else {
            conn.write_all(&resp.to_bytes()).await
        }
    }

    /// Streamed delivery, with single-range support.
    #[allow(clippy::too_many_arguments)]
    async fn serve_large(
        &self,
        conn: &mut Connection,
        req: &Request,
        path: &Path,
        file_size: u64,
        mod_time: SystemTime,
        keep_alive: bool,
        remaining: u32,
        is_head: bool,
    ) -> std::io::Result<()> {
        let mut file = match File::open(path).await {
            Ok(file) => file,
            Err(_) => {
                return self
                    .send_error(
                        conn,
                        req,
                        500,
                        "Internal Server Error",
                        "Error opening file",
                        keep_alive,
                        remaining,
                    )
                    .await;
            }
        };

        let range = match req.headers.get("Range") {
            None => None,
            Some(header) => match parse_range(header, file_size) {
                Some(range) => Some(range),
                None => {
                    return self
                        .send_range_not_satisfiable(conn, req, file_size, keep_alive, remaining)
                        .await;
                }
            },
        };

        let mut resp;
        let body_len;
        match range {
            None => {
                resp = Response::new(200, "OK", req.version, Vec::new());
                body_len = None;
            }
            Some((start, end)) => {
                file.seek(std::io::SeekFrom::Start(start)).await?;
                resp = Response::new(206, "Partial Content", req.version, Vec::new());
                resp.headers.insert(
                    "Content-Range",
                    format!("bytes {start}-{end}/{file_size}"),
                );
                body_len = Some(end - start + 1);
            }
        }

        resp.headers.insert("Content-Type", mime::from_path(path));
        resp.headers.insert(
            "Content-Length",
            body_len.unwrap_or(file_size).to_string(),
        );
        resp.headers.insert("Accept-Ranges", "bytes");
        resp.headers
            .insert("Last-Modified", httpdate::fmt_http_date(mod_time));
        resp.headers.insert("Cache-Control", CACHE_CONTROL);
        stamp_date_server(&mut resp.headers);
        connection_headers(&mut resp.headers, keep_alive, remaining);

        conn.write_all(&resp.head_bytes()).await?;
        if !is_head {
            copy_chunks(&mut file, conn, body_len).await?;
        }
        Ok(())
    }

    /// 416 with the sentinel `Content-Range` and an empty body.
    async fn send_range_not_satisfiable(
        &self,
        conn: &mut Connection,
        req: &Request,
        file_size: u64,
        keep_alive: bool,
        remaining: u32,
    ) -> std::io::Result<()> {
        let mut resp = Response::new(416, "Range Not Satisfiable", req.version, Vec::new());
        resp.headers
            .insert("Content-Range", format!("bytes */{file_size}"));
        resp.headers.insert("Content-Length", "0");
        stamp_date_server(&mut resp.headers);
        connection_headers(&mut resp.headers, keep_alive, remaining);
        conn.write_all(&resp.head_bytes()).await
    }

    /// 304: headers only, no body and no `Content-Length`.
    async fn send_not_modified(
        &self,
        conn: &mut Connection,
        req: &Request,
        mod_time: SystemTime,
        keep_alive: bool,
        remaining: u32,
    ) -> std::io::Result<()> {
        let mut resp = Response::new(304, "Not Modified", req.version, Vec::new());
        resp.headers
            .insert("Last-Modified", httpdate::fmt_http_date(mod_time));
        resp.headers.insert("Cache-Control", CACHE_CONTROL);
        stamp_date_server(&mut resp.headers);
        connection_headers(&mut resp.headers, keep_alive, remaining);
        conn.write_all(&resp.head_bytes()).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_error(
        &self,
        conn: &mut Connection,
        req: &Request,
        status: u16,
        reason: &str,
        detail: &str,
        keep_alive: bool,
        remaining: u32,
    ) -> std::io::Result<()> {
        let body = format!("{status} - {detail}");
        let mut resp = Response::text(status, reason, req.version, &body);
        connection_headers(&mut resp.headers, keep_alive, remaining);
        resp.finalize();
        conn.write_all(&resp.to_bytes()).await
    }
}

impl StreamHandler for FileServer {
    fn serve<'a>(
        &'a self,
        req: &'a Request,
        conn: &'a mut Connection,
        keep_alive: bool,
        remaining: u32,
    ) -> Pin<Box<dyn Future<Output = std::io::Result<()>> + Send + 'a>> {
        Box::pin(self.serve_file(req, conn, keep_alive, remaining))
    }
}

/// Lexically normalise a request path into a root-relative one.
///
/// Empty and `.` components drop out; any `..` component is treated as a
/// traversal attempt and rejects the whole path, keeping resolution
/// inside the root without ever consulting the filesystem.
fn sanitize(raw: &str) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for part in raw.split('/') {
        match part {
            "" | "." => continue,
            ".." => return None,
            part => clean.push(part),
        }
    }
    Some(clean)
}

/// Parse `bytes=<start>-<end?>` against the file size. Both bounds are
/// inclusive; an omitted end means the last byte. Suffix ranges
/// (`bytes=-N`) and multi-range sets are not supported.
fn parse_range(header: &str, file_size: u64) -> Option<(u64, u64)> {
    let rest = header.strip_prefix("bytes=")?;
    let (start, end) = rest.split_once('-')?;
    if end.contains('-') {
        return None;
    }
    let start: u64 = start.parse().ok()?;
    let end: u64 = if end.is_empty() {
        file_size.checked_sub(1)?
    } else {
        end.parse().ok()?
    };
    if end >= file_size || start > end {
        return None;
    }
    Some((start, end))
}

fn truncate_to_seconds(t: SystemTime) -> SystemTime {
    let secs = t
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    UNIX_EPOCH + Duration::from_secs(secs)
}

fn stamp_date_server(headers: &mut HeaderMap) {
    headers.insert("Date", httpdate::fmt_http_date(SystemTime::now()));
    headers.insert("Server", SERVER_TOKEN);
}

/// Copy from file to connection in fixed-size chunks; `limit` bounds the
/// copy for ranged responses.
async fn copy_chunks(
    file: &mut File,
    conn: &mut Connection,
    limit: Option<u64>,
) -> std::io::Result<()> {
    let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
    let mut left = limit;
    loop {
        let want = match left {
            Some(0) => return Ok(()),
            Some(n) => n.min(STREAM_CHUNK_SIZE as u64) as usize,
            None => STREAM_CHUNK_SIZE,
        };
        let n = file.read(&mut buf[..want]).await?;
        if n == 0 {
            return match left {
                // The file shrank underneath us.
                Some(_) => Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "file shorter than advertised",
                )),
                None => Ok(()),
            };
        }
        conn.write_all(&buf[..n]).await?;
        if let Some(l) = &mut left {
            *l -= n as u64;
        }
    }
}
