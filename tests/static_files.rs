//! File-server behaviour: delivery modes, conditional requests, ranges
//! and path confinement, exercised over real sockets and a throwaway
//! static root.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use tempfile::TempDir;

use sockeye::{FileServer, Router, Server, Version};

const BIG_FILE_SIZE: usize = 2 * 1024 * 1024;

fn pattern_byte(i: usize) -> u8 {
    (i % 251) as u8
}

/// Throwaway static root:
///   static/small.txt          short text file
///   static/big.bin            2 MiB patterned binary, streamed branch
///   static/sub/index.html     directory with an index
///   static/empty/             directory without one
fn static_root() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("static");
    std::fs::create_dir_all(root.join("sub")).unwrap();
    std::fs::create_dir_all(root.join("empty")).unwrap();

    std::fs::write(root.join("small.txt"), b"Hello, static world!\n").unwrap();
    std::fs::write(root.join("sub/index.html"), b"<h1>sub index</h1>").unwrap();

    let big: Vec<u8> = (0..BIG_FILE_SIZE).map(pattern_byte).collect();
    std::fs::write(root.join("big.bin"), big).unwrap();
    dir
}

fn start(router: Router) -> SocketAddr {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let server = Server::bind("127.0.0.1:0", Version::Http11, router).unwrap();
            tx.send(server.local_addr()).unwrap();
            server.run().await;
        });
    });
    rx.recv().unwrap()
}

fn file_server(root: &TempDir) -> Router {
    let mut router = Router::new();
    router.set_stream_handler(FileServer::new(root.path()));
    router
}

fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    stream
}

fn get(stream: &mut TcpStream, target: &str, extra_headers: &str) -> (String, Vec<u8>) {
    request(stream, "GET", target, extra_headers)
}

fn request(
    stream: &mut TcpStream,
    method: &str,
    target: &str,
    extra_headers: &str,
) -> (String, Vec<u8>) {
    stream
        .write_all(format!("{method} {target} HTTP/1.1\r\nHost: x\r\n{extra_headers}\r\n").as_bytes())
        .unwrap();
    read_response(stream)
}

fn read_response(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let head = read_head(stream);
    let len = content_length(&head).unwrap_or(0);
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).unwrap();
    (head, body)
}

fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).unwrap();
        assert!(n > 0, "connection closed before headers completed");
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

fn content_length(head: &str) -> Option<usize> {
    header_value(head, "content-length").map(|v| v.parse().unwrap())
}

fn header_value(head: &str, name: &str) -> Option<String> {
    head.lines().find_map(|line| {
        let (n, v) = line.split_once(':')?;
        n.eq_ignore_ascii_case(name).then(|| v.trim().to_string())
    })
}

/// The stream must yield no more bytes within the (short) timeout.
fn assert_no_body(stream: &mut TcpStream) {
    stream
        .set_read_timeout(Some(Duration::from_millis(300)))
        .unwrap();
    let mut buf = [0u8; 1];
    match stream.read(&mut buf) {
        Ok(0) | Err(_) => {}
        Ok(_) => panic!("unexpected body bytes after headers"),
    }
}

#[test]
fn small_file_is_served_from_memory_with_cache_headers() {
    let root = static_root();
    let addr = start(file_server(&root));
    let mut stream = connect(addr);

    let (head, body) = get(&mut stream, "/static/small.txt", "");

    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(
        header_value(&head, "content-type").unwrap(),
        "text/plain; charset=utf-8"
    );
    assert_eq!(header_value(&head, "accept-ranges").unwrap(), "bytes");
    assert!(header_value(&head, "last-modified").unwrap().ends_with("GMT"));
    assert_eq!(
        header_value(&head, "cache-control").unwrap(),
        "public, max-age=3600"
    );
    assert_eq!(body, b"Hello, static world!\n");
}

#[test]
fn fresh_if_modified_since_gets_304_on_the_same_connection() {
    let root = static_root();
    let addr = start(file_server(&root));
    let mut stream = connect(addr);

    let (head, _) = get(&mut stream, "/static/small.txt", "");
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    let last_modified = header_value(&head, "last-modified").unwrap();

    stream
        .write_all(
            format!(
                "GET /static/small.txt HTTP/1.1\r\nHost: x\r\nIf-Modified-Since: {last_modified}\r\n\r\n"
            )
            .as_bytes(),
        )
        .unwrap();
    let head = read_head(&mut stream);

    assert!(head.starts_with("HTTP/1.1 304 Not Modified\r\n"));
    assert_eq!(header_value(&head, "content-length"), None);
    assert_eq!(header_value(&head, "last-modified").unwrap(), last_modified);
    assert_no_body(&mut stream);
}

#[test]
fn stale_if_modified_since_gets_the_full_file() {
    let root = static_root();
    let addr = start(file_server(&root));
    let mut stream = connect(addr);

    let (head, body) = get(
        &mut stream,
        "/static/small.txt",
        "If-Modified-Since: Mon, 01 Jan 1990 00:00:00 GMT\r\n",
    );
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, b"Hello, static world!\n");
}

#[test]
fn traversal_attempt_is_forbidden() {
    let root = static_root();
    let addr = start(file_server(&root));
    let mut stream = connect(addr);

    let (head, body) = get(&mut stream, "/static/../etc/passwd", "");
    assert!(head.starts_with("HTTP/1.1 403 Forbidden\r\n"));
    assert_eq!(body, b"403 - Forbidden");
}

#[test]
fn missing_file_is_404() {
    let root = static_root();
    let addr = start(file_server(&root));
    let mut stream = connect(addr);

    let (head, body) = get(&mut stream, "/static/absent.txt", "");
    assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert_eq!(body, b"404 - File Not Found");
}

#[test]
fn directory_with_index_serves_it() {
    let root = static_root();
    let addr = start(file_server(&root));
    let mut stream = connect(addr);

    let (head, body) = get(&mut stream, "/static/sub", "");
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(
        header_value(&head, "content-type").unwrap(),
        "text/html; charset=utf-8"
    );
    assert_eq!(body, b"<h1>sub index</h1>");
}

#[test]
fn directory_without_index_is_forbidden() {
    let root = static_root();
    let addr = start(file_server(&root));
    let mut stream = connect(addr);

    let (head, body) = get(&mut stream, "/static/empty", "");
    assert!(head.starts_with("HTTP/1.1 403 Forbidden\r\n"));
    assert_eq!(body, b"403 - Directory listing disabled");
}

#[test]
fn large_file_streams_in_full() {
    let root = static_root();
    let addr = start(file_server(&root));
    let mut stream = connect(addr);

    let (head, body) = get(&mut stream, "/static/big.bin", "");
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(content_length(&head).unwrap(), BIG_FILE_SIZE);
    assert_eq!(header_value(&head, "accept-ranges").unwrap(), "bytes");
    assert_eq!(body.len(), BIG_FILE_SIZE);
    assert_eq!(body[0], pattern_byte(0));
    assert_eq!(body[BIG_FILE_SIZE / 2], pattern_byte(BIG_FILE_SIZE / 2));
    assert_eq!(body[BIG_FILE_SIZE - 1], pattern_byte(BIG_FILE_SIZE - 1));
}

#[test]
fn range_request_returns_exactly_the_requested_bytes() {
    let root = static_root();
    let addr = start(file_server(&root));
    let mut stream = connect(addr);

    let (head, body) = get(&mut stream, "/static/big.bin", "Range: bytes=1000-1999\r\n");

    assert!(head.starts_with("HTTP/1.1 206 Partial Content\r\n"));
    assert_eq!(
        header_value(&head, "content-range").unwrap(),
        format!("bytes 1000-1999/{BIG_FILE_SIZE}")
    );
    assert_eq!(content_length(&head).unwrap(), 1000);
    let expected: Vec<u8> = (1000..2000).map(pattern_byte).collect();
    assert_eq!(body, expected);
}

#[test]
fn open_ended_range_runs_to_the_last_byte() {
    let root = static_root();
    let addr = start(file_server(&root));
    let mut stream = connect(addr);

    let start_at = BIG_FILE_SIZE - 152;
    let (head, body) = get(
        &mut stream,
        "/static/big.bin",
        &format!("Range: bytes={start_at}-\r\n"),
    );

    assert!(head.starts_with("HTTP/1.1 206 Partial Content\r\n"));
    assert_eq!(content_length(&head).unwrap(), 152);
    assert_eq!(
        header_value(&head, "content-range").unwrap(),
        format!("bytes {start_at}-{}/{BIG_FILE_SIZE}", BIG_FILE_SIZE - 1)
    );
    let expected: Vec<u8> = (start_at..BIG_FILE_SIZE).map(pattern_byte).collect();
    assert_eq!(body, expected);
}

#[test]
fn unsatisfiable_range_gets_416_with_sentinel() {
    let root = static_root();
    let addr = start(file_server(&root));
    let mut stream = connect(addr);

    let (head, body) = get(
        &mut stream,
        "/static/big.bin",
        "Range: bytes=5000000-6000000\r\n",
    );

    assert!(head.starts_with("HTTP/1.1 416 Range Not Satisfiable\r\n"));
    assert_eq!(
        header_value(&head, "content-range").unwrap(),
        format!("bytes */{BIG_FILE_SIZE}")
    );
    assert!(body.is_empty());
}

#[test]
fn inverted_range_gets_416() {
    let root = static_root();
    let addr = start(file_server(&root));
    let mut stream = connect(addr);

    let (head, _) = get(&mut stream, "/static/big.bin", "Range: bytes=2000-1000\r\n");
    assert!(head.starts_with("HTTP/1.1 416 Range Not Satisfiable\r\n"));
}

#[test]
fn head_on_a_small_file_sends_headers_only() {
    let root = static_root();
    let addr = start(file_server(&root));
    let mut stream = connect(addr);

    stream
        .write_all(b"HEAD /static/small.txt HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let head = read_head(&mut stream);

    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(content_length(&head).unwrap(), b"Hello, static world!\n".len());
    assert_no_body(&mut stream);
}

#[test]
fn head_on_a_large_file_sends_headers_only() {
    let root = static_root();
    let addr = start(file_server(&root));
    let mut stream = connect(addr);

    stream
        .write_all(b"HEAD /static/big.bin HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let head = read_head(&mut stream);

    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(content_length(&head).unwrap(), BIG_FILE_SIZE);
    assert_no_body(&mut stream);
}

#[test]
fn query_strings_are_ignored_for_resolution() {
    let root = static_root();
    let addr = start(file_server(&root));
    let mut stream = connect(addr);

    let (head, body) = get(&mut stream, "/static/small.txt?v=123", "");
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, b"Hello, static world!\n");
}

#[test]
fn post_to_static_path_skips_the_streaming_branch() {
    let root = static_root();
    let addr = start(file_server(&root));
    let mut stream = connect(addr);

    let (head, body) = request(&mut stream, "POST", "/static/small.txt", "");
    // no buffered route matches, so this is a router 404
    assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert_eq!(body, b"404 - Page Not Found");
}
