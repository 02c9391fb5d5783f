//! The demo application: a handful of buffered routes plus the static
//! file tree. Everything here sits on top of the public handler
//! interface; nothing in the core depends on it.

use std::path::PathBuf;

use once_cell::sync::Lazy;

use crate::fileserver::FileServer;
use crate::request::Request;
use crate::response::{Response, SERVER_TOKEN};
use crate::router::Router;

/// Home page template, read once on first use.
static HOME_TEMPLATE: Lazy<Option<String>> =
    Lazy::new(|| std::fs::read_to_string("templates/home.html").ok());

/// Build the demo route table over the given static root.
pub fn demo_router(static_root: impl Into<PathBuf>) -> Router {
    let root: PathBuf = static_root.into();
    let favicon_path = root.join("static/favicon.ico");

    let mut router = Router::new();
    router.register("GET", "/", home);
    router.register("GET", "/hello", hello);
    router.register("POST", "/echo", echo);
    router.register("GET", "/api/users", users);
    router.register("GET", "/version", version);
    router.register("GET", "/favicon.ico", move |req| favicon(req, &favicon_path));
    router.set_stream_handler(FileServer::new(root));
    router
}

fn home(req: &Request) -> Response {
    match HOME_TEMPLATE.as_deref() {
        Some(html) => {
            let mut resp = Response::new(200, "OK", req.version, html.as_bytes().to_vec());
            resp.headers
                .insert("Content-Type", "text/html; charset=utf-8");
            resp
        }
        None => Response::text(
            500,
            "Internal Server Error",
            req.version,
            "Error loading homepage template",
        ),
    }
}

fn hello(req: &Request) -> Response {
    Response::text(200, "OK", req.version, "Hello from sockeye!")
}

/// Echo the request body back as JSON.
fn echo(req: &Request) -> Response {
    let message = String::from_utf8_lossy(&req.body);
    let mut resp = Response::new(
        200,
        "OK",
        req.version,
        format!(r#"{{"message":"{message}"}}"#).into_bytes(),
    );
    resp.headers.insert("Content-Type", "application/json");
    resp
}

fn users(req: &Request) -> Response {
    let mut resp = Response::new(
        200,
        "OK",
        req.version,
        br#"[{"id":1,"name":"Ada"},{"id":2,"name":"Grace"}]"#.to_vec(),
    );
    resp.headers.insert("Content-Type", "application/json");
    resp
}

fn version(req: &Request) -> Response {
    let mut resp = Response::new(
        200,
        "OK",
        req.version,
        format!(
            r#"{{"protocol":"{}","server":"{}"}}"#,
            req.version, SERVER_TOKEN
        )
        .into_bytes(),
    );
    resp.headers.insert("Content-Type", "application/json");
    resp
}

fn favicon(req: &Request, path: &std::path::Path) -> Response {
    match std::fs::read(path) {
        Ok(content) => {
            let mut resp = Response::new(200, "OK", req.version, content);
            resp.headers.insert("Content-Type", "image/x-icon");
            resp.headers.insert("Cache-Control", "public, max-age=86400");
            resp
        }
        Err(_) => Response::text(404, "Not Found", req.version, "Favicon not found"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::HeaderMap;
    use crate::response::Version;

    fn req(method: &str, path: &str, body: &[u8]) -> Request {
        Request {
            method: method.to_string(),
            path: path.to_string(),
            version: Version::Http11,
            headers: HeaderMap::new(),
            body: body.to_vec(),
        }
    }

    #[test]
    fn hello_is_plain_text() {
        let resp = hello(&req("GET", "/hello", b""));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"Hello from sockeye!");
        assert_eq!(resp.headers.get("Content-Type"), Some("text/plain"));
    }

    #[test]
    fn echo_wraps_the_body_in_json() {
        let resp = echo(&req("POST", "/echo", b"HELLO"));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, br#"{"message":"HELLO"}"#);
        assert_eq!(resp.headers.get("Content-Type"), Some("application/json"));
    }

    #[test]
    fn users_returns_the_fixture_list() {
        let resp = users(&req("GET", "/api/users", b""));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, br#"[{"id":1,"name":"Ada"},{"id":2,"name":"Grace"}]"#);
    }

    #[test]
    fn version_reports_protocol_and_server_token() {
        let resp = version(&req("GET", "/version", b""));
        let body = String::from_utf8(resp.body).unwrap();
        assert!(body.contains(r#""protocol":"HTTP/1.1""#));
        assert!(body.contains(SERVER_TOKEN));
    }
}
