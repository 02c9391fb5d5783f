use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::net::Connection;
use crate::request::Request;
use crate::response::Response;

/// A buffered handler: pure function from request to response.
/// Application-level failures come back as 4xx/5xx responses, never errors.
pub type HandlerFn = Box<dyn Fn(&Request) -> Response + Send + Sync>;

/// A handler that writes the entire response itself, headers included.
///
/// The connection is lent to the handler for the duration of the call;
/// it must not be stored or shared. `keep_alive` and `remaining` tell the
/// handler which connection headers to emit.
pub trait StreamHandler: Send + Sync {
    fn serve<'a>(
        &'a self,
        req: &'a Request,
        conn: &'a mut Connection,
        keep_alive: bool,
        remaining: u32,
    ) -> Pin<Box<dyn Future<Output = std::io::Result<()>> + Send + 'a>>;
}

/// What the router decided for one request.
pub enum Dispatch<'a> {
    /// A response to serialise and write.
    Buffered(Response),
    /// Hand the connection to this handler; it emits everything itself.
    Streaming(&'a dyn StreamHandler),
}

/// Exact-match route table plus one optional streaming handler.
///
/// Built once at startup, read-only afterwards; workers share it behind
/// an `Arc` without further synchronisation.
#[derive(Default)]
pub struct Router {
    routes: HashMap<String, HandlerFn>,
    stream_handler: Option<Box<dyn StreamHandler>>,
}

impl Router {
    pub fn new() -> Router {
        Router::default()
    }

    pub fn register<H>(&mut self, method: &str, path: &str, handler: H)
    where
        H: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        self.routes
            .insert(format!("{method}:{path}"), Box::new(handler));
    }

    pub fn set_stream_handler<H: StreamHandler + 'static>(&mut self, handler: H) {
        self.stream_handler = Some(Box::new(handler));
    }

    /// Static-file requests take the streaming branch.
    pub fn needs_streaming(&self, req: &Request) -> bool {
        (req.method == "GET" || req.method == "HEAD") && req.path.starts_with("/static/")
    }

    /// Buffered routing: exact `METHOD:PATH` match or a plain-text 404.
    pub fn route(&self, req: &Request) -> Response {
        let key = format!("{}:{}", req.method, req.path);
        match self.routes.get(&key) {
            Some(handler) => handler(req),
            None => Response::text(404, "Not Found", req.version, "404 - Page Not Found"),
        }
    }

    /// Decide the branch for this request.
    pub fn dispatch(&self, req: &Request) -> Dispatch<'_> {
        if self.needs_streaming(req) {
            match &self.stream_handler {
                Some(handler) => Dispatch::Streaming(handler.as_ref()),
                None => Dispatch::Buffered(Response::text(
                    500,
                    "Internal Server Error",
                    req.version,
                    "500 - Stream handler not configured",
                )),
            }
        } else {
            Dispatch::Buffered(self.route(req))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::HeaderMap;
    use crate::response::Version;

    fn req(method: &str, path: &str) -> Request {
        Request {
            method: method.to_string(),
            path: path.to_string(),
            version: Version::Http11,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    struct Nop;

    impl StreamHandler for Nop {
        fn serve<'a>(
            &'a self,
            _req: &'a Request,
            _conn: &'a mut Connection,
            _keep_alive: bool,
            _remaining: u32,
        ) -> Pin<Box<dyn Future<Output = std::io::Result<()>> + Send + 'a>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[test]
    fn registered_route_is_hit() {
        let mut router = Router::new();
        router.register("GET", "/ping", |r| {
            Response::text(200, "OK", r.version, "pong")
        });

        let resp = router.route(&req("GET", "/ping"));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"pong");
    }

    #[test]
    fn miss_synthesises_a_plain_text_404() {
        let router = Router::new();
        let resp = router.route(&req("GET", "/nope"));
        assert_eq!(resp.status, 404);
        assert_eq!(resp.body, b"404 - Page Not Found");
        assert_eq!(resp.headers.get("Content-Type"), Some("text/plain"));
    }

    #[test]
    fn method_is_part_of_the_key() {
        let mut router = Router::new();
        router.register("POST", "/echo", |r| {
            Response::text(200, "OK", r.version, "ok")
        });

        assert_eq!(router.route(&req("POST", "/echo")).status, 200);
        assert_eq!(router.route(&req("GET", "/echo")).status, 404);
    }

    #[test]
    fn streaming_branch_is_get_or_head_under_static() {
        let router = Router::new();
        assert!(router.needs_streaming(&req("GET", "/static/a.txt")));
        assert!(router.needs_streaming(&req("HEAD", "/static/a.txt")));
        assert!(!router.needs_streaming(&req("POST", "/static/a.txt")));
        assert!(!router.needs_streaming(&req("GET", "/api/users")));
        assert!(!router.needs_streaming(&req("GET", "/staticfile")));
    }

    #[test]
    fn dispatch_picks_the_streaming_variant() {
        let mut router = Router::new();
        router.set_stream_handler(Nop);
        assert!(matches!(
            router.dispatch(&req("GET", "/static/a.txt")),
            Dispatch::Streaming(_)
        ));
        assert!(matches!(
            router.dispatch(&req("GET", "/hello")),
            Dispatch::Buffered(_)
        ));
    }

    #[test]
    fn static_route_without_handler_is_a_500() {
        let router = Router::new();
        match router.dispatch(&req("GET", "/static/a.txt")) {
            Dispatch::Buffered(resp) => assert_eq!(resp.status, 500),
            Dispatch::Streaming(_) => panic!("no stream handler was registered"),
        }
    }
}
