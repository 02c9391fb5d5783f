//! An HTTP/1.x server built straight on the OS socket layer.
//!
//! No higher-level HTTP library underneath: the listener is assembled by
//! hand (socket → options → bind → listen), requests are parsed off the
//! wire, and responses are written back over a connection that enforces
//! absolute read/write deadlines. Persistent connections, streamed and
//! ranged file delivery, conditional 304s and gzip re-encoding are all
//! part of the core.
//!
//! ```no_run
//! use sockeye::{demo, Server, Version};
//!
//! #[tokio::main]
//! async fn main() {
//!     let router = demo::demo_router("public");
//!     let server = Server::bind("127.0.0.1:8080", Version::Http11, router).unwrap();
//!     server.run().await;
//! }
//! ```

pub mod compress;
pub mod demo;
pub mod error;
pub mod fileserver;
pub mod headers;
pub mod mime;
pub mod net;
pub mod request;
pub mod response;
pub mod router;
pub mod server;

pub use error::Error;
pub use fileserver::{FileServer, MAX_IN_MEMORY_SIZE};
pub use headers::HeaderMap;
pub use net::{Connection, Listener};
pub use request::{parse_request, Request, MAX_HEADER_SIZE, MAX_REQUEST_SIZE};
pub use response::{write_response, Response, Version, SERVER_TOKEN};
pub use router::{Dispatch, Router, StreamHandler};
pub use server::{Server, KEEP_ALIVE_TIMEOUT, MAX_REQUESTS_PER_CONNECTION};
