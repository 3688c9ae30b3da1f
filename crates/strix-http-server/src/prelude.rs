//! Common imports for server construction.

pub use crate::config::ServerConfig;
pub use crate::cors::CorsConfig;
pub use crate::handler::HandlerAction;
pub use crate::server::{HttpServer, ServerHandle};
pub use strix_http::{HttpRequest, HttpResponse, Method, StreamChunk};
