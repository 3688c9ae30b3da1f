//! HTTP/1.1 wire types and codec.
//!
//! Byte-level request parsing with strict validation (method whitelist,
//! length caps, control-character rejection) and response framing
//! (Content-Length vs. chunked transfer encoding, SSE header forcing).
//! This crate knows nothing about sockets; the connection engine feeds it
//! buffers and writes out what it produces.

pub mod chunked;
pub mod headers;
pub mod method;
pub mod parser;
pub mod query;
pub mod reason;
pub mod request;
pub mod response;

pub use chunked::{encode_chunk, terminal_chunk, ChunkedDecoder, DecodeStatus};
pub use headers::{HeaderAccess, HeaderMap};
pub use method::Method;
pub use parser::{
    find_header_end, parse_request_head, parse_response_head, ParseError, RequestHead,
    ResponseHead, DEFAULT_MAX_HEADERS_SIZE, DEFAULT_MAX_CONTENT_SIZE,
};
pub use query::{parse_query, QueryError};
pub use reason::reason_phrase;
pub use request::HttpRequest;
pub use response::{serialize_response_head, HttpResponse, StreamChunk};
