//! Streaming request/response head parsing with strict validation.
//!
//! The parser works over a growing receive buffer: callers feed whatever
//! arrived and get back either "need more", a parsed head plus the number of
//! bytes consumed, or a terminal [`ParseError`] carrying the HTTP status to
//! answer with.

use thiserror::Error;

use crate::headers::HeaderMap;
use crate::method::Method;
use crate::request::HttpRequest;

/// Default cap on the request head (request line + headers + terminator).
pub const DEFAULT_MAX_HEADERS_SIZE: usize = 8 * 1024;
/// Default cap on the request body.
pub const DEFAULT_MAX_CONTENT_SIZE: usize = 2 * 1024 * 1024;

pub const MAX_METHOD_LEN: usize = 16;
pub const MAX_URI_LEN: usize = 8192;
pub const MAX_HEADER_NAME_LEN: usize = 256;
pub const MAX_HEADER_VALUE_LEN: usize = 8192;
const MIN_PROTOCOL_LEN: usize = 8;

/// Terminal parse failure; maps onto the response status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("request head exceeds the configured cap")]
    HeadersTooLarge,
    #[error("request body exceeds the configured cap")]
    BodyTooLarge,
    #[error("unsupported Expect value")]
    ExpectationFailed,
    #[error("malformed message: {0}")]
    Malformed(String),
}

impl ParseError {
    pub fn status(&self) -> u16 {
        match self {
            ParseError::HeadersTooLarge => 431,
            ParseError::BodyTooLarge => 413,
            ParseError::ExpectationFailed => 417,
            ParseError::Malformed(_) => 400,
        }
    }
}

/// Locate the head terminator (`\r\n\r\n` or `\n\n`); returns the index just
/// past it.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    for i in 0..buf.len() {
        if buf[i..].starts_with(b"\r\n\r\n") {
            return Some(i + 4);
        }
        if buf[i..].starts_with(b"\n\n") {
            return Some(i + 2);
        }
    }
    None
}

/// A parsed request head and how many buffer bytes it consumed.
#[derive(Debug)]
pub struct RequestHead {
    pub request: HttpRequest,
    pub consumed: usize,
}

/// Parse a request head out of `buf`.
///
/// `Ok(None)` means the terminator has not arrived yet; the buffer growing
/// past `max_headers_size` without one is a [`ParseError::HeadersTooLarge`].
pub fn parse_request_head(
    buf: &[u8],
    max_headers_size: usize,
) -> Result<Option<RequestHead>, ParseError> {
    let Some(end) = find_header_end(buf) else {
        if buf.len() > max_headers_size {
            return Err(ParseError::HeadersTooLarge);
        }
        return Ok(None);
    };
    if end > max_headers_size {
        return Err(ParseError::HeadersTooLarge);
    }

    let head = std::str::from_utf8(&buf[..end])
        .map_err(|_| ParseError::Malformed("head is not valid UTF-8".into()))?;
    let mut lines = split_head_lines(head);

    let request_line = lines
        .next()
        .ok_or_else(|| ParseError::Malformed("empty request head".into()))?;
    let (method, uri, protocol) = parse_request_line(request_line)?;

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = parse_header_line(line)?;
        headers.insert(name, value);
    }

    Ok(Some(RequestHead {
        request: HttpRequest {
            remote_addr: None,
            method,
            uri: uri.to_string(),
            protocol: protocol.to_string(),
            headers,
            body: Vec::new(),
        },
        consumed: end,
    }))
}

/// A parsed response head (client side).
#[derive(Debug)]
pub struct ResponseHead {
    pub protocol: String,
    pub code: u16,
    pub reason: String,
    pub headers: HeaderMap,
    pub consumed: usize,
}

/// Parse a response head out of `buf`; `Ok(None)` means need more data.
pub fn parse_response_head(
    buf: &[u8],
    max_headers_size: usize,
) -> Result<Option<ResponseHead>, ParseError> {
    let Some(end) = find_header_end(buf) else {
        if buf.len() > max_headers_size {
            return Err(ParseError::HeadersTooLarge);
        }
        return Ok(None);
    };

    let head = std::str::from_utf8(&buf[..end])
        .map_err(|_| ParseError::Malformed("head is not valid UTF-8".into()))?;
    let mut lines = split_head_lines(head);

    let status_line = lines
        .next()
        .ok_or_else(|| ParseError::Malformed("empty status line".into()))?;
    let mut parts = status_line.splitn(3, ' ');
    let protocol = parts
        .next()
        .ok_or_else(|| ParseError::Malformed("missing protocol".into()))?;
    validate_protocol(protocol)?;
    let code = parts
        .next()
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or_else(|| ParseError::Malformed("bad status code".into()))?;
    let reason = parts.next().unwrap_or("").to_string();

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = parse_header_line(line)?;
        headers.insert(name, value);
    }

    Ok(Some(ResponseHead {
        protocol: protocol.to_string(),
        code,
        reason,
        headers,
        consumed: end,
    }))
}

/// Head lines, tolerant of bare-LF separators; the trailing blank line(s)
/// from the terminator come out empty and are skipped by callers.
fn split_head_lines(head: &str) -> impl Iterator<Item = &str> {
    head.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line))
}

fn parse_request_line(line: &str) -> Result<(Method, &str, &str), ParseError> {
    let mut parts = line.splitn(3, ' ');
    let method_token = parts
        .next()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ParseError::Malformed("missing method".into()))?;
    let uri = parts
        .next()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ParseError::Malformed("missing request-target".into()))?;
    let protocol = parts
        .next()
        .ok_or_else(|| ParseError::Malformed("missing protocol".into()))?;

    if method_token.len() > MAX_METHOD_LEN {
        return Err(ParseError::Malformed("method too long".into()));
    }
    let method = Method::from_token(method_token)
        .ok_or_else(|| ParseError::Malformed(format!("unknown method '{method_token}'")))?;

    if uri.len() > MAX_URI_LEN {
        return Err(ParseError::Malformed("request-target too long".into()));
    }
    if uri.bytes().any(|b| b < 0x20 || b == 0x7f) {
        return Err(ParseError::Malformed(
            "control character in request-target".into(),
        ));
    }

    if protocol.contains(' ') {
        return Err(ParseError::Malformed("extra token in request line".into()));
    }
    validate_protocol(protocol)?;

    Ok((method, uri, protocol))
}

fn validate_protocol(protocol: &str) -> Result<(), ParseError> {
    if protocol.len() < MIN_PROTOCOL_LEN {
        return Err(ParseError::Malformed("protocol token too short".into()));
    }
    let Some(version) = protocol.strip_prefix("HTTP/") else {
        return Err(ParseError::Malformed("protocol is not HTTP".into()));
    };
    let mut dots = version.split('.');
    let (major, minor) = (dots.next(), dots.next());
    let valid = dots.next().is_none()
        && matches!((major, minor), (Some(ma), Some(mi))
            if !ma.is_empty() && !mi.is_empty()
                && ma.bytes().all(|b| b.is_ascii_digit())
                && mi.bytes().all(|b| b.is_ascii_digit()));
    if !valid {
        return Err(ParseError::Malformed("bad protocol version".into()));
    }
    Ok(())
}

fn parse_header_line(line: &str) -> Result<(&str, &str), ParseError> {
    let colon = line
        .find(':')
        .ok_or_else(|| ParseError::Malformed("header line missing ':'".into()))?;
    let name = &line[..colon];
    let value = line[colon + 1..].trim_matches([' ', '\t']);

    if name.is_empty() || name.len() > MAX_HEADER_NAME_LEN {
        return Err(ParseError::Malformed("bad header name length".into()));
    }
    if name.bytes().any(|b| b <= 0x20 || b == 0x7f) {
        return Err(ParseError::Malformed("invalid header name".into()));
    }
    if value.len() > MAX_HEADER_VALUE_LEN {
        return Err(ParseError::Malformed("header value too long".into()));
    }
    // CTLs are rejected in values, TAB excepted; DEL always rejected.
    if value.bytes().any(|b| (b < 0x20 && b != 0x09) || b == 0x7f) {
        return Err(ParseError::Malformed("control character in header value".into()));
    }
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(buf: &[u8]) -> Result<Option<RequestHead>, ParseError> {
        parse_request_head(buf, DEFAULT_MAX_HEADERS_SIZE)
    }

    #[test]
    fn parses_simple_get() {
        let head = parse(b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(head.request.method, Method::Get);
        assert_eq!(head.request.uri, "/hello");
        assert_eq!(head.request.protocol, "HTTP/1.1");
        assert_eq!(head.request.headers.get("Host"), Some("x"));
        assert_eq!(head.consumed, 32);
    }

    #[test]
    fn accepts_bare_lf_terminator() {
        let head = parse(b"GET / HTTP/1.1\nHost: x\n\n").unwrap().unwrap();
        assert_eq!(head.request.headers.get("Host"), Some("x"));
    }

    #[test]
    fn incomplete_head_needs_more() {
        assert!(parse(b"GET / HTTP/1.1\r\nHost: x\r\n").unwrap().is_none());
        assert!(parse(b"GE").unwrap().is_none());
    }

    #[test]
    fn header_names_are_normalized() {
        let head = parse(b"GET / HTTP/1.1\r\nx-forwarded-for: 10.0.0.1\r\n\r\n")
            .unwrap()
            .unwrap();
        let names: Vec<&str> = head.request.headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["X-Forwarded-For"]);
    }

    #[test]
    fn rejects_unknown_method() {
        let err = parse(b"BREW /pot HTTP/1.1\r\n\r\n").unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn rejects_overlong_method() {
        let err = parse(b"AAAAAAAAAAAAAAAAA / HTTP/1.1\r\n\r\n").unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn rejects_bad_protocol() {
        assert!(parse(b"GET / HTTP/1\r\n\r\n").is_err());
        assert!(parse(b"GET / SPDY/1.1\r\n\r\n").is_err());
        assert!(parse(b"GET / HTTP/x.y\r\n\r\n").is_err());
        assert!(parse(b"GET / HTTP/1.1 extra\r\n\r\n").is_err());
    }

    #[test]
    fn rejects_control_chars_in_uri() {
        assert!(parse(b"GET /he\x01llo HTTP/1.1\r\n\r\n").is_err());
        assert!(parse(b"GET /he\x7fllo HTTP/1.1\r\n\r\n").is_err());
    }

    #[test]
    fn rejects_overlong_uri() {
        let mut raw = b"GET /".to_vec();
        raw.extend(std::iter::repeat_n(b'a', MAX_URI_LEN));
        raw.extend_from_slice(b" HTTP/1.1\r\n\r\n");
        let err = parse_request_head(&raw, 64 * 1024).unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn header_value_allows_tab_but_not_other_ctls() {
        assert!(parse(b"GET / HTTP/1.1\r\nA: x\ty\r\n\r\n").unwrap().is_some());
        assert!(parse(b"GET / HTTP/1.1\r\nA: x\x01y\r\n\r\n").is_err());
        assert!(parse(b"GET / HTTP/1.1\r\nA: x\x7fy\r\n\r\n").is_err());
    }

    #[test]
    fn rejects_header_without_colon() {
        assert!(parse(b"GET / HTTP/1.1\r\nBogusLine\r\n\r\n").is_err());
    }

    #[test]
    fn head_cap_boundary() {
        // Build a head of exactly `max` bytes: accepted.
        let max = 256;
        let skeleton = b"GET / HTTP/1.1\r\nPad: ".len() + b"\r\n\r\n".len();
        let padding = max - skeleton;
        let mut raw = b"GET / HTTP/1.1\r\nPad: ".to_vec();
        raw.extend(std::iter::repeat_n(b'x', padding));
        raw.extend_from_slice(b"\r\n\r\n");
        assert_eq!(raw.len(), max);
        assert!(parse_request_head(&raw, max).unwrap().is_some());

        // One more byte of padding: 431.
        let mut over = b"GET / HTTP/1.1\r\nPad: ".to_vec();
        over.extend(std::iter::repeat_n(b'x', padding + 1));
        over.extend_from_slice(b"\r\n\r\n");
        let err = parse_request_head(&over, max).unwrap_err();
        assert_eq!(err.status(), 431);
    }

    #[test]
    fn oversized_buffer_without_terminator_is_431() {
        let raw = vec![b'a'; DEFAULT_MAX_HEADERS_SIZE + 1];
        assert_eq!(parse(&raw).unwrap_err(), ParseError::HeadersTooLarge);
    }

    #[test]
    fn parses_response_head() {
        let head = parse_response_head(
            b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi",
            DEFAULT_MAX_HEADERS_SIZE,
        )
        .unwrap()
        .unwrap();
        assert_eq!(head.code, 200);
        assert_eq!(head.reason, "OK");
        assert_eq!(head.headers.get("Content-Length"), Some("2"));
        assert_eq!(head.consumed, 38);
    }

    #[test]
    fn parses_response_reason_with_spaces() {
        let head = parse_response_head(b"HTTP/1.1 404 Not Found\r\n\r\n", 1024)
            .unwrap()
            .unwrap();
        assert_eq!(head.code, 404);
        assert_eq!(head.reason, "Not Found");
    }
}
