//! The synchronous client.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use strix_http::chunked::ChunkedDecoder;
use strix_http::parser::parse_response_head;
use strix_http::{HeaderMap, Method};
use tracing::{debug, trace};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::request::{ClientRequest, ClientResponse};

const MAX_RESPONSE_HEAD: usize = 64 * 1024;

/// Synchronous HTTP/1.1 client. One connection per request; `Connection:
/// close` is the default so the server delimits EOF-framed bodies.
#[derive(Debug, Clone, Default)]
pub struct HttpClient {
    config: ClientConfig,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// GET a URL and accumulate the body.
    pub fn get(&self, url: impl Into<String>) -> Result<ClientResponse> {
        self.send(ClientRequest::get(url))
    }

    /// POST a body with the given content type.
    pub fn post(
        &self,
        url: impl Into<String>,
        content_type: &str,
        body: impl Into<Vec<u8>>,
    ) -> Result<ClientResponse> {
        self.send(
            ClientRequest::post(url)
                .header("Content-Type", content_type)
                .body(body),
        )
    }

    /// Send a request, accumulating the body into the response. Redirects
    /// are followed up to the configured limit.
    pub fn send(&self, request: ClientRequest) -> Result<ClientResponse> {
        self.send_inner(request, None)
    }

    /// Send a request, delivering body chunks to `on_chunk` as they arrive
    /// instead of accumulating. Redirect responses are returned verbatim:
    /// following them mid-stream is not defined.
    pub fn send_streaming(
        &self,
        request: ClientRequest,
        on_chunk: &mut dyn FnMut(&[u8]),
    ) -> Result<ClientResponse> {
        self.send_inner(request, Some(on_chunk))
    }

    fn send_inner(
        &self,
        mut request: ClientRequest,
        mut on_chunk: Option<&mut dyn FnMut(&[u8])>,
    ) -> Result<ClientResponse> {
        let streaming = on_chunk.is_some();
        let mut redirects = 0usize;
        loop {
            let url = Url::parse(&request.url)
                .map_err(|e| ClientError::InvalidUrl(format!("{}: {e}", request.url)))?;
            let sink = match on_chunk {
                Some(ref mut f) => Some(&mut **f as &mut dyn FnMut(&[u8])),
                None => None,
            };
            let response = self.exchange(&request, &url, sink)?;

            if self.config.follow_redirects && !streaming && response.is_redirect() {
                if let Some(location) = response.headers.get("Location") {
                    redirects += 1;
                    if redirects > self.config.max_redirects {
                        return Err(ClientError::TooManyRedirects(self.config.max_redirects));
                    }
                    let next = url
                        .join(location)
                        .map_err(|e| ClientError::InvalidUrl(format!("{location}: {e}")))?;
                    debug!(from = %request.url, to = %next, "following redirect");
                    if response.status == 303 {
                        request.method = Method::Get;
                        request.body.clear();
                    }
                    request.url = next.to_string();
                    continue;
                }
            }

            if let Some(complete) = request.on_complete.take() {
                complete(&response);
            }
            return Ok(response);
        }
    }

    /// One request/response on a fresh connection.
    fn exchange(
        &self,
        request: &ClientRequest,
        url: &Url,
        mut on_chunk: Option<&mut dyn FnMut(&[u8])>,
    ) -> Result<ClientResponse> {
        let scheme = url.scheme();
        if scheme != "http" {
            return Err(ClientError::UnsupportedScheme(scheme.to_string()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| ClientError::InvalidUrl("missing host".to_string()))?;
        let port = url.port().unwrap_or(80);
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|_| ClientError::Resolve(host.to_string()))?
            .next()
            .ok_or_else(|| ClientError::Resolve(host.to_string()))?;

        let stream = TcpStream::connect_timeout(&addr, self.config.connect_timeout)
            .map_err(ClientError::Connect)?;
        stream
            .set_read_timeout(Some(self.config.read_timeout))
            .map_err(ClientError::from_io)?;
        stream
            .set_write_timeout(Some(self.config.read_timeout))
            .map_err(ClientError::from_io)?;
        let _ = stream.set_nodelay(true);
        let mut stream = stream;

        let wire = build_request_bytes(request, url, &self.config);
        trace!(url = %request.url, bytes = wire.len(), "sending request");
        stream.write_all(&wire).map_err(ClientError::from_io)?;

        // Read the head; interim 100 responses are discarded.
        let mut buf: Vec<u8> = Vec::with_capacity(4096);
        let (head, mut remainder) = loop {
            match parse_response_head(&buf, MAX_RESPONSE_HEAD)
                .map_err(|e| ClientError::Protocol(e.to_string()))?
            {
                Some(head) if head.code == 100 => {
                    buf.drain(..head.consumed);
                }
                Some(head) => {
                    let remainder = buf[head.consumed..].to_vec();
                    break (head, remainder);
                }
                None => {
                    let mut chunk = [0u8; 8192];
                    let n = stream.read(&mut chunk).map_err(ClientError::from_io)?;
                    if n == 0 {
                        return Err(ClientError::Protocol(
                            "connection closed before response head".to_string(),
                        ));
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
            }
        };

        let mut response = ClientResponse {
            protocol: head.protocol,
            status: head.code,
            reason: head.reason,
            headers: head.headers,
            body: Vec::new(),
        };

        let no_body =
            request.method == Method::Head || matches!(response.status, 204 | 304);
        if no_body {
            return Ok(response);
        }

        let chunked = response
            .headers
            .get("Transfer-Encoding")
            .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"));

        if chunked {
            let mut decoder = ChunkedDecoder::new();
            loop {
                let mut decoded = Vec::new();
                let status = decoder
                    .decode(&remainder, &mut decoded)
                    .map_err(|e| ClientError::Protocol(e.to_string()))?;
                remainder.drain(..status.consumed);
                if !decoded.is_empty() {
                    deliver(&mut response, &mut on_chunk, &decoded);
                }
                if status.finished {
                    break;
                }
                let mut chunk = [0u8; 8192];
                let n = stream.read(&mut chunk).map_err(ClientError::from_io)?;
                if n == 0 {
                    return Err(ClientError::Protocol(
                        "connection closed mid chunked body".to_string(),
                    ));
                }
                remainder.extend_from_slice(&chunk[..n]);
            }
        } else if let Some(length) = response
            .headers
            .get("Content-Length")
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            remainder.truncate(length);
            let mut received = remainder.len();
            deliver(&mut response, &mut on_chunk, &remainder);
            let mut chunk = [0u8; 8192];
            while received < length {
                let n = stream.read(&mut chunk).map_err(ClientError::from_io)?;
                if n == 0 {
                    return Err(ClientError::Protocol(
                        "connection closed mid body".to_string(),
                    ));
                }
                let take = n.min(length - received);
                deliver(&mut response, &mut on_chunk, &chunk[..take]);
                received += take;
            }
        } else {
            // No framing: the body runs to EOF.
            deliver(&mut response, &mut on_chunk, &remainder);
            let mut chunk = [0u8; 8192];
            loop {
                let n = stream.read(&mut chunk).map_err(ClientError::from_io)?;
                if n == 0 {
                    break;
                }
                deliver(&mut response, &mut on_chunk, &chunk[..n]);
            }
        }

        Ok(response)
    }
}

fn deliver(
    response: &mut ClientResponse,
    on_chunk: &mut Option<&mut dyn FnMut(&[u8])>,
    data: &[u8],
) {
    if data.is_empty() {
        return;
    }
    match on_chunk {
        Some(f) => f(data),
        None => response.body.extend_from_slice(data),
    }
}

/// Serialize the request line, headers (with defaults filled in) and body.
pub(crate) fn build_request_bytes(
    request: &ClientRequest,
    url: &Url,
    config: &ClientConfig,
) -> Vec<u8> {
    let mut target = url.path().to_string();
    if target.is_empty() {
        target.push('/');
    }
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }

    let mut headers: HeaderMap = request.headers.clone();
    if !headers.contains("Host") {
        let host = url.host_str().unwrap_or_default();
        let value = match url.port() {
            Some(port) if port != 80 => format!("{host}:{port}"),
            _ => host.to_string(),
        };
        headers.insert("Host", value);
    }
    if !headers.contains("User-Agent") {
        headers.insert("User-Agent", config.user_agent.clone());
    }
    if !headers.contains("Accept") {
        headers.insert("Accept", "*/*");
    }
    if !headers.contains("Connection") {
        headers.insert("Connection", "close");
    }
    let needs_length = !request.body.is_empty()
        || matches!(request.method, Method::Post | Method::Put | Method::Patch);
    if needs_length && !headers.contains("Content-Length") {
        headers.insert("Content-Length", request.body.len().to_string());
    }

    let mut out = format!("{} {} HTTP/1.1\r\n", request.method, target).into_bytes();
    for (name, value) in headers.iter() {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&request.body);
    out
}
