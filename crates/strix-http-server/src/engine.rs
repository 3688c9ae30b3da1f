//! The connection engine: reactor callbacks driving per-connection state.
//!
//! All socket I/O happens here, on the reactor thread. Handlers run inline
//! or on the worker pool; either way the pattern is the same: take the
//! request out of the connection, run the handler with no table lock held,
//! then re-look up the connection (it may have died meanwhile), queue the
//! response bytes, and re-arm the socket for writable.

use std::collections::HashMap;
use std::net::Shutdown;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use strix_http::chunked::ChunkedDecoder;
use strix_http::response::serialize_response_head;
use strix_http::{
    encode_chunk, parse_request_head, terminal_chunk, HttpRequest, HttpResponse, Method,
    StreamChunk,
};
use strix_net::{EventSink, InterestSet, ReactorHandle, TcpAcceptor, Token};
use strix_session::SessionManager;
use tracing::{debug, trace, warn};

use crate::config::ServerConfig;
use crate::connection::{ConnState, Connection, ExchangeMeta};
use crate::handler::{DispatchOutcome, Router};
use crate::worker::ThreadPool;

pub(crate) const LISTENER_TOKEN: Token = Token(0);

pub(crate) struct EngineShared {
    pub(crate) config: ServerConfig,
    router: Router,
    handle: ReactorHandle,
    acceptor: Mutex<TcpAcceptor>,
    connections: Mutex<HashMap<usize, Connection>>,
    next_token: AtomicUsize,
    pool: Option<ThreadPool>,
    sessions: Option<Arc<SessionManager>>,
}

/// Cloneable engine facade handed to the reactor and the worker pool.
#[derive(Clone)]
pub(crate) struct Engine {
    shared: Arc<EngineShared>,
}

enum ReadOutcome {
    Done,
    Dispatch(HttpRequest, ExchangeMeta),
}

enum Advance {
    Outcome(ReadOutcome),
    Remove,
}

enum BodyProgress {
    Complete,
    NeedMore,
    Fail(u16),
}

enum EndAction {
    None,
    Remove,
    /// Buffered bytes may already hold the next request (or the body after
    /// a 100-continue); re-enter the read path.
    ProcessBuffered,
}

impl Engine {
    pub(crate) fn new(
        config: ServerConfig,
        router: Router,
        sessions: Option<Arc<SessionManager>>,
        handle: ReactorHandle,
        acceptor: TcpAcceptor,
    ) -> Self {
        let pool = match config.thread_pool_size {
            0 => None,
            n => Some(ThreadPool::new(n)),
        };
        Self {
            shared: Arc::new(EngineShared {
                config,
                router,
                handle,
                acceptor: Mutex::new(acceptor),
                connections: Mutex::new(HashMap::new()),
                next_token: AtomicUsize::new(1),
                pool,
                sessions,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Accept
    // ------------------------------------------------------------------

    fn accept_ready(&self) {
        let acceptor = self.shared.acceptor.lock();
        loop {
            match acceptor.accept() {
                Ok((socket, peer)) => {
                    let token = Token(self.shared.next_token.fetch_add(1, Ordering::Relaxed));
                    let mut conn = Connection::new(socket, peer);
                    if !Self::arm(&self.shared.handle, &mut conn, token, InterestSet::READABLE) {
                        continue;
                    }
                    trace!(token = token.0, peer = %peer, "connection accepted");
                    self.shared.connections.lock().insert(token.0, conn);
                }
                Err(e) if e.is_would_block() => break,
                Err(e) => {
                    warn!("accept failed: {e}");
                    break;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    fn drive_read(&self, token: Token) {
        match self.read_and_advance(token) {
            ReadOutcome::Done => {}
            ReadOutcome::Dispatch(request, meta) => self.dispatch(token, request, meta),
        }
    }

    fn read_and_advance(&self, token: Token) -> ReadOutcome {
        let mut table = self.shared.connections.lock();
        let Some(conn) = table.get_mut(&token.0) else {
            return ReadOutcome::Done;
        };

        let mut tmp = [0u8; 8192];
        loop {
            match conn.socket.recv(&mut tmp) {
                Ok(n) => conn.recv_buf.extend_from_slice(&tmp[..n]),
                Err(e) if e.is_would_block() => break,
                Err(e) => {
                    trace!(token = token.0, error = %e, "connection read ended");
                    Self::remove_locked(&self.shared.handle, &mut table, token);
                    return ReadOutcome::Done;
                }
            }
        }

        // A streaming response only reads to notice EOF; discard payload.
        if conn.streaming_active {
            conn.recv_buf.clear();
            return ReadOutcome::Done;
        }

        match Self::advance_conn(&self.shared, conn, token) {
            Advance::Outcome(outcome) => outcome,
            Advance::Remove => {
                Self::remove_locked(&self.shared.handle, &mut table, token);
                ReadOutcome::Done
            }
        }
    }

    /// Advance the receive-side state machine as far as buffered data
    /// allows. Runs with the table locked; never calls user handlers.
    fn advance_conn(shared: &EngineShared, conn: &mut Connection, token: Token) -> Advance {
        loop {
            match conn.state {
                ConnState::Idle => {
                    if conn.recv_buf.is_empty() {
                        if !Self::arm(&shared.handle, conn, token, InterestSet::READABLE) {
                            return Advance::Remove;
                        }
                        return Advance::Outcome(ReadOutcome::Done);
                    }
                    conn.state = ConnState::ReceivingHeaders;
                }

                ConnState::ReceivingHeaders => {
                    match parse_request_head(&conn.recv_buf, shared.config.max_request_headers_size)
                    {
                        Err(e) => {
                            debug!(token = token.0, error = %e, "request head rejected");
                            return Self::fail_exchange(shared, conn, token, e.status());
                        }
                        Ok(None) => {
                            if !Self::arm(&shared.handle, conn, token, InterestSet::READABLE) {
                                return Advance::Remove;
                            }
                            return Advance::Outcome(ReadOutcome::Done);
                        }
                        Ok(Some(head)) => {
                            let _ = conn.recv_buf.split_to(head.consumed);
                            let mut request = head.request;
                            request.remote_addr = Some(conn.peer);

                            if request.is_chunked() {
                                conn.chunked_decoder = Some(ChunkedDecoder::new());
                                conn.content_length = 0;
                            } else if let Some(raw) = request.headers.get("Content-Length") {
                                match raw.trim().parse::<usize>() {
                                    Ok(n) if n <= shared.config.max_request_content_size => {
                                        conn.content_length = n;
                                    }
                                    Ok(_) => {
                                        return Self::fail_exchange(shared, conn, token, 413);
                                    }
                                    Err(_) => {
                                        return Self::fail_exchange(shared, conn, token, 400);
                                    }
                                }
                            } else {
                                conn.content_length = 0;
                            }

                            match request.expectation().as_deref() {
                                Some("100-continue") if request.is_http11() => {
                                    conn.send_buf
                                        .extend_from_slice(b"HTTP/1.1 100 Continue\r\n\r\n");
                                    conn.request = Some(request);
                                    conn.state = ConnState::Sending100Continue;
                                    if !Self::arm(&shared.handle, conn, token, InterestSet::WRITABLE)
                                    {
                                        return Advance::Remove;
                                    }
                                    return Advance::Outcome(ReadOutcome::Done);
                                }
                                Some("100-continue") | None => {
                                    conn.request = Some(request);
                                    conn.state = ConnState::ReceivingBody;
                                }
                                Some(_) => {
                                    return Self::fail_exchange(shared, conn, token, 417);
                                }
                            }
                        }
                    }
                }

                ConnState::ReceivingBody => {
                    let progress = Self::pump_body(shared, conn);
                    match progress {
                        BodyProgress::Fail(status) => {
                            return Self::fail_exchange(shared, conn, token, status);
                        }
                        BodyProgress::NeedMore => {
                            if !Self::arm(&shared.handle, conn, token, InterestSet::READABLE) {
                                return Advance::Remove;
                            }
                            return Advance::Outcome(ReadOutcome::Done);
                        }
                        BodyProgress::Complete => {
                            let Some(request) = conn.request.take() else {
                                return Advance::Remove;
                            };
                            let meta = ExchangeMeta::from_request(&request);
                            conn.state = if shared.pool.is_some() {
                                ConnState::ProcessingAsync
                            } else {
                                ConnState::Processing
                            };
                            return Advance::Outcome(ReadOutcome::Dispatch(request, meta));
                        }
                    }
                }

                // Write-driven states: buffered bytes wait their turn.
                _ => return Advance::Outcome(ReadOutcome::Done),
            }
        }
    }

    fn pump_body(shared: &EngineShared, conn: &mut Connection) -> BodyProgress {
        let max_content = shared.config.max_request_content_size;
        let Connection {
            chunked_decoder,
            request,
            recv_buf,
            content_length,
            ..
        } = conn;
        let Some(request) = request.as_mut() else {
            return BodyProgress::Fail(400);
        };

        if let Some(decoder) = chunked_decoder.as_mut() {
            match decoder.decode(&recv_buf[..], &mut request.body) {
                Err(_) => BodyProgress::Fail(400),
                Ok(status) => {
                    let _ = recv_buf.split_to(status.consumed);
                    if request.body.len() > max_content {
                        BodyProgress::Fail(413)
                    } else if status.finished {
                        BodyProgress::Complete
                    } else {
                        BodyProgress::NeedMore
                    }
                }
            }
        } else {
            let needed = content_length.saturating_sub(request.body.len());
            let take = needed.min(recv_buf.len());
            if take > 0 {
                let bytes = recv_buf.split_to(take);
                request.body.extend_from_slice(&bytes);
            }
            if request.body.len() >= *content_length {
                BodyProgress::Complete
            } else {
                BodyProgress::NeedMore
            }
        }
    }

    /// Queue an error response and flip to the send side; keep-alive does
    /// not survive protocol violations.
    fn fail_exchange(
        shared: &EngineShared,
        conn: &mut Connection,
        token: Token,
        status: u16,
    ) -> Advance {
        let response = HttpResponse::with_status(status);
        let meta = ExchangeMeta::error();
        Self::finalize_response(shared, conn, response, &meta);
        if !Self::arm(&shared.handle, conn, token, InterestSet::WRITABLE) {
            return Advance::Remove;
        }
        Advance::Outcome(ReadOutcome::Done)
    }

    // ------------------------------------------------------------------
    // Handler execution
    // ------------------------------------------------------------------

    fn dispatch(&self, token: Token, request: HttpRequest, meta: ExchangeMeta) {
        if let Some(pool) = &self.shared.pool {
            let engine = self.clone();
            pool.execute(move || engine.execute_request(token, request, meta));
        } else {
            self.execute_request(token, request, meta);
        }
    }

    /// Run the handler chain and install the response. Called from the
    /// reactor thread or a worker; holds no table lock while handlers run.
    fn execute_request(&self, token: Token, mut request: HttpRequest, meta: ExchangeMeta) {
        if meta.head_only {
            // HEAD dispatches as GET; the body is cleared before sending.
            request.method = Method::Get;
        }
        let (response, close) = self.run_router(&request, &meta);

        let mut table = self.shared.connections.lock();
        let Some(conn) = table.get_mut(&token.0) else {
            trace!(token = token.0, "connection vanished before response");
            return;
        };
        if !matches!(
            conn.state,
            ConnState::Processing | ConnState::ProcessingAsync
        ) {
            trace!(token = token.0, state = ?conn.state, "state moved on; dropping response");
            return;
        }
        if close {
            Self::remove_locked(&self.shared.handle, &mut table, token);
            return;
        }
        Self::finalize_response(&self.shared, conn, response, &meta);
        let interest = if conn.streaming_active {
            InterestSet::READABLE | InterestSet::WRITABLE
        } else {
            InterestSet::WRITABLE
        };
        if !Self::arm(&self.shared.handle, conn, token, interest) {
            Self::remove_locked(&self.shared.handle, &mut table, token);
        }
    }

    fn run_router(&self, request: &HttpRequest, meta: &ExchangeMeta) -> (HttpResponse, bool) {
        let mut response = HttpResponse::new();

        // OPTIONS is handled centrally: CORS preflight or 405.
        if meta.method == Method::Options {
            match &self.shared.config.cors {
                Some(cors) if cors.enabled => {
                    response.set_status(204);
                }
                _ => {
                    response.set_status(405);
                    response.set_header("Allow", "GET, POST, PUT, DELETE, HEAD, OPTIONS, PATCH");
                }
            }
            return (response, false);
        }

        // DELETE is handled centrally when a session manager is attached.
        if meta.method == Method::Delete {
            if let Some(sessions) = &self.shared.sessions {
                match request.headers.get("Mcp-Session-Id") {
                    Some(id) => {
                        let status = if sessions.terminate(id) { 200 } else { 404 };
                        response.set_status(status);
                    }
                    None => {
                        response.set_status(400);
                    }
                }
                return (response, false);
            }
        }

        match self.shared.router.dispatch(request, &mut response) {
            DispatchOutcome::Close => (response, true),
            DispatchOutcome::Respond => (response, false),
        }
    }

    /// Serialize the head, queue bytes, and move to `SendingHeaders`.
    fn finalize_response(
        shared: &EngineShared,
        conn: &mut Connection,
        mut response: HttpResponse,
        meta: &ExchangeMeta,
    ) {
        if let Some(cors) = &shared.config.cors {
            if cors.enabled {
                cors.apply(&mut response.headers, meta.method == Method::Options);
            }
        }

        // Streaming HEAD: refuse to stream, answer with headers only.
        if response.streaming && meta.head_only {
            response.streaming = false;
            response.stream_pull = None;
            response.on_stream_end = None;
            response.body.clear();
        }

        let keep_alive =
            meta.keep_alive_requested && shared.config.keep_alive_enabled && !meta.force_close;
        let head = serialize_response_head(&response, &meta.protocol, keep_alive);
        conn.keepalive = head.keep_alive;
        response.use_chunked = head.chunked;
        if response.streaming && !head.chunked {
            // Raw streaming (HTTP/1.0): the close delimits the body.
            conn.keepalive = false;
        }
        conn.send_buf.extend_from_slice(&head.bytes);
        if meta.head_only {
            // Content-Length above reflects the body it would have had.
            response.body.clear();
        }
        conn.streaming_active = response.streaming;
        conn.response = Some(response);
        conn.state = ConnState::SendingHeaders;
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    fn drive_write(&self, token: Token) {
        let mut table = self.shared.connections.lock();
        let Some(conn) = table.get_mut(&token.0) else {
            return;
        };
        let handle = &self.shared.handle;
        let mut end = EndAction::None;
        let mut pulled_this_round = false;

        'machine: loop {
            // Flush whatever is queued.
            while !conn.send_buf.is_empty() {
                match conn.socket.send(&conn.send_buf[..]) {
                    Ok(n) => {
                        let _ = conn.send_buf.split_to(n);
                    }
                    Err(e) if e.is_would_block() => {
                        let interest = Self::write_interest(conn);
                        if !Self::arm(handle, conn, token, interest) {
                            end = EndAction::Remove;
                        }
                        break 'machine;
                    }
                    Err(e) => {
                        debug!(token = token.0, error = %e, "write failed");
                        end = EndAction::Remove;
                        break 'machine;
                    }
                }
            }

            match conn.state {
                ConnState::Sending100Continue => {
                    conn.state = ConnState::ReceivingBody;
                    if !Self::arm(handle, conn, token, InterestSet::READABLE) {
                        end = EndAction::Remove;
                    } else {
                        end = EndAction::ProcessBuffered;
                    }
                    break 'machine;
                }

                ConnState::SendingHeaders => {
                    if conn.streaming_active {
                        conn.state = ConnState::StreamingChunked;
                        continue 'machine;
                    }
                    if let Some(resp) = conn.response.as_mut() {
                        let body = std::mem::take(&mut resp.body);
                        if !body.is_empty() {
                            conn.send_buf.extend_from_slice(&body);
                        }
                    }
                    conn.state = ConnState::SendingBody;
                }

                ConnState::SendingBody => {
                    // Response fully flushed; negotiate the next exchange.
                    if conn.keepalive {
                        conn.reset_exchange();
                        if !Self::arm(handle, conn, token, InterestSet::READABLE) {
                            end = EndAction::Remove;
                        } else if !conn.recv_buf.is_empty() {
                            end = EndAction::ProcessBuffered;
                        }
                    } else {
                        let _ = conn.socket.shutdown(Shutdown::Write);
                        conn.state = ConnState::Closing;
                        if !Self::arm(handle, conn, token, InterestSet::READABLE) {
                            end = EndAction::Remove;
                        }
                    }
                    break 'machine;
                }

                ConnState::StreamingChunked => {
                    if pulled_this_round {
                        // One pull per write opportunity; the re-arm below
                        // delivers the next edge.
                        if !Self::arm(
                            handle,
                            conn,
                            token,
                            InterestSet::READABLE | InterestSet::WRITABLE,
                        ) {
                            end = EndAction::Remove;
                        }
                        break 'machine;
                    }
                    let Some(resp) = conn.response.as_mut() else {
                        end = EndAction::Remove;
                        break 'machine;
                    };
                    let Some(pull) = resp.stream_pull.as_mut() else {
                        end = EndAction::Remove;
                        break 'machine;
                    };
                    match pull() {
                        StreamChunk::Data(data) => {
                            pulled_this_round = true;
                            // An empty chunk would read as the terminal
                            // frame on the wire; skip it.
                            if !data.is_empty() {
                                conn.chunks_sent += 1;
                                if resp.use_chunked {
                                    conn.send_buf.extend_from_slice(&encode_chunk(&data));
                                } else {
                                    conn.send_buf.extend_from_slice(&data);
                                }
                            }
                        }
                        StreamChunk::Pending => {
                            conn.parked = true;
                            // Stay armed for readable so peer EOF surfaces;
                            // the tick re-arms writable.
                            if !Self::arm(handle, conn, token, InterestSet::READABLE) {
                                end = EndAction::Remove;
                            }
                            break 'machine;
                        }
                        StreamChunk::End => {
                            if resp.use_chunked {
                                conn.send_buf.extend_from_slice(terminal_chunk());
                            }
                            if let Some(done) = resp.on_stream_end.take() {
                                done();
                            }
                            conn.streaming_active = false;
                            conn.state = ConnState::SendingBody;
                        }
                    }
                }

                ConnState::Closing => {
                    // Stray writable after half-close; wait for peer EOF.
                    break 'machine;
                }

                _ => break 'machine,
            }
        }

        match end {
            EndAction::None => {}
            EndAction::Remove => Self::remove_locked(handle, &mut table, token),
            EndAction::ProcessBuffered => {
                drop(table);
                self.drive_read(token);
            }
        }
    }

    fn write_interest(conn: &Connection) -> InterestSet {
        if conn.streaming_active {
            InterestSet::READABLE | InterestSet::WRITABLE
        } else {
            InterestSet::WRITABLE
        }
    }

    // ------------------------------------------------------------------
    // Shared plumbing
    // ------------------------------------------------------------------

    fn arm(
        handle: &ReactorHandle,
        conn: &mut Connection,
        token: Token,
        interest: InterestSet,
    ) -> bool {
        match handle.register(&mut conn.socket, token, interest) {
            Ok(()) => true,
            Err(e) => {
                warn!(token = token.0, error = %e, "re-arm failed");
                false
            }
        }
    }

    fn remove_locked(
        handle: &ReactorHandle,
        table: &mut HashMap<usize, Connection>,
        token: Token,
    ) {
        if let Some(mut conn) = table.remove(&token.0) {
            let _ = handle.unregister(&mut conn.socket, token);
            if conn.streaming_active {
                if let Some(resp) = conn.response.as_mut() {
                    if let Some(done) = resp.on_stream_end.take() {
                        done();
                    }
                }
            }
            trace!(token = token.0, peer = %conn.peer, "connection dropped");
        }
    }

    fn wake_parked(&self) {
        let mut table = self.shared.connections.lock();
        let handle = &self.shared.handle;
        let mut dead = Vec::new();
        for (token, conn) in table.iter_mut() {
            if !conn.parked {
                continue;
            }
            conn.parked = false;
            if handle
                .register(
                    &mut conn.socket,
                    Token(*token),
                    InterestSet::READABLE | InterestSet::WRITABLE,
                )
                .is_err()
            {
                dead.push(Token(*token));
            }
        }
        for token in dead {
            Self::remove_locked(handle, &mut table, token);
        }
    }
}

impl EventSink for Engine {
    fn on_acceptable(&self, token: Token) {
        debug_assert_eq!(token, LISTENER_TOKEN);
        self.accept_ready();
    }

    fn on_readable(&self, token: Token) {
        self.drive_read(token);
    }

    fn on_writable(&self, token: Token) {
        self.drive_write(token);
    }

    fn on_closed(&self, token: Token) {
        if token == LISTENER_TOKEN {
            warn!("listening socket reported closed");
            return;
        }
        let mut table = self.shared.connections.lock();
        Self::remove_locked(&self.shared.handle, &mut table, token);
    }

    fn on_tick(&self) {
        self.wake_parked();
    }
}
