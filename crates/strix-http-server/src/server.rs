//! Server construction and lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use strix_http::{HttpRequest, HttpResponse};
use strix_net::{addr, InterestSet, Reactor, ReactorHandle, TcpAcceptor};
use strix_session::SessionManager;
use thiserror::Error;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::engine::{Engine, LISTENER_TOKEN};
use crate::handler::{HandlerAction, Router};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Socket(#[from] strix_net::SocketError),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Reactor-driven HTTP/1.1 server.
///
/// Routes are registered before [`HttpServer::run`] / [`HttpServer::start`];
/// the handler list is not thread-safe to mutate while running, which the
/// consuming signatures enforce.
pub struct HttpServer {
    config: ServerConfig,
    router: Router,
    sessions: Option<Arc<SessionManager>>,
}

impl HttpServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            router: Router::new(),
            sessions: None,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Register a handler under a URI prefix. Dispatch walks prefixes in
    /// registration order.
    pub fn route(
        &mut self,
        prefix: impl Into<String>,
        handler: impl Fn(&HttpRequest, &mut HttpResponse) -> HandlerAction + Send + Sync + 'static,
    ) -> &mut Self {
        self.router.add(prefix, handler);
        self
    }

    /// Attach a session manager; enables the engine's central handling of
    /// DELETE requests carrying `Mcp-Session-Id`.
    pub fn attach_sessions(&mut self, sessions: Arc<SessionManager>) -> &mut Self {
        self.sessions = Some(sessions);
        self
    }

    /// Bind and run the reactor loop on the calling thread until stopped.
    pub fn run(self) -> Result<()> {
        let (mut reactor, engine, local_addr) = self.build()?;
        info!(%local_addr, "http server listening");
        reactor.run(&engine)?;
        Ok(())
    }

    /// Bind, then run the reactor on a background thread.
    pub fn start(self) -> Result<ServerHandle> {
        let (mut reactor, engine, local_addr) = self.build()?;
        let reactor_handle = reactor.handle();
        info!(%local_addr, "http server listening");
        let thread = std::thread::Builder::new()
            .name("strix-reactor".to_string())
            .spawn(move || {
                if let Err(e) = reactor.run(&engine) {
                    error!("reactor loop failed: {e}");
                }
            })
            .expect("failed to spawn reactor thread");
        Ok(ServerHandle {
            local_addr,
            reactor: reactor_handle,
            thread: Some(thread),
        })
    }

    fn build(self) -> Result<(Reactor, Engine, SocketAddr)> {
        let target = format!("{}:{}", self.config.host, self.config.port);
        let bind_addr = addr::parse_host_port(&target)?;
        let mut acceptor = TcpAcceptor::bind(bind_addr)?;
        let local_addr = acceptor.local_addr()?;

        let reactor = Reactor::new(self.config.reactor.clone())?;
        let handle = reactor.handle();
        handle.register(&mut acceptor, LISTENER_TOKEN, InterestSet::ACCEPTABLE)?;

        let engine = Engine::new(self.config, self.router, self.sessions, handle, acceptor);
        Ok((reactor, engine, local_addr))
    }
}

/// Handle to a running server; stopping joins the reactor thread and closes
/// in-flight connections.
pub struct ServerHandle {
    local_addr: SocketAddr,
    reactor: ReactorHandle,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Resolved bind address (meaningful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the reactor and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.reactor.stop();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
