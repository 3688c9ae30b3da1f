//! Route handlers and prefix dispatch.

use std::sync::Arc;

use strix_http::{HttpRequest, HttpResponse};

/// What a handler decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerAction {
    /// Not mine; try the next registered handler.
    FallThrough,
    /// Final status for this exchange.
    Status(u16),
    /// Terminate the connection immediately, sending nothing.
    Close,
}

/// A route callback. Runs on the reactor thread unless the worker pool is
/// enabled, so it must not block on I/O in the synchronous configuration.
pub type RouteHandler = Arc<dyn Fn(&HttpRequest, &mut HttpResponse) -> HandlerAction + Send + Sync>;

/// Outcome of walking the handler list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchOutcome {
    Respond,
    Close,
}

/// Ordered `(prefix, handler)` list. The first handler whose prefix is a
/// character-wise prefix of the request-target wins; `FallThrough` keeps
/// walking; no match is a 404.
#[derive(Default, Clone)]
pub struct Router {
    routes: Vec<(String, RouteHandler)>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        prefix: impl Into<String>,
        handler: impl Fn(&HttpRequest, &mut HttpResponse) -> HandlerAction + Send + Sync + 'static,
    ) {
        self.routes.push((prefix.into(), Arc::new(handler)));
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub(crate) fn dispatch(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> DispatchOutcome {
        for (prefix, handler) in &self.routes {
            if !request.uri.starts_with(prefix.as_str()) {
                continue;
            }
            match handler(request, response) {
                HandlerAction::FallThrough => continue,
                HandlerAction::Status(code) => {
                    response.code = Some(code);
                    return DispatchOutcome::Respond;
                }
                HandlerAction::Close => return DispatchOutcome::Close,
            }
        }
        response.code = Some(404);
        DispatchOutcome::Respond
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefixes: Vec<&str> = self.routes.iter().map(|(p, _)| p.as_str()).collect();
        f.debug_struct("Router").field("prefixes", &prefixes).finish()
    }
}
