//! The readiness reactor.
//!
//! A single-threaded event loop over the kernel readiness primitive. Sockets
//! are registered with an [`InterestSet`]; fired events are dispatched to an
//! [`EventSink`]. Events are edge-triggered: after a callback runs, the
//! socket produces no further events until it is re-registered (re-arming
//! with the same interest counts), so the owning engine re-arms explicitly
//! after each handler completes.
//!
//! A [`ReactorHandle`] is clonable and thread-safe; worker threads use it to
//! re-arm sockets and to stop the loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mio::event::Source;
use mio::{Events, Interest, Poll, Registry, Waker};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::SocketError;
use crate::Result;

pub use mio::Token;

/// Token reserved for the internal waker; never hand this to `register`.
pub const WAKER_TOKEN: Token = Token(usize::MAX);

/// Set of readiness interests for a registered socket.
///
/// `ACCEPTABLE` is readable-readiness on a listening socket; keeping it a
/// distinct bit lets the reactor route the event to the right callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterestSet(u8);

impl InterestSet {
    pub const ACCEPTABLE: InterestSet = InterestSet(0b001);
    pub const READABLE: InterestSet = InterestSet(0b010);
    pub const WRITABLE: InterestSet = InterestSet(0b100);

    pub fn contains(self, other: InterestSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    fn to_mio(self) -> Option<Interest> {
        let mut interest: Option<Interest> = None;
        if self.contains(Self::ACCEPTABLE) || self.contains(Self::READABLE) {
            interest = Some(Interest::READABLE);
        }
        if self.contains(Self::WRITABLE) {
            interest = Some(match interest {
                Some(i) => i.add(Interest::WRITABLE),
                None => Interest::WRITABLE,
            });
        }
        interest
    }
}

impl std::ops::BitOr for InterestSet {
    type Output = InterestSet;

    fn bitor(self, rhs: InterestSet) -> InterestSet {
        InterestSet(self.0 | rhs.0)
    }
}

/// Callback sink the reactor dispatches into.
///
/// Callbacks run on the reactor thread. A callback may re-register the
/// socket with a new interest set; if it does not, the socket receives no
/// further events.
pub trait EventSink: Send + Sync {
    /// A listening socket has pending connections.
    fn on_acceptable(&self, token: Token);
    /// A stream socket has readable data (or EOF).
    fn on_readable(&self, token: Token);
    /// A stream socket accepts writes again.
    fn on_writable(&self, token: Token);
    /// The socket was closed or errored at the transport level.
    fn on_closed(&self, token: Token);
    /// Periodic tick, fired once per poll round (at least every
    /// [`ReactorConfig::tick`]). Engines use it to revisit parked work.
    fn on_tick(&self) {}
}

/// Reactor tuning knobs.
#[derive(Debug, Clone)]
pub struct ReactorConfig {
    /// Upper bound on how long the loop sleeps without events; also the
    /// cadence of [`EventSink::on_tick`].
    pub tick: Duration,
    /// Capacity of the kernel event batch.
    pub events_capacity: usize,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(25),
            events_capacity: 1024,
        }
    }
}

struct Shared {
    registrations: Mutex<HashMap<usize, InterestSet>>,
    stop: AtomicBool,
}

/// Thread-safe handle for registration changes and shutdown.
#[derive(Clone)]
pub struct ReactorHandle {
    registry: Arc<Registry>,
    waker: Arc<Waker>,
    shared: Arc<Shared>,
}

impl ReactorHandle {
    /// Register (or re-arm) `source` under `token` with `interest`.
    ///
    /// Re-arming an already-registered socket with the same interest
    /// re-delivers an edge, which is exactly what a parked writer wants.
    pub fn register(&self, source: &mut dyn Source, token: Token, interest: InterestSet) -> Result<()> {
        let Some(mio_interest) = interest.to_mio() else {
            return Err(SocketError::Other(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty interest set",
            )));
        };
        let mut registrations = self.shared.registrations.lock();
        let known = registrations.contains_key(&token.0);
        let result = if known {
            source.reregister(&self.registry, token, mio_interest)
        } else {
            source.register(&self.registry, token, mio_interest)
        };
        result.map_err(SocketError::from_io)?;
        registrations.insert(token.0, interest);
        trace!(token = token.0, ?interest, "socket registered");
        Ok(())
    }

    /// Remove `source` from the reactor. Safe to call for tokens that were
    /// never registered.
    pub fn unregister(&self, source: &mut dyn Source, token: Token) -> Result<()> {
        let removed = self.shared.registrations.lock().remove(&token.0).is_some();
        if removed {
            source.deregister(&self.registry).map_err(SocketError::from_io)?;
            trace!(token = token.0, "socket unregistered");
        }
        Ok(())
    }

    /// Ask the loop to exit. Takes effect at the next poll round.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
        if let Err(e) = self.waker.wake() {
            warn!("reactor waker failed: {e}");
        }
    }

    /// Whether a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }

    fn interest_of(&self, token: Token) -> Option<InterestSet> {
        self.shared.registrations.lock().get(&token.0).copied()
    }
}

/// Single-threaded readiness multiplexer.
pub struct Reactor {
    poll: Poll,
    handle: ReactorHandle,
    config: ReactorConfig,
}

impl Reactor {
    pub fn new(config: ReactorConfig) -> Result<Self> {
        let poll = Poll::new().map_err(SocketError::from_io)?;
        let registry = poll.registry().try_clone().map_err(SocketError::from_io)?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN).map_err(SocketError::from_io)?;
        let shared = Arc::new(Shared {
            registrations: Mutex::new(HashMap::new()),
            stop: AtomicBool::new(false),
        });
        Ok(Self {
            poll,
            handle: ReactorHandle {
                registry: Arc::new(registry),
                waker: Arc::new(waker),
                shared,
            },
            config,
        })
    }

    /// Clonable handle for registrations and shutdown.
    pub fn handle(&self) -> ReactorHandle {
        self.handle.clone()
    }

    /// Run the event loop until [`ReactorHandle::stop`] is observed.
    ///
    /// All sink callbacks run on the calling thread.
    pub fn run(&mut self, sink: &dyn EventSink) -> Result<()> {
        let mut events = Events::with_capacity(self.config.events_capacity);
        debug!("reactor loop starting");
        while !self.handle.shared.stop.load(Ordering::Acquire) {
            match self.poll.poll(&mut events, Some(self.config.tick)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(SocketError::from_io(e)),
            }
            for event in events.iter() {
                let token = event.token();
                if token == WAKER_TOKEN {
                    continue;
                }
                // Unknown token: unregistered by a callback earlier in this
                // batch, or by a worker thread.
                let Some(interest) = self.handle.interest_of(token) else {
                    continue;
                };
                if event.is_error() {
                    sink.on_closed(token);
                    continue;
                }
                let mut delivered = false;
                if event.is_readable() {
                    if interest.contains(InterestSet::ACCEPTABLE) {
                        sink.on_acceptable(token);
                    } else {
                        sink.on_readable(token);
                    }
                    delivered = true;
                }
                if event.is_writable() && self.handle.interest_of(token).is_some() {
                    sink.on_writable(token);
                    delivered = true;
                }
                if !delivered && (event.is_read_closed() || event.is_write_closed()) {
                    sink.on_closed(token);
                }
            }
            sink.on_tick();
        }
        debug!("reactor loop stopped");
        Ok(())
    }
}
