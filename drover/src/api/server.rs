//! One protocol server: a UDP endpoint serving the vehicles of one class.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use minstant::Instant;
use parking_lot::Mutex;
use thiserror::Error;

use crate::net::{Endpoint, UdpSocket};
use crate::trace::{debug, error, info, trace, warn};
use crate::vehicle::class::ProtocolClass;

use super::message::{self, ErrorCode, MAX_DATAGRAM_SIZE, Request, Response, SessionId};
use super::provider::ApiProvider;

/// Worker sleep when the socket has nothing to read.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Requested `SO_RCVBUF`, sized for bursts of control commands.
const RECV_BUFFER_SIZE: usize = 256 * 1024;

/// Sessions idle for longer than this are dropped when a new client arrives.
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Client endpoints tracked per server.
pub const MAX_SESSIONS: usize = 1024;

/// Server start failure.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: Endpoint,
        source: std::io::Error,
    },
    #[error("failed to spawn server worker: {0}")]
    Spawn(std::io::Error),
}

/// Signals a running server (or router) to stop from another thread.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy)]
struct Session {
    id: SessionId,
    last_seen: Instant,
}

/// Client endpoint to session, bounded by idle time and capacity.
#[derive(Debug)]
struct SessionTable {
    sessions: HashMap<Endpoint, Session>,
    idle_timeout: Duration,
    capacity: usize,
}

impl SessionTable {
    fn new(idle_timeout: Duration, capacity: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            idle_timeout,
            capacity: capacity.max(1),
        }
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Opens a fresh session for `from`, replacing any previous one.
    fn open(&mut self, from: Endpoint, now: Instant) -> SessionId {
        if !self.sessions.contains_key(&from) {
            self.make_room(now);
        }
        let id = SessionId::generate();
        self.sessions.insert(from, Session { id, last_seen: now });
        id
    }

    /// Refreshes the session of `from`, pinning a new one on first contact.
    fn touch(&mut self, from: Endpoint, now: Instant) -> SessionId {
        if let Some(session) = self.sessions.get_mut(&from) {
            session.last_seen = now;
            return session.id;
        }
        self.open(from, now)
    }

    fn make_room(&mut self, now: Instant) {
        let idle_timeout = self.idle_timeout;
        self.sessions
            .retain(|_, s| now.duration_since(s.last_seen) <= idle_timeout);
        while self.sessions.len() >= self.capacity {
            let Some(oldest) = self
                .sessions
                .iter()
                .max_by_key(|(_, s)| now.duration_since(s.last_seen))
                .map(|(endpoint, _)| *endpoint)
            else {
                break;
            };
            self.sessions.remove(&oldest);
        }
    }

    fn clear(&mut self) {
        self.sessions.clear();
    }
}

type Sessions = Arc<Mutex<SessionTable>>;

/// A protocol server bound to `(address, base_port + class offset)`.
pub struct ProtocolServer {
    class: ProtocolClass,
    endpoint: Endpoint,
    provider: Arc<ApiProvider>,
    shutdown: Arc<AtomicBool>,
    socket: Option<Arc<UdpSocket>>,
    workers: Vec<JoinHandle<()>>,
    sessions: Sessions,
}

impl ProtocolServer {
    #[must_use]
    pub fn new(class: ProtocolClass, endpoint: Endpoint, provider: Arc<ApiProvider>) -> Self {
        Self {
            class,
            endpoint,
            provider,
            shutdown: Arc::new(AtomicBool::new(false)),
            socket: None,
            workers: Vec::new(),
            sessions: Arc::new(Mutex::new(SessionTable::new(
                SESSION_IDLE_TIMEOUT,
                MAX_SESSIONS,
            ))),
        }
    }

    /// Overrides the session idle timeout and capacity (at least one).
    #[must_use]
    pub fn with_session_limits(mut self, idle_timeout: Duration, capacity: usize) -> Self {
        self.sessions = Arc::new(Mutex::new(SessionTable::new(idle_timeout, capacity)));
        self
    }

    #[must_use]
    pub const fn class(&self) -> ProtocolClass {
        self.class
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.socket.is_some()
    }

    /// Bound endpoint while running, else the configured one.
    #[must_use]
    pub fn local_endpoint(&self) -> Endpoint {
        self.socket
            .as_ref()
            .and_then(|s| s.local_addr().ok())
            .unwrap_or(self.endpoint)
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.shutdown))
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Binds and starts `threads` workers (at least one).
    ///
    /// With `blocking`, one worker runs on the calling thread and this call
    /// returns only after a [`StopHandle`] fires; the server is stopped on
    /// return.
    ///
    /// # Errors
    ///
    /// [`ServerError::Bind`] if the endpoint cannot be bound and
    /// [`ServerError::Spawn`] if a worker thread cannot be created.
    pub fn start(&mut self, blocking: bool, threads: usize) -> Result<(), ServerError> {
        if self.is_running() {
            return Ok(());
        }
        let threads = threads.max(1);
        let socket = UdpSocket::bind(self.endpoint).map_err(|source| {
            error!(endpoint = %self.endpoint, error = %source, "failed to bind protocol server");
            ServerError::Bind {
                endpoint: self.endpoint,
                source,
            }
        })?;
        if let Err(e) = socket.set_recv_buffer_size(RECV_BUFFER_SIZE) {
            warn!(class = %self.class, error = %e, "could not grow receive buffer");
        }
        let socket = Arc::new(socket);
        self.shutdown.store(false, Ordering::Release);
        self.socket = Some(Arc::clone(&socket));
        info!(class = %self.class, endpoint = %self.local_endpoint(), threads, blocking, "protocol server starting");

        let spawned = if blocking { threads - 1 } else { threads };
        for index in 0..spawned {
            let worker = self.worker(Arc::clone(&socket));
            let handle = thread::Builder::new()
                .name(format!("drover-api-{}-{index}", self.class))
                .spawn(move || worker.run());
            match handle {
                Ok(handle) => self.workers.push(handle),
                Err(e) => {
                    error!(class = %self.class, error = %e, "failed to spawn server worker");
                    self.stop();
                    return Err(ServerError::Spawn(e));
                }
            }
        }

        if blocking {
            self.worker(socket).run();
            self.stop();
        }
        Ok(())
    }

    fn worker(&self, socket: Arc<UdpSocket>) -> Worker {
        Worker {
            class: self.class,
            socket,
            provider: Arc::clone(&self.provider),
            sessions: Arc::clone(&self.sessions),
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Stops workers and releases the socket. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!(class = %self.class, "server worker panicked");
            }
        }
        if self.socket.take().is_some() {
            self.sessions.lock().clear();
            info!(class = %self.class, "protocol server stopped");
        }
    }
}

impl Drop for ProtocolServer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    class: ProtocolClass,
    socket: Arc<UdpSocket>,
    provider: Arc<ApiProvider>,
    sessions: Sessions,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    fn run(self) {
        debug!(class = %self.class, "server worker started");
        let mut recv_buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut send_buf = vec![0u8; MAX_DATAGRAM_SIZE];

        while !self.shutdown.load(Ordering::Acquire) {
            match self.socket.try_recv_from(&mut recv_buf) {
                Ok(Some((n, from))) => {
                    let response = self.handle(&recv_buf[..n], from);
                    self.reply(&response, from, &mut send_buf);
                }
                Ok(None) => thread::sleep(IDLE_SLEEP),
                Err(e) => {
                    warn!(class = %self.class, error = %e, "recv failed");
                    thread::sleep(IDLE_SLEEP);
                }
            }
        }
        debug!(class = %self.class, "server worker exiting");
    }

    fn handle(&self, bytes: &[u8], from: Endpoint) -> Response {
        let request = match message::decode::<Request>(bytes) {
            Ok(request) => request,
            Err(e) => {
                warn!(class = %self.class, %from, error = %e, "malformed request");
                return Response::Error(ErrorCode::Malformed);
            }
        };

        let now = Instant::now();
        if request == Request::Hello {
            let session = self.sessions.lock().open(from, now);
            info!(class = %self.class, %from, %session, "session opened");
            return Response::Welcome {
                session,
                class: self.class,
            };
        }
        // First contact without Hello pins the session to this class too.
        let session = self.sessions.lock().touch(from, now);

        trace!(class = %self.class, %from, %session, ?request, "request");
        match self.dispatch(request) {
            Ok(response) => response,
            Err(code) => {
                warn!(class = %self.class, %from, error = %code, "request refused");
                Response::Error(code)
            }
        }
    }

    fn dispatch(&self, request: Request) -> Result<Response, ErrorCode> {
        let resolve = |name: &str| self.provider.resolve(name, self.class);
        Ok(match request {
            Request::Hello | Request::Ping => Response::Pong,
            Request::ListVehicles => Response::Vehicles(self.provider.names_for(self.class)),
            Request::EnableApiControl { vehicle, enabled } => {
                resolve(&vehicle)?.enable_api_control(enabled);
                Response::Ack
            }
            Request::IsApiControlEnabled { vehicle } => {
                Response::Enabled(resolve(&vehicle)?.is_api_control_enabled())
            }
            Request::SetControls { vehicle, controls } => {
                resolve(&vehicle)?.set_controls(controls);
                Response::Ack
            }
            Request::GetControls { vehicle } => Response::Controls(resolve(&vehicle)?.controls()),
            Request::GetState { vehicle } => Response::State(resolve(&vehicle)?.state()),
        })
    }

    fn reply(&self, response: &Response, to: Endpoint, buf: &mut [u8]) {
        let bytes = match message::encode(response, buf) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(class = %self.class, error = %e, "failed to encode response");
                return;
            }
        };
        match self.socket.try_send_to(bytes, to) {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(class = %self.class, %to, "send buffer full, response dropped");
            }
            Err(e) => {
                warn!(class = %self.class, %to, error = %e, "send failed");
            }
        }
    }
}
