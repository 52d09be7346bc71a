use may::coroutine::JoinHandle;
use may_minihttp::HttpService;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Starts a [`may_minihttp`] accept loop for a service.
pub struct HttpServer<T>(pub T);

/// A listening server. Dropping it leaves the accept loop running; call
/// [`ServerHandle::stop`] to shut it down.
pub struct ServerHandle {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

/// First address `addr` resolves to. Port 0 is swapped for a free port,
/// because `may_minihttp` does not report the port it bound.
fn resolve_bind_addr<A: ToSocketAddrs>(addr: A) -> io::Result<SocketAddr> {
    let Some(requested) = addr.to_socket_addrs()?.next() else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "address resolves to nothing",
        ));
    };
    if requested.port() != 0 {
        return Ok(requested);
    }
    TcpListener::bind(requested)?.local_addr()
}

impl<T: HttpService + Clone + Send + Sync + 'static> HttpServer<T> {
    /// Bind `addr` and serve on a coroutine.
    ///
    /// # Errors
    ///
    /// Resolution or bind failures.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let addr = resolve_bind_addr(addr)?;
        let handle = may_minihttp::HttpServer(self.0).start(addr)?;
        info!(%addr, "HTTP server listening");
        Ok(ServerHandle { addr, handle })
    }
}

impl ServerHandle {
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Poll-connect until the listener accepts or `timeout` passes.
    ///
    /// # Errors
    ///
    /// `TimedOut` when no connection succeeded in time.
    pub fn wait_ready(&self, timeout: Duration) -> io::Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("{} not accepting connections", self.addr),
                ));
            }
            thread::sleep(READY_POLL_INTERVAL);
        }
    }

    /// Cancel the accept loop and wait for it to exit.
    ///
    /// Tasks spawned by requests keep running; drain the scheduler after this.
    pub fn stop(self) {
        // SAFETY: cancel() is unsafe because a cancelled coroutine unwinds at its
        // next suspension point. The accept loop holds no locks across accepts,
        // and the handle is consumed so it is cancelled once.
        unsafe { self.handle.coroutine().cancel() };
        // Cancellation unwinds the coroutine, so join reports it as a panic.
        if self.handle.join().is_err() {
            debug!(addr = %self.addr, "Accept loop unwound by cancel");
        }
        info!(addr = %self.addr, "HTTP server stopped");
    }

    /// Block until the accept loop exits on its own.
    ///
    /// # Errors
    ///
    /// The panic payload if the loop panicked.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}
