//! TCP forwarding server
//!
//! Accepts raw TCP clients and relays their bytes to a single shared device.
//! Lifecycle commands (`start`, `start_async`, `stop`) are serialized by one
//! lifecycle lock; device writes from all connections are serialized by the
//! [`DeviceSink`]. `stop` closes the listener, waits for every connection
//! task to finish on its own, and only then closes the device.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use device::DevicePort;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use super::connection::ClientConnection;
use super::drain::{InflightGuard, InflightTracker};
use super::sink::{DeviceSink, run_blocking};
use crate::error::ServerError;

/// Pause before retrying after a transient accept error
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// State only touched while holding the lifecycle lock
#[derive(Default)]
struct Lifecycle {
    /// Present while running; sending `true` ends the accept loop
    shutdown: Option<watch::Sender<bool>>,
}

struct Shared {
    address: String,
    device: Arc<dyn DevicePort>,
    sink: DeviceSink,
    lifecycle: Mutex<Lifecycle>,
    /// Snapshot of the run state, written only under the lifecycle lock
    running: AtomicBool,
    local_addr: std::sync::Mutex<Option<SocketAddr>>,
    /// Held by the accept loop until its listener is dropped
    accepting: InflightTracker,
    /// Held by each connection task
    connections: InflightTracker,
}

/// Forwards TCP client streams to one device.
///
/// Cloning yields another handle to the same server, so one task can run the
/// blocking [`start`](Self::start) while another calls [`stop`](Self::stop).
///
/// ```no_run
/// use std::sync::Arc;
/// use device::{DevicePort, UsbPrinter};
/// use server::ForwardingServer;
///
/// # async fn example() -> anyhow::Result<()> {
/// let printer: Arc<dyn DevicePort> = Arc::new(UsbPrinter::discover()?);
/// let bridge = ForwardingServer::new("localhost:9100", printer);
///
/// bridge.start_async().await?;
/// tokio::signal::ctrl_c().await?;
/// bridge.stop().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ForwardingServer {
    shared: Arc<Shared>,
}

impl ForwardingServer {
    /// Create a stopped server for `address`, writing to `device`.
    ///
    /// The server never constructs or drops the device; it opens it on start
    /// if needed and closes it on stop.
    pub fn new(address: impl Into<String>, device: Arc<dyn DevicePort>) -> Self {
        Self {
            shared: Arc::new(Shared {
                address: address.into(),
                sink: DeviceSink::new(Arc::clone(&device)),
                device,
                lifecycle: Mutex::new(Lifecycle::default()),
                running: AtomicBool::new(false),
                local_addr: std::sync::Mutex::new(None),
                accepting: InflightTracker::new(),
                connections: InflightTracker::new(),
            }),
        }
    }

    /// The configured listen address
    pub fn address(&self) -> &str {
        &self.shared.address
    }

    /// The address actually bound, while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self
            .shared
            .local_addr
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The device this server writes to
    pub fn device(&self) -> Arc<dyn DevicePort> {
        Arc::clone(&self.shared.device)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Connection tasks currently alive
    pub fn in_flight(&self) -> usize {
        self.shared.connections.count()
    }

    /// Start and wait for the accept loop to finish.
    ///
    /// Returns `Ok(())` once [`stop`](Self::stop) has been called. Fails
    /// without side effects if already running or if the address cannot be
    /// bound; if the device cannot be opened the listener is released first.
    ///
    /// The accept loop runs on its own task, so dropping this future only
    /// stops waiting; the server keeps running until `stop`.
    pub async fn start(&self) -> Result<(), ServerError> {
        info!("Starting server on {} (blocking mode)", self.shared.address);
        let accept = self.bind_and_open().await?;

        info!("Ready to accept connections");
        if let Err(e) = tokio::spawn(accept.run()).await {
            if e.is_panic() {
                std::panic::resume_unwind(e.into_panic());
            }
            warn!("Accept loop cancelled: {}", e);
        }
        Ok(())
    }

    /// Start with the accept loop on a spawned task.
    ///
    /// Returns as soon as the listener is bound and the device is open; bind
    /// and open failures are reported here exactly as for [`start`](Self::start).
    pub async fn start_async(&self) -> Result<(), ServerError> {
        info!("Starting server on {} (async mode)", self.shared.address);
        let accept = self.bind_and_open().await?;

        tokio::spawn(accept.run());
        info!("Server started in background, ready to accept connections");
        Ok(())
    }

    /// Stop accepting, drain connections, then close the device.
    ///
    /// A no-op when not running. Already-accepted clients are not cut off;
    /// this waits until each of them disconnects. A close failure is
    /// returned, but the server is stopped either way.
    pub async fn stop(&self) -> Result<(), ServerError> {
        let mut lifecycle = self.shared.lifecycle.lock().await;

        if !self.is_running() {
            debug!("Stop called but server is not running");
            return Ok(());
        }

        info!("Stopping server...");
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(shutdown) = lifecycle.shutdown.take() {
            // Fails only if the accept loop task is already gone
            let _ = shutdown.send(true);
        }

        // No connection can be added once the accept loop has exited
        self.shared.accepting.drained().await;
        info!(
            in_flight = self.shared.connections.count(),
            "Waiting for active connections to close..."
        );
        self.shared.connections.drained().await;
        self.set_local_addr(None);
        info!("All connections closed");

        if self.shared.device.is_open() {
            info!("Closing printer...");
            if let Err(e) = run_blocking(&self.shared.device, |device| device.close()).await {
                error!("Error closing printer: {}", e);
                return Err(ServerError::DeviceCloseFailed(e));
            }
            info!("Printer closed");
        }

        info!("Server stopped");
        Ok(())
    }

    /// Shared start path: bind, open the device, and mark running.
    async fn bind_and_open(&self) -> Result<AcceptLoop, ServerError> {
        let mut lifecycle = self.shared.lifecycle.lock().await;

        if self.is_running() {
            warn!("Server already running");
            return Err(ServerError::AlreadyRunning);
        }

        let address = self.shared.address.as_str();
        let listener = TcpListener::bind(address).await.map_err(|source| {
            error!("Failed to bind {}: {}", address, source);
            ServerError::BindFailed {
                address: address.to_string(),
                source,
            }
        })?;
        let local_addr = listener.local_addr().ok();
        info!("Server listening on {}", address);

        if self.shared.device.is_open() {
            info!("Printer already open");
        } else {
            info!("Opening printer...");
            if let Err(e) = run_blocking(&self.shared.device, |device| device.open()).await {
                drop(listener);
                error!("Failed to open printer: {}", e);
                return Err(ServerError::DeviceOpenFailed(e));
            }
            info!("Printer opened");
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        lifecycle.shutdown = Some(shutdown_tx);
        self.set_local_addr(local_addr);
        self.shared.running.store(true, Ordering::SeqCst);

        Ok(AcceptLoop {
            listener,
            shutdown: shutdown_rx,
            sink: self.shared.sink.clone(),
            connections: self.shared.connections.clone(),
            guard: self.shared.accepting.enter(),
        })
    }

    fn set_local_addr(&self, addr: Option<SocketAddr>) {
        *self
            .shared
            .local_addr
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = addr;
    }
}

/// Everything one run of the accept loop owns
struct AcceptLoop {
    listener: TcpListener,
    shutdown: watch::Receiver<bool>,
    sink: DeviceSink,
    connections: InflightTracker,
    /// Keeps `stop` waiting until the listener is released
    guard: InflightGuard,
}

impl AcceptLoop {
    async fn run(self) {
        let AcceptLoop {
            listener,
            mut shutdown,
            sink,
            connections,
            guard,
        } = self;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    info!("Server shutting down, stopping accept loop");
                    break;
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!(peer = %peer, "Client connected");
                        let conn = ClientConnection::new(stream, peer, sink.clone(), connections.enter());
                        tokio::spawn(conn.run());
                    }
                    Err(e) => {
                        if *shutdown.borrow() {
                            info!("Server shutting down, stopping accept loop");
                            break;
                        }
                        warn!("Error accepting connection: {}", e);
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    }
                },
            }
        }

        // Release the port before `stop` can observe the drain
        drop(listener);
        drop(guard);
    }
}
