//! Per-connection forwarding task
//!
//! Reads a client's byte stream and relays every chunk, in order, to the
//! device. The task ends on end-of-stream, on a read error, or on the first
//! failed or short device write; none of these reach the server's caller.

use std::net::SocketAddr;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::drain::InflightGuard;
use super::sink::DeviceSink;
use crate::error::ConnectionError;

/// Size of the per-connection read buffer
pub const READ_BUFFER_SIZE: usize = 4096;

/// Forwarding state for one accepted client
pub struct ClientConnection {
    stream: TcpStream,
    peer: SocketAddr,
    sink: DeviceSink,
    forwarded: u64,
    /// Released when the task ends, whatever the exit path
    _inflight: InflightGuard,
}

impl ClientConnection {
    pub(crate) fn new(
        stream: TcpStream,
        peer: SocketAddr,
        sink: DeviceSink,
        inflight: InflightGuard,
    ) -> Self {
        Self {
            stream,
            peer,
            sink,
            forwarded: 0,
            _inflight: inflight,
        }
    }

    /// Relay until the connection ends, then close the socket.
    pub async fn run(mut self) {
        info!(peer = %self.peer, "Handling connection");

        match self.forward().await {
            Ok(()) => {
                info!(peer = %self.peer, "Client closed connection");
            }
            Err(ConnectionError::Read(e)) => {
                warn!(peer = %self.peer, "Error reading from client: {}", e);
            }
            Err(e) => {
                warn!(peer = %self.peer, "Error writing to printer: {}", e);
            }
        }

        info!(
            peer = %self.peer,
            forwarded = self.forwarded,
            "Client disconnected"
        );
        // Dropping `self` closes the socket and releases the in-flight guard
    }

    /// Relay chunks until the client closes its side of the stream.
    async fn forward(&mut self) -> Result<(), ConnectionError> {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let n = self
                .stream
                .read(&mut buf)
                .await
                .map_err(ConnectionError::Read)?;
            if n == 0 {
                return Ok(());
            }

            debug!(peer = %self.peer, bytes = n, "Received data");
            let written = self.sink.write(&buf[..n]).await?;
            self.forwarded += written as u64;
            debug!(peer = %self.peer, bytes = written, "Wrote to printer");
        }
    }
}
