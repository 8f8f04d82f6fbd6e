//! Systemd service integration
//!
//! Minimal sd-notify support: readiness, stopping and status messages are
//! sent as datagrams to `NOTIFY_SOCKET`. Every call is a no-op when the
//! variable is absent, so the binary behaves the same outside systemd.

use anyhow::{Context, Result};
use std::env;
use std::os::unix::net::UnixDatagram;
use std::path::Path;
use tracing::debug;

const NOTIFY_SOCKET_ENV: &str = "NOTIFY_SOCKET";

/// Send one sd-notify `state` line (e.g. `READY=1`) if running under systemd.
pub fn notify(state: &str) -> Result<()> {
    match env::var(NOTIFY_SOCKET_ENV) {
        Ok(socket_path) => notify_to(Path::new(&socket_path), state),
        Err(_) => {
            debug!("NOTIFY_SOCKET not set, skipping systemd notification");
            Ok(())
        }
    }
}

/// Send `state` to the notification socket at `socket_path`.
pub fn notify_to(socket_path: &Path, state: &str) -> Result<()> {
    let socket = UnixDatagram::unbound().context("Failed to create Unix socket")?;
    socket
        .send_to(state.as_bytes(), socket_path)
        .with_context(|| format!("Failed to send '{}' notification to systemd", state))?;
    debug!("Notified systemd: {}", state);
    Ok(())
}

/// Notify systemd that the service is ready to accept connections
pub fn notify_ready() -> Result<()> {
    notify("READY=1")
}

/// Notify systemd that the service is stopping
pub fn notify_stopping() -> Result<()> {
    notify("STOPPING=1")
}

/// Send a status line shown by `systemctl status`
pub fn notify_status(status: &str) -> Result<()> {
    notify(&format!("STATUS={}", status))
}

/// Check if running under systemd
pub fn is_systemd() -> bool {
    env::var_os(NOTIFY_SOCKET_ENV).is_some()
}
