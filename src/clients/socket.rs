use std::time::{Duration, Instant};

use crate::error::{ProbeError, Result};
use crate::internal_err;
use crate::models::report::SocketOutcome;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::debug;

/// Check that something listens on `host:port`.
/// The socket is closed as soon as the connection is established.
pub async fn probe_port(host: &str, port: u16, max_wait: Duration) -> SocketOutcome {
    let start = Instant::now();
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let error = match timeout(max_wait, connect(host, port)).await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.reason()),
        Err(_) => Some(format!("no answer after {}ms", max_wait.as_millis())),
    };
    let elapsed_ms = start.elapsed().as_millis();
    debug!(host, port, elapsed_ms = elapsed_ms as u64, ?error, "socket probe done");
    SocketOutcome {
        open: error.is_none(),
        error,
        elapsed_ms,
    }
}

async fn connect(host: &str, port: u16) -> Result<()> {
    let mut last_err: Option<ProbeError> = None;
    for addr in lookup_host((host, port)).await? {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                drop(stream);
                return Ok(());
            }
            Err(e) => {
                debug!(%addr, "connect failed: {}", e);
                last_err = Some(e.into());
            }
        }
    }
    Err(last_err.unwrap_or_else(|| internal_err!("{} resolved to no address", host)))
}
