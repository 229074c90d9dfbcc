//! Bidirectional byte forwarding between two connected sockets.
//!
//! Each forwarding session runs two independent copy tasks, one per
//! direction, rooted in a shared cancellation scope. End-of-stream on one
//! direction is propagated as a half-close so the opposite direction can keep
//! flowing; an error on either direction cancels its peer.

use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinError;
use tracing::{debug, trace};

/// Copy buffer size per direction.
pub const COPY_BUFFER_SIZE: usize = 8 * 1024;

/// Byte totals for one forwarding session.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForwardSummary {
    /// Bytes copied from the client to the backend.
    pub bytes_to_backend: u64,
    /// Bytes copied from the backend to the client.
    pub bytes_to_client: u64,
}

/// A socket-level fault in one of the two copy directions.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("client to backend copy failed: {0}")]
    ClientToBackend(#[source] io::Error),

    #[error("backend to client copy failed: {0}")]
    BackendToClient(#[source] io::Error),
}

/// Forward bytes between `client` and `backend` until both directions finish.
///
/// A direction finishes when its source reports end-of-stream (the FIN is
/// then propagated by shutting down only the destination's send half), when
/// it hits a socket error (the other direction is cancelled), or when the
/// session is cancelled through `shutdown`. Cancellation is not an error;
/// the session returns the bytes copied so far. Both sockets close when
/// their split halves drop on return.
pub async fn forward(
    client: TcpStream,
    backend: TcpStream,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<ForwardSummary, ForwardError> {
    let (client_read, client_write) = client.into_split();
    let (backend_read, backend_write) = backend.into_split();

    let (cancel_tx, cancel_rx) = watch::channel(false);

    let mut to_backend = tokio::spawn(copy_direction(client_read, backend_write, cancel_rx.clone()));
    let mut to_client = tokio::spawn(copy_direction(backend_read, client_write, cancel_rx));

    // Wait for either direction to finish first. An orderly EOF has already
    // propagated its FIN inside the copy task, so the opposite direction is
    // left to drain at its own pace.
    let first_finisher = tokio::select! {
        result = &mut to_backend => Some((flatten(result), true)),
        result = &mut to_client => Some((flatten(result), false)),
        _ = shutdown.recv() => None,
    };

    let Some((first, first_was_to_backend)) = first_finisher else {
        let _ = cancel_tx.send(true);
        let summary = ForwardSummary {
            bytes_to_backend: flatten(to_backend.await).unwrap_or(0),
            bytes_to_client: flatten(to_client.await).unwrap_or(0),
        };
        debug!(
            bytes_to_backend = summary.bytes_to_backend,
            bytes_to_client = summary.bytes_to_client,
            "forwarding cancelled by shutdown"
        );
        return Ok(summary);
    };

    // A faulted direction must not leave the other one streaming.
    if first.is_err() {
        let _ = cancel_tx.send(true);
    }

    // The reverse direction may keep draining for as long as its peer keeps
    // sending; only its own completion or a shutdown ends the wait.
    let mut remaining = if first_was_to_backend {
        to_client
    } else {
        to_backend
    };
    let second = tokio::select! {
        result = &mut remaining => Some(flatten(result)),
        _ = shutdown.recv() => None,
    };
    let second = match second {
        Some(result) => result,
        None => {
            let _ = cancel_tx.send(true);
            flatten(remaining.await)
        }
    };

    let (to_backend_result, to_client_result) = if first_was_to_backend {
        (first, second)
    } else {
        (second, first)
    };

    match (to_backend_result, to_client_result) {
        (Ok(bytes_to_backend), Ok(bytes_to_client)) => {
            debug!(bytes_to_backend, bytes_to_client, "forwarding completed");
            Ok(ForwardSummary {
                bytes_to_backend,
                bytes_to_client,
            })
        }
        (Err(e), _) => Err(ForwardError::ClientToBackend(e)),
        (_, Err(e)) => Err(ForwardError::BackendToClient(e)),
    }
}

/// Copy from `src` to `dst` until EOF, an I/O error, or cancellation.
///
/// On orderly EOF the destination's send half is shut down, which forwards
/// the FIN to the remote peer while that socket's receive half stays open.
/// Shutdown errors are swallowed: the peer being gone already is
/// indistinguishable from a late FIN.
async fn copy_direction(
    mut src: OwnedReadHalf,
    mut dst: OwnedWriteHalf,
    mut cancel: watch::Receiver<bool>,
) -> io::Result<u64> {
    let mut buf = [0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let read = tokio::select! {
            result = src.read(&mut buf) => result?,
            _ = cancel.changed() => return Ok(total),
        };

        if read == 0 {
            let _ = dst.shutdown().await;
            trace!(total, "source reached end of stream");
            return Ok(total);
        }

        tokio::select! {
            result = dst.write_all(&buf[..read]) => result?,
            _ = cancel.changed() => return Ok(total),
        }
        total += read as u64;
    }
}

fn flatten(joined: Result<io::Result<u64>, JoinError>) -> io::Result<u64> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(io::Error::other(e)),
    }
}
