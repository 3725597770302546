//! Accepts connections and drives one task per session.
//!
//! This is the idiomatic-Rust rendering of a single-threaded readiness loop: instead of one
//! `select(2)` call multiplexing every file descriptor by hand, the Tokio runtime multiplexes
//! readiness across however many OS threads it has, and each accepted connection gets its own
//! task built around `tokio::select!`. The fairness guarantee is the same either way — every
//! iteration of a session's loop performs at most one framed message or one bounded transfer
//! chunk before yielding back to the scheduler, so one slow peer cannot starve another.

use crate::error::{ErrorKind, Result};
use crate::framing::{recv_msg, send_msg};
use crate::session::{Session, SessionState, Shared, StepOutcome};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Binds `addr` and runs the accept loop until the process is asked to shut down.
pub async fn serve(addr: SocketAddr, shared: Shared) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| crate::error::Error::with_source(ErrorKind::RecvFailed, "failed to bind listener", e))?;
    info!(%addr, "listening");
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let shared = shared.clone();
                tokio::spawn(async move {
                    if let Err(e) = run_session(stream, peer, shared).await {
                        warn!(%peer, error = %e, "session ended with an error");
                    } else {
                        info!(%peer, "session closed");
                    }
                });
            }
            Err(e) => warn!(error = %e, "failed to accept a connection"),
        }
    }
}

/// Drives one accepted connection to completion.
async fn run_session(mut stream: TcpStream, peer: SocketAddr, shared: Shared) -> Result<()> {
    info!(%peer, "connection accepted");
    let mut session = Session::new(shared, peer);

    loop {
        let outcome = match session.state() {
            SessionState::AwaitingFile { .. } => session.upload_chunk(&mut stream).await,
            SessionState::DownloadingFile { .. } => session.download_chunk(&mut stream).await,
            _ => {
                let message = match recv_msg(&mut stream).await {
                    Ok(m) => m,
                    Err(e) if e.kind() == ErrorKind::ConnectionClosed => {
                        debug!(%peer, "peer disconnected");
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                };
                session.handle_message(&message).await
            }
        };

        match outcome {
            StepOutcome::Reply(body) => send_msg(&mut stream, &body).await?,
            StepOutcome::Continue => {}
            StepOutcome::Close(Some(body)) => {
                send_msg(&mut stream, &body).await?;
                return Ok(());
            }
            StepOutcome::Close(None) => return Ok(()),
        }
    }
}
