//! Local stream-socket ingress.
//!
//! The listener binds the configured socket path (removing any stale socket
//! file left by an unclean exit first) and spawns one [`ConnectionHandler`]
//! task per accepted connection. When shutdown is signalled it stops
//! accepting; an accept error observed while shutdown is active ends the
//! loop without logging.

pub mod handler;
#[cfg(windows)]
pub mod windows;

pub use handler::{ConnectionHandler, Dispatcher};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::AgentError;

/// Accepts local connections on a unix stream socket.
#[cfg(unix)]
#[derive(Debug)]
pub struct IngressListener {
    listener: UnixListener,
    socket_path: PathBuf,
}

#[cfg(unix)]
impl IngressListener {
    /// Binds the socket, replacing a stale socket file if one is present.
    pub fn bind(path: &Path) -> Result<Self, AgentError> {
        remove_stale_socket(path).map_err(|source| AgentError::Bind {
            path: path.to_path_buf(),
            source,
        })?;

        let listener = UnixListener::bind(path).map_err(|source| AgentError::Bind {
            path: path.to_path_buf(),
            source,
        })?;
        info!("agent listening on AF_UNIX socket: {}", path.display());

        Ok(Self {
            listener,
            socket_path: path.to_path_buf(),
        })
    }

    /// Accept loop; returns once shutdown is signalled.
    pub async fn serve(self, dispatcher: Dispatcher, shutdown: CancellationToken) {
        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                () = shutdown.cancelled() => break,
            };
            match accepted {
                Ok((stream, _addr)) => {
                    debug!("accepted connection");
                    let handler = ConnectionHandler::new(dispatcher.clone(), shutdown.clone());
                    tokio::spawn(handler.run(stream));
                }
                Err(e) => {
                    // An accept failing during shutdown is the listener being
                    // torn down, not a fault worth reporting.
                    if shutdown.is_cancelled() {
                        break;
                    }
                    error!("accept error: {e}");
                }
            }
        }

        if let Err(e) = fs::remove_file(&self.socket_path) {
            if e.kind() != io::ErrorKind::NotFound {
                debug!(
                    "failed to remove socket file {}: {e}",
                    self.socket_path.display()
                );
            }
        }
    }
}

/// Removes a leftover socket file so bind can succeed after an unclean exit.
fn remove_stale_socket(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("removed stale socket file at {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
