//! Windows AF_UNIX ingress.
//!
//! Tokio has no Windows `UnixListener`, so the accept loop and per-connection
//! I/O run on blocking threads over `uds_windows`, bridged back onto the
//! runtime for dispatch. Requires Windows 10 1803+; callers verify support
//! with [`crate::platform::afunix::is_supported`] before binding.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uds_windows::{UnixListener, UnixStream};

use crate::codec::MessageDecoder;
use crate::error::AgentError;
use crate::ingress::Dispatcher;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Binds the socket, replacing a stale socket file if one is present.
///
/// Kept separate from [`serve`] so the supervisor can bind before it starts
/// the egress worker, the same order as the unix path.
pub fn bind(path: &Path) -> Result<UnixListener, AgentError> {
    super::remove_stale_socket(path).map_err(|source| AgentError::Bind {
        path: path.to_path_buf(),
        source,
    })?;

    let listener = UnixListener::bind(path).map_err(|source| AgentError::Bind {
        path: path.to_path_buf(),
        source,
    })?;
    info!("agent listening on AF_UNIX socket: {}", path.display());
    Ok(listener)
}

/// Serves connections on a bound listener until shutdown is signalled.
pub async fn serve(
    listener: UnixListener,
    path: &Path,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
) {
    let handle = Handle::current();
    let accept_shutdown = shutdown.clone();
    let accept_loop = tokio::task::spawn_blocking(move || {
        for conn in listener.incoming() {
            if accept_shutdown.is_cancelled() {
                break;
            }
            match conn {
                Ok(stream) => {
                    let dispatcher = dispatcher.clone();
                    let handle = handle.clone();
                    std::thread::spawn(move || handle_connection(stream, dispatcher, handle));
                }
                Err(e) => {
                    if accept_shutdown.is_cancelled() {
                        break;
                    }
                    error!("accept error: {e}");
                }
            }
        }
    });

    shutdown.cancelled().await;
    // The blocking accept only notices cancellation on its next wakeup; a
    // throwaway connection provides one.
    let _ = UnixStream::connect(path);
    if let Err(e) = accept_loop.await {
        debug!("accept loop join error: {e}");
    }
    let _ = fs::remove_file(path);
}

fn handle_connection(mut stream: UnixStream, dispatcher: Dispatcher, handle: Handle) {
    let mut decoder = MessageDecoder::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    'conn: loop {
        loop {
            match decoder.next() {
                Ok(Some(message)) => {
                    let reply = match handle.block_on(dispatcher.dispatch(message)) {
                        Ok(reply) => reply,
                        Err(_) => {
                            debug!("queue closed, dropping connection");
                            break 'conn;
                        }
                    };
                    if let Some(bytes) = reply {
                        if let Err(e) = stream.write_all(&bytes) {
                            debug!("write error, closing connection: {e}");
                            break 'conn;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => error!("error decoding message: {e}"),
            }
        }

        match stream.read(&mut chunk) {
            Ok(0) => {
                debug!("connection closed by client");
                break;
            }
            Ok(n) => decoder.extend(&chunk[..n]),
            Err(e) => {
                debug!("read error, closing connection: {e}");
                break;
            }
        }
    }
}
