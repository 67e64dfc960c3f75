//! Concurrent UDP RPC server.
//!
//! One accept loop plus one short-lived worker task per accepted datagram
//! (subscriptions run longer, tracked through the same set). Acceptance is
//! never blocked by a slow handler. Shutdown is cooperative: the handle
//! flips a watch flag, the accept loop stops, and `serve` drains every
//! outstanding worker before returning, so no handler is abandoned
//! mid-flush. A panic inside a worker is caught at the task boundary and
//! logged; it never brings down the accept loop or other workers.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info};

use crate::error::Result;
use crate::handler::Dispatcher;
use crate::transport::RpcListener;

/// RPC server tying a listener to a dispatcher.
pub struct Server {
    listener: RpcListener,
    dispatcher: Arc<Dispatcher>,
    shutdown_tx: watch::Sender<bool>,
}

/// Cloneable handle for requesting shutdown from outside `serve`.
#[derive(Clone)]
pub struct ServerHandle {
    shutdown: watch::Sender<bool>,
}

impl ServerHandle {
    /// Mark the server closed. `serve` stops accepting, waits for all
    /// outstanding workers (including open subscriptions), then returns.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Server {
    pub fn new(listener: RpcListener, dispatcher: Dispatcher) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            listener,
            dispatcher: Arc::new(dispatcher),
            shutdown_tx,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Take a shutdown handle before consuming the server with `serve`.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: self.shutdown_tx.clone(),
        }
    }

    /// Run the accept loop until shutdown, then drain all workers.
    pub async fn serve(self) -> Result<()> {
        let addr = self.listener.local_addr()?;
        info!(%addr, "server listening");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut workers: JoinSet<()> = JoinSet::new();

        loop {
            // Reap already-finished workers so the set stays small.
            while let Some(exit) = workers.try_join_next() {
                log_worker_exit(exit);
            }

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok(socket) => {
                            let dispatcher = self.dispatcher.clone();
                            let shutdown = self.shutdown_tx.subscribe();
                            workers.spawn(async move {
                                if let Err(e) = dispatcher.dispatch(socket, shutdown).await {
                                    error!(error = %e, "error processing request");
                                }
                            });
                        }
                        Err(e) => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                            error!(error = %e, "accept failed");
                            return Err(e);
                        }
                    }
                }
            }
        }

        info!(outstanding = workers.len(), "draining workers");
        while let Some(exit) = workers.join_next().await {
            log_worker_exit(exit);
        }
        info!("server stopped");
        Ok(())
    }
}

fn log_worker_exit(exit: std::result::Result<(), JoinError>) {
    if let Err(e) = exit {
        if e.is_panic() {
            error!(error = %e, "panic in worker");
        }
    }
}
