// Copyright (C) 2025 The moor-lite Authors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.

//! The set of bound TCP listen points and the accept loop behind each one
//! (spec.md §4.6 "Connection manager"). Unlike a daemon split across a network
//! boundary, this connection driver sits in the same process as the scheduler, so
//! there's no RPC hop here: a new `Listeners` is told what to bind at startup, and
//! each accepted socket becomes a [`crate::connection::Connection`] running directly
//! against the shared [`Scheduler`] and [`ConnectionRegistry`].
//!
//! Runtime `listen()`/`unlisten()` calls (spec.md §4.5 "network built-ins") only
//! update the scheduler's own bookkeeping map (see
//! [`moor_kernel::tasks::messages::SchedulerControlMsg::Listen`]) — they do not open
//! or close a real socket here. Only the listeners configured at startup, via
//! [`Listeners::add`], actually accept connections.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use moor_kernel::Scheduler;
use moor_var::Obj;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::connection::Connection;
use crate::session::ConnectionRegistry;

struct BoundListener {
    handler: Obj,
    terminate: watch::Sender<bool>,
}

/// Owns every startup-configured listen point and the single [`ConnectionRegistry`]
/// shared by every connection they accept.
pub struct Listeners {
    scheduler: Arc<Scheduler>,
    registry: Arc<ConnectionRegistry>,
    bound: HashMap<SocketAddr, BoundListener>,
}

impl Listeners {
    #[must_use]
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            scheduler,
            registry: ConnectionRegistry::new(),
            bound: HashMap::new(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.registry.clone()
    }

    /// Binds `addr` and spawns its accept loop, with `handler` as the listener
    /// object passed to `do_login_command` et al for connections it accepts.
    pub async fn add(&mut self, addr: SocketAddr, handler: Obj) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        let (terminate_tx, terminate_rx) = watch::channel(false);
        self.bound.insert(
            addr,
            BoundListener {
                handler,
                terminate: terminate_tx,
            },
        );
        info!(%addr, ?handler, "listening");

        let scheduler = self.scheduler.clone();
        let registry = self.registry.clone();
        tokio::spawn(async move {
            let mut terminate_rx = terminate_rx;
            loop {
                tokio::select! {
                    _ = terminate_rx.changed() => {
                        info!(%addr, "listener stopped");
                        return;
                    }
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, peer_addr)) => {
                                info!(%addr, %peer_addr, "accepted connection");
                                let connection = Connection::new(
                                    stream,
                                    peer_addr,
                                    handler,
                                    scheduler.clone(),
                                    registry.clone(),
                                );
                                tokio::spawn(connection.run());
                            }
                            Err(e) => {
                                warn!(%addr, error = %e, "accept failed");
                            }
                        }
                    }
                }
            }
        });
        Ok(())
    }

    /// Stops accepting on `addr`. Existing connections through it are unaffected.
    pub fn remove(&mut self, addr: &SocketAddr) {
        if let Some(bound) = self.bound.remove(addr) {
            let _ = bound.terminate.send(true);
        }
    }

    #[must_use]
    pub fn listeners(&self) -> Vec<(SocketAddr, Obj)> {
        self.bound
            .iter()
            .map(|(addr, bound)| (*addr, bound.handler))
            .collect()
    }
}
