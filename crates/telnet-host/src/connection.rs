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

//! One accepted TCP connection: the reader/writer halves and the seven-step command
//! dispatch loop (spec.md §4.6 "Command dispatch loop"). Each connection starts
//! unauthenticated, bound to a fresh negative connection id below
//! [`moor_var::FIRST_UNCLAIMED_CONNECTION`], and is rebound to its real player id on
//! successful login.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use moor_common::util::parse_into_words;
use moor_kernel::tasks::sessions::Session;
use moor_kernel::Scheduler;
use moor_var::{v_str, v_string, Obj, Variant};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, info, warn};

use crate::session::{
    ConnectionRegistry, ConnectionSession, DisconnectReason, OutboundLine, ReaderSender,
};

const OOB_PREFIX: &str = "#$#";
const OOB_ESCAPE: &str = "#$\"";
const DEFAULT_FLUSH_COMMAND: &str = ".flush";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(300);

/// Allocates connection ids below [`moor_var::FIRST_UNCLAIMED_CONNECTION`], most
/// recent first (spec.md §3 "Value"): -4, -5, -6, ...
static NEXT_CONNECTION_ID: AtomicI64 = AtomicI64::new(moor_var::FIRST_UNCLAIMED_CONNECTION);

fn next_connection_id() -> Obj {
    Obj::mk_id(NEXT_CONNECTION_ID.fetch_sub(1, Ordering::Relaxed))
}

/// Output delimiters set by the `PREFIX`/`SUFFIX` intrinsic commands (spec.md §6
/// "Intrinsic commands").
#[derive(Default, Clone)]
struct Delimiters {
    prefix: String,
    suffix: String,
}

/// Drives one connection end to end: login, then the steady-state command loop,
/// until the client disconnects or is booted.
pub struct Connection {
    peer_addr: SocketAddr,
    handler: Obj,
    scheduler: Arc<Scheduler>,
    registry: Arc<ConnectionRegistry>,
    write: SplitSink<Framed<TcpStream, LinesCodec>, String>,
    read: SplitStream<Framed<TcpStream, LinesCodec>>,
    reader_slot: Arc<Mutex<Option<ReaderSender>>>,
    player: Obj,
    delimiters: Delimiters,
    hold_input: bool,
    disable_oob: bool,
    flush_command: String,
}

impl Connection {
    #[must_use]
    pub fn new(
        stream: TcpStream,
        peer_addr: SocketAddr,
        handler: Obj,
        scheduler: Arc<Scheduler>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        let framed = Framed::new(stream, LinesCodec::new_with_max_length(8192));
        let (write, read) = framed.split();
        Self {
            peer_addr,
            handler,
            scheduler,
            registry,
            write,
            read,
            reader_slot: Arc::new(Mutex::new(None)),
            player: next_connection_id(),
            delimiters: Delimiters::default(),
            hold_input: false,
            disable_oob: false,
            flush_command: DEFAULT_FLUSH_COMMAND.to_string(),
        }
    }

    /// Runs the connection until it closes. Failures are logged and swallowed —
    /// one connection's misbehavior must never take down the listener.
    pub async fn run(mut self) {
        let (output_tx, mut output_rx) = mpsc::unbounded_channel::<OutboundLine>();
        let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel::<DisconnectReason>();
        self.registry.bind(
            self.player,
            output_tx,
            disconnect_tx,
            self.reader_slot.clone(),
            self.peer_addr.to_string(),
        );

        // Provoke a welcome banner: a no-op login command, whose reply we ignore,
        // gives `do_login_command` a chance to `notify()` a greeting before any
        // real input arrives.
        self.call_verb("do_login_command", vec![]);

        let login_result = timeout(DEFAULT_CONNECT_TIMEOUT, self.login_loop(&mut output_rx, &mut disconnect_rx)).await;
        let authenticated = matches!(login_result, Ok(true));
        if !authenticated {
            if matches!(login_result, Err(_)) {
                let _ = self.write.send("*** Login timed out. ***".to_string()).await;
            }
            self.registry.unbind(self.player);
            return;
        }

        let _ = self.write.send("*** Connected ***".to_string()).await;
        let client_closed = self.command_loop(&mut output_rx, &mut disconnect_rx).await;

        let hook = if client_closed {
            "user_disconnected"
        } else {
            "user_client_disconnected"
        };
        self.call_verb(hook, vec![moor_var::v_objid(self.player)]);
        self.registry.unbind(self.player);
    }

    fn session(&self) -> ConnectionSession {
        ConnectionSession::new(self.player, self.registry.clone())
    }

    /// Invokes a listener-object system verb synchronously and discards the result
    /// — used for the fire-and-forget lifecycle hooks (spec.md §6 "System-verb
    /// contracts").
    fn call_verb(&self, name: &str, args: Vec<moor_var::Var>) -> Option<moor_var::Var> {
        let session = self.session();
        self.scheduler
            .call_verb(self.handler, self.player, name, args, &session)
    }

    async fn write_line(&mut self, line: OutboundLine) -> bool {
        let formatted = match line {
            OutboundLine::System(s) | OutboundLine::Narrative(s) => s,
        };
        self.write.send(formatted).await.is_ok()
    }

    /// Steps 1-6 of the dispatch loop while unauthenticated: OOB and pending-reader
    /// handling never apply before login, so this only runs the login flow itself
    /// (spec.md §4.6 step 6). Returns `true` once `do_login_command` yields a bound
    /// player.
    async fn login_loop(
        &mut self,
        output_rx: &mut mpsc::UnboundedReceiver<OutboundLine>,
        disconnect_rx: &mut mpsc::UnboundedReceiver<DisconnectReason>,
    ) -> bool {
        loop {
            tokio::select! {
                Some(line) = output_rx.recv() => {
                    if !self.write_line(line).await {
                        return false;
                    }
                }
                Some(_) = disconnect_rx.recv() => {
                    return false;
                }
                line = self.read.next() => {
                    let Some(Ok(line)) = line else { return false; };
                    self.registry.touch(self.player);
                    if line.starts_with(OOB_PREFIX) {
                        continue;
                    }
                    let words = parse_into_words(&line);
                    let args = words.iter().map(|w| v_str(w)).collect();
                    let Some(result) = self.call_verb("do_login_command", args) else { continue; };
                    let Variant::List(items) = result.variant() else { continue; };
                    if items.len() < 2 {
                        continue;
                    }
                    let Ok(max_object) = items.get(0) else { continue; };
                    let Ok(player_var) = items.get(1) else { continue; };
                    let Variant::Obj(player) = player_var.variant() else { continue; };
                    let player = *player;

                    // `max_object` equal to the bound player's own id is this
                    // implementation's signal that `do_login_command` just created
                    // the player, since creating an object always bumps the max id
                    // to the new object itself.
                    let created = matches!(max_object.variant(), Variant::Int(i) if *i == player.id())
                        || matches!(max_object.variant(), Variant::Obj(o) if *o == player);
                    let reconnecting = self.registry.connected_players().contains(&player);
                    if reconnecting {
                        self.registry.redirect(player);
                    }
                    self.registry.rebind(self.player, player);
                    let old = self.player;
                    self.player = player;
                    info!(peer = %self.peer_addr, ?player, "login successful");
                    let hook = if created {
                        "user_created"
                    } else if reconnecting {
                        "user_reconnected"
                    } else {
                        "user_connected"
                    };
                    self.call_verb(hook, vec![moor_var::v_objid(player)]);
                    debug!(?old, "released unauthenticated connection id");
                    return true;
                }
            }
        }
    }

    /// Steps 1-7 of the dispatch loop once authenticated. Returns `true` if the
    /// client closed the stream, `false` if the server side ended it first (booted
    /// or redirected) — the caller uses this to pick between `user_disconnected`
    /// and `user_client_disconnected` (spec.md §4.6 "Disconnect").
    async fn command_loop(
        &mut self,
        output_rx: &mut mpsc::UnboundedReceiver<OutboundLine>,
        disconnect_rx: &mut mpsc::UnboundedReceiver<DisconnectReason>,
    ) -> bool {
        loop {
            tokio::select! {
                Some(line) = output_rx.recv() => {
                    if !self.write_line(line).await {
                        return false;
                    }
                }
                Some(reason) = disconnect_rx.recv() => {
                    let msg = match reason {
                        DisconnectReason::Booted => "*** Disconnected ***",
                        DisconnectReason::Redirected => "*** Redirected to new connection ***",
                    };
                    let _ = self.write.send(msg.to_string()).await;
                    return false;
                }
                line = self.read.next() => {
                    let Some(line) = line else {
                        info!(peer = %self.peer_addr, "connection closed by client");
                        if let Some(reader) = self.registry.take_reader(self.player) {
                            let _ = reader.send(None);
                        }
                        return true;
                    };
                    let Ok(line) = line else {
                        if let Some(reader) = self.registry.take_reader(self.player) {
                            let _ = reader.send(None);
                        }
                        return true;
                    };
                    self.registry.touch(self.player);

                    if line == self.flush_command {
                        continue;
                    }

                    let (oob, line) = if line.starts_with(OOB_PREFIX) {
                        (!self.disable_oob, line)
                    } else if let Some(escaped) = line.strip_prefix(OOB_ESCAPE) {
                        (false, format!("{OOB_PREFIX}{escaped}"))
                    } else {
                        (false, line)
                    };

                    if oob {
                        let words = parse_into_words(&line);
                        let args = vec![
                            moor_var::v_list_iter(words.into_iter().map(|w| v_string(w))),
                            v_string(line),
                        ];
                        self.call_verb("do_out_of_band_command", args);
                        continue;
                    }

                    if let Some(reader) = self.registry.take_reader(self.player) {
                        let _ = reader.send(Some(line));
                        continue;
                    }

                    if self.hold_input {
                        continue;
                    }

                    if self.try_intrinsic(&line).await {
                        continue;
                    }

                    // spec.md §4.6 step 7: send the prefix once, immediately, before
                    // dispatching a non-intrinsic command; the suffix is deferred I/O
                    // queued against this command's own session, delivered once that
                    // command's task actually commits.
                    if !self.delimiters.prefix.is_empty() {
                        let _ = self.write.send(self.delimiters.prefix.clone()).await;
                    }
                    let session = Arc::new(self.session());
                    if !self.delimiters.suffix.is_empty() {
                        session.queue_suffix(self.delimiters.suffix.clone());
                    }

                    let words = parse_into_words(&line);
                    let args = words.into_iter().map(v_string).collect();
                    let suppressed = self
                        .scheduler
                        .call_verb(self.handler, self.player, "do_command", args, session.as_ref())
                        .is_some_and(|v| v.is_true());
                    if suppressed {
                        // `do_command` itself was the whole of this dispatch; flush
                        // whatever it `notify()`-ed plus the queued suffix now, since
                        // no further task is coming to do it.
                        let _ = session.commit();
                        continue;
                    }

                    match self.scheduler.submit_command(self.player, &line, session) {
                        Ok(Some(_task_id)) => {}
                        Ok(None) => {
                            let _ = self
                                .write
                                .send("I couldn't understand that.".to_string())
                                .await;
                        }
                        Err(e) => {
                            warn!(error = %e, "command dispatch failed");
                            let _ = self.write.send("You can't do that.".to_string()).await;
                        }
                    }
                }
            }
        }
    }

    /// `PREFIX`/`SUFFIX` (aliases `OUTPUTPREFIX`/`OUTPUTSUFFIX`) set the narrative
    /// output delimiters directly, without going through a task at all (spec.md §6
    /// "Intrinsic commands"). `.program` is intentionally not implemented — its
    /// multi-line accumulate-until-`.` editing protocol is out of this
    /// specification's core.
    async fn try_intrinsic(&mut self, line: &str) -> bool {
        let mut parts = line.splitn(2, ' ');
        let Some(cmd) = parts.next() else { return false };
        let rest = parts.next().unwrap_or("").to_string();
        match cmd.to_ascii_uppercase().as_str() {
            "PREFIX" | "OUTPUTPREFIX" => {
                self.delimiters.prefix = rest;
                true
            }
            "SUFFIX" | "OUTPUTSUFFIX" => {
                self.delimiters.suffix = rest;
                true
            }
            _ => false,
        }
    }
}
