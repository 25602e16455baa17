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

//! The [`moor_kernel::Session`] implementation that lets a running task talk to
//! whichever connection currently owns a player (spec.md §4.6 "Connection manager").
//! A task's own `Session` is bound to the player that invoked it, but
//! `notify`/`boot_player`/etc. name their target player explicitly, so every lookup
//! here goes through the shared [`ConnectionRegistry`] rather than `self` alone.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use moor_kernel::tasks::sessions::SessionError;
use moor_kernel::Session;
use moor_var::Obj;
use parking_lot::Mutex;

/// One line destined for a connection's writer half. Kept as an enum so the writer
/// can apply the connection's prefix/suffix delimiters to narrative output but never
/// to server-generated system messages (spec.md §4.6 step 7: "send the connection's
/// prefix delimiter ... queue the suffix delimiter for after the task").
#[derive(Debug, Clone)]
pub enum OutboundLine {
    Narrative(String),
    System(String),
}

/// Why a connection's select loop was asked to stop, so it can print the right
/// farewell line (spec.md §4.6 step 6: "the older connection is redirected: swap
/// ownership, print redirect messages, close the older").
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DisconnectReason {
    Booted,
    Redirected,
}

/// A reader is woken with a line of input, or with `None` if the client closed the
/// connection while the reader was pending (spec.md §4.6 step 4: "if input is empty
/// (EOF), wake with invalid-arg error").
pub type ReaderSender = crossbeam_channel::Sender<Option<String>>;

struct ConnectionEntry {
    output_tx: tokio::sync::mpsc::UnboundedSender<OutboundLine>,
    disconnect_tx: tokio::sync::mpsc::UnboundedSender<DisconnectReason>,
    reader_slot: Arc<Mutex<Option<ReaderSender>>>,
    connected_at: Instant,
    last_activity: Arc<Mutex<Instant>>,
    peer_name: String,
}

/// The process-wide map from bound player to live connection. A player owns at most
/// one connection at a time (spec.md §8 "Connection at-most-one"); binding a second
/// connection to an already-owned player is the caller's job (it redirects the older
/// one first) before calling [`ConnectionRegistry::bind`].
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: Mutex<HashMap<Obj, ConnectionEntry>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn bind(
        &self,
        player: Obj,
        output_tx: tokio::sync::mpsc::UnboundedSender<OutboundLine>,
        disconnect_tx: tokio::sync::mpsc::UnboundedSender<DisconnectReason>,
        reader_slot: Arc<Mutex<Option<ReaderSender>>>,
        peer_name: String,
    ) {
        self.entries.lock().insert(
            player,
            ConnectionEntry {
                output_tx,
                disconnect_tx,
                reader_slot,
                connected_at: Instant::now(),
                last_activity: Arc::new(Mutex::new(Instant::now())),
                peer_name,
            },
        );
    }

    /// Moves a connection's registration from `old` to `new` without touching its
    /// channels — used when a previously-unauthenticated connection (negative id)
    /// successfully logs in, or when a reconnecting login redirects an older
    /// connection's ownership onto the new one.
    pub fn rebind(&self, old: Obj, new: Obj) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.remove(&old) {
            entries.insert(new, entry);
        }
    }

    pub fn unbind(&self, player: Obj) {
        self.entries.lock().remove(&player);
    }

    /// Removes whatever connection currently owns `player` and tells it to close,
    /// atomically enough that the caller can immediately [`Self::rebind`] its own
    /// connection onto `player` without racing the old one's own teardown.
    pub fn redirect(&self, player: Obj) {
        if let Some(entry) = self.entries.lock().remove(&player) {
            let _ = entry.disconnect_tx.send(DisconnectReason::Redirected);
        }
    }

    pub fn touch(&self, player: Obj) {
        if let Some(entry) = self.entries.lock().get(&player) {
            *entry.last_activity.lock() = Instant::now();
        }
    }

    pub fn set_reader(&self, player: Obj, tx: ReaderSender) -> Option<()> {
        let entries = self.entries.lock();
        let entry = entries.get(&player)?;
        *entry.reader_slot.lock() = Some(tx);
        Some(())
    }

    /// Takes (and clears) the pending reader for `player`, if one was waiting. Used
    /// by the connection's own dispatch loop before treating a line as a command, and
    /// to wake a reader with `None` when the client closes the connection instead of
    /// sending a line.
    pub fn take_reader(&self, player: Obj) -> Option<ReaderSender> {
        let entries = self.entries.lock();
        entries.get(&player).and_then(|e| e.reader_slot.lock().take())
    }

    fn deliver(&self, player: Obj, line: OutboundLine) {
        if let Some(entry) = self.entries.lock().get(&player) {
            let _ = entry.output_tx.send(line);
        }
    }

    #[must_use]
    pub fn connected_players(&self) -> Vec<Obj> {
        self.entries.lock().keys().copied().collect()
    }

    #[must_use]
    pub fn connected_seconds(&self, player: Obj) -> Option<f64> {
        self.entries
            .lock()
            .get(&player)
            .map(|e| e.connected_at.elapsed().as_secs_f64())
    }

    #[must_use]
    pub fn idle_seconds(&self, player: Obj) -> Option<f64> {
        self.entries
            .lock()
            .get(&player)
            .map(|e| e.last_activity.lock().elapsed().as_secs_f64())
    }

    #[must_use]
    pub fn connection_name(&self, player: Obj) -> Option<String> {
        self.entries.lock().get(&player).map(|e| e.peer_name.clone())
    }

    pub fn disconnect(&self, player: Obj) {
        if let Some(entry) = self.entries.lock().get(&player) {
            let _ = entry.disconnect_tx.send(DisconnectReason::Booted);
        }
    }
}

/// A task's view of a single connection's player, backed by the shared registry so
/// sends to *other* players (`notify(victim, ...)` from a different task) reach the
/// right socket (spec.md §4.4 "I/O interrupt"). Output is buffered here until
/// `commit()`/`rollback()` tells it whether the attempt that queued it actually
/// landed.
pub struct ConnectionSession {
    player: Obj,
    registry: Arc<ConnectionRegistry>,
    pending: Mutex<Vec<(Obj, OutboundLine)>>,
    deferred_suffix: Mutex<Option<String>>,
}

impl ConnectionSession {
    #[must_use]
    pub fn new(player: Obj, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            player,
            registry,
            pending: Mutex::new(Vec::new()),
            deferred_suffix: Mutex::new(None),
        }
    }

    /// Queues `suffix` to be delivered once, after this session's *next* successful
    /// commit — the `SUFFIX` intrinsic's deferred-I/O semantics (spec.md §4.6 step 7:
    /// "queue the suffix delimiter for after the task"). A retried transaction's
    /// intermediate rollbacks leave this in place; only a commit consumes it.
    pub fn queue_suffix(&self, suffix: String) {
        *self.deferred_suffix.lock() = Some(suffix);
    }
}

impl Session for ConnectionSession {
    fn commit(&self) -> Result<(), SessionError> {
        for (player, line) in std::mem::take(&mut *self.pending.lock()) {
            self.registry.deliver(player, line);
        }
        if let Some(suffix) = self.deferred_suffix.lock().take() {
            self.registry.deliver(self.player, OutboundLine::System(suffix));
        }
        Ok(())
    }

    fn rollback(&self) -> Result<(), SessionError> {
        self.pending.lock().clear();
        Ok(())
    }

    fn fork(&self) -> Result<Box<dyn Session>, SessionError> {
        Ok(Box::new(ConnectionSession::new(
            self.player,
            self.registry.clone(),
        )))
    }

    fn request_input(&self, player: Obj) -> Result<String, SessionError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.registry
            .set_reader(player, tx)
            .ok_or(SessionError::NoConnection(player))?;
        match rx.recv() {
            Ok(Some(line)) => Ok(line),
            Ok(None) => Err(SessionError::InputEof(player)),
            Err(_) => Err(SessionError::NoConnection(player)),
        }
    }

    fn send_event(&self, player: Obj, msg: String) -> Result<(), SessionError> {
        self.pending
            .lock()
            .push((player, OutboundLine::Narrative(msg)));
        Ok(())
    }

    fn send_system_msg(&self, player: Obj, msg: String) -> Result<(), SessionError> {
        self.pending.lock().push((player, OutboundLine::System(msg)));
        Ok(())
    }

    fn shutdown(&self, player: Obj, msg: Option<String>) -> Result<(), SessionError> {
        if let Some(msg) = msg {
            self.registry.deliver(player, OutboundLine::System(msg));
        }
        self.registry.disconnect(player);
        Ok(())
    }

    fn connection_name(&self, player: Obj) -> Result<String, SessionError> {
        self.registry
            .connection_name(player)
            .ok_or(SessionError::NoConnection(player))
    }

    fn disconnect(&self, player: Obj) -> Result<(), SessionError> {
        self.registry.disconnect(player);
        Ok(())
    }

    fn connected_players(&self) -> Result<Vec<Obj>, SessionError> {
        Ok(self.registry.connected_players())
    }

    fn connected_seconds(&self, player: Obj) -> Result<f64, SessionError> {
        self.registry
            .connected_seconds(player)
            .ok_or(SessionError::NoConnection(player))
    }

    fn idle_seconds(&self, player: Obj) -> Result<f64, SessionError> {
        self.registry
            .idle_seconds(player)
            .ok_or(SessionError::NoConnection(player))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_reports_no_connection_for_an_unbound_player() {
        let registry = ConnectionRegistry::new();
        assert!(registry.connection_name(Obj::mk_id(5)).is_none());
    }

    #[test]
    fn bind_then_unbind_clears_the_entry() {
        let registry = ConnectionRegistry::new();
        let (out_tx, _out_rx) = tokio::sync::mpsc::unbounded_channel();
        let (disc_tx, _disc_rx) = tokio::sync::mpsc::unbounded_channel::<DisconnectReason>();
        let slot = Arc::new(Mutex::new(None));
        registry.bind(Obj::mk_id(5), out_tx, disc_tx, slot, "1.2.3.4".to_string());
        assert!(registry.connection_name(Obj::mk_id(5)).is_some());
        registry.unbind(Obj::mk_id(5));
        assert!(registry.connection_name(Obj::mk_id(5)).is_none());
    }
}
