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

//! The boundary between a task and whatever holds its player's network connection
//! (spec.md §4.6 "Connection manager"). The kernel never touches a socket or a
//! `tokio` type directly — it only knows about this trait, so `moor-telnet-host`
//! (or a test harness) can sit on either side of it.

use moor_var::Obj;
use thiserror::Error;

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum SessionError {
    #[error("no connection for {0}")]
    NoConnection(Obj),
    #[error("delivery failed: {0}")]
    DeliveryError(String),
    /// A pending `read()` was woken by the client closing its connection rather than
    /// by a line of input (spec.md §4.6 step 3: "if input is empty (EOF), wake with
    /// invalid-arg error").
    #[error("input stream closed for {0}")]
    InputEof(Obj),
}

/// Everything a running task can ask of the connection layer (spec.md §4.4 "I/O
/// interrupt": fire-and-forget sends are deferred to run after commit; `request_input`
/// is the one operation that genuinely blocks the task).
pub trait Session: Send + Sync {
    /// Called when the task's transaction commits — flushes anything queued by
    /// `send_event`/`send_system_msg` during the attempt that just succeeded.
    fn commit(&self) -> Result<(), SessionError>;
    /// Called when the task's transaction rolls back — discards anything queued
    /// during the attempt that failed (spec.md §4.4 "Cancellation": "deferred I/O
    /// queued inside the aborted transaction is discarded").
    fn rollback(&self) -> Result<(), SessionError>;
    /// A forked/suspended task's session clone, bound to the same player.
    fn fork(&self) -> Result<Box<dyn Session>, SessionError>;

    /// Block the calling task until a line of input arrives for `player`, or until
    /// disconnect (spec.md §4.4 "Suspend": `read(player)`).
    fn request_input(&self, player: Obj) -> Result<String, SessionError>;
    /// Queue a line of output for `player` (spec.md §4.6: the output queue).
    fn send_event(&self, player: Obj, msg: String) -> Result<(), SessionError>;
    /// A server-generated notice (connect/disconnect/redirect banners) rather than
    /// verb-authored output; implementations may format these distinctly.
    fn send_system_msg(&self, player: Obj, msg: String) -> Result<(), SessionError>;
    /// `boot_player()` — close `player`'s connection from the MOO side.
    fn shutdown(&self, player: Obj, msg: Option<String>) -> Result<(), SessionError>;

    fn connection_name(&self, player: Obj) -> Result<String, SessionError>;
    fn disconnect(&self, player: Obj) -> Result<(), SessionError>;
    fn connected_players(&self) -> Result<Vec<Obj>, SessionError>;
    fn connected_seconds(&self, player: Obj) -> Result<f64, SessionError>;
    fn idle_seconds(&self, player: Obj) -> Result<f64, SessionError>;
}

/// Discards every outbound message — used by tasks that have no connection at all
/// (forked tasks whose player has since disconnected, or headless eval).
pub struct NoopSession;

impl Session for NoopSession {
    fn commit(&self) -> Result<(), SessionError> {
        Ok(())
    }
    fn rollback(&self) -> Result<(), SessionError> {
        Ok(())
    }
    fn fork(&self) -> Result<Box<dyn Session>, SessionError> {
        Ok(Box::new(NoopSession))
    }
    fn request_input(&self, player: Obj) -> Result<String, SessionError> {
        Err(SessionError::NoConnection(player))
    }
    fn send_event(&self, _player: Obj, _msg: String) -> Result<(), SessionError> {
        Ok(())
    }
    fn send_system_msg(&self, _player: Obj, _msg: String) -> Result<(), SessionError> {
        Ok(())
    }
    fn shutdown(&self, _player: Obj, _msg: Option<String>) -> Result<(), SessionError> {
        Ok(())
    }
    fn connection_name(&self, player: Obj) -> Result<String, SessionError> {
        Ok(format!("{player}"))
    }
    fn disconnect(&self, _player: Obj) -> Result<(), SessionError> {
        Ok(())
    }
    fn connected_players(&self) -> Result<Vec<Obj>, SessionError> {
        Ok(Vec::new())
    }
    fn connected_seconds(&self, _player: Obj) -> Result<f64, SessionError> {
        Ok(0.0)
    }
    fn idle_seconds(&self, _player: Obj) -> Result<f64, SessionError> {
        Ok(0.0)
    }
}

/// A recording session for unit tests: captures every message sent rather than
/// discarding or delivering it anywhere.
#[cfg(test)]
pub struct MockSession {
    pub sent: parking_lot::Mutex<Vec<(Obj, String)>>,
}

#[cfg(test)]
impl MockSession {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sent: parking_lot::Mutex::new(Vec::new()),
        }
    }
}

#[cfg(test)]
impl Session for MockSession {
    fn commit(&self) -> Result<(), SessionError> {
        Ok(())
    }
    fn rollback(&self) -> Result<(), SessionError> {
        self.sent.lock().clear();
        Ok(())
    }
    fn fork(&self) -> Result<Box<dyn Session>, SessionError> {
        Ok(Box::new(MockSession::new()))
    }
    fn request_input(&self, player: Obj) -> Result<String, SessionError> {
        Err(SessionError::NoConnection(player))
    }
    fn send_event(&self, player: Obj, msg: String) -> Result<(), SessionError> {
        self.sent.lock().push((player, msg));
        Ok(())
    }
    fn send_system_msg(&self, player: Obj, msg: String) -> Result<(), SessionError> {
        self.sent.lock().push((player, msg));
        Ok(())
    }
    fn shutdown(&self, _player: Obj, _msg: Option<String>) -> Result<(), SessionError> {
        Ok(())
    }
    fn connection_name(&self, player: Obj) -> Result<String, SessionError> {
        Ok(format!("{player}"))
    }
    fn disconnect(&self, _player: Obj) -> Result<(), SessionError> {
        Ok(())
    }
    fn connected_players(&self) -> Result<Vec<Obj>, SessionError> {
        Ok(Vec::new())
    }
    fn connected_seconds(&self, _player: Obj) -> Result<f64, SessionError> {
        Ok(0.0)
    }
    fn idle_seconds(&self, _player: Obj) -> Result<f64, SessionError> {
        Ok(0.0)
    }
}
