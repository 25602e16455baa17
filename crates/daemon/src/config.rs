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

//! Server-wide settings, mirroring the `$server_options`-overridable fields spec.md
//! §6 names. Loaded from (in ascending priority) built-in defaults, an optional TOML
//! file, `MOOR_`-prefixed environment variables, and finally CLI flags — the same
//! file-then-env-then-flags layering the mcp-host/lsp binaries build with `figment`.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap_derive::Parser;
use eyre::Result;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Mirrors `$server_options`' overridable fields (spec.md §6 "System-object
/// properties"). Not every field here is wired all the way through to the task
/// engine yet — see DESIGN.md for which ones are load-bearing today.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerOptions {
    /// Wall-clock seconds a foreground task gets before a seconds-timeout.
    pub fg_seconds: u64,
    /// Tick budget for a foreground task.
    pub fg_ticks: i64,
    /// Wall-clock seconds a background (forked/resumed) task gets.
    pub bg_seconds: u64,
    /// Tick budget for a background task.
    pub bg_ticks: i64,
    /// Verb/builtin call-stack depth before too-deep-recursion.
    pub max_stack_depth: usize,
    /// Per-player cap on simultaneously queued tasks.
    pub queued_task_limit: usize,
    /// Seconds an unauthenticated connection is given before the login watchdog
    /// closes it.
    pub connect_timeout: u64,
    /// Seconds `open_network_connection` waits for an outbound connect.
    pub outbound_connect_timeout: u64,
    /// Seconds a DNS/name lookup is given during an outbound connect.
    pub name_lookup_timeout: u64,
    /// The line that silently flushes a connection's queued output instead of being
    /// treated as a command.
    pub default_flush_command: String,
    /// Whether bare-numeric verb names (`#0:1`) are accepted as command input.
    pub support_numeric_verbname_strings: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            fg_seconds: 5,
            fg_ticks: 30_000,
            bg_seconds: 3,
            bg_ticks: 15_000,
            max_stack_depth: 50,
            queued_task_limit: 100,
            connect_timeout: 300,
            outbound_connect_timeout: 5,
            name_lookup_timeout: 5,
            default_flush_command: ".flush".to_string(),
            support_numeric_verbname_strings: false,
        }
    }
}

/// CLI entry point flags. `--config` points at a TOML file carrying any subset of
/// [`ServerOptions`]' fields plus `listen_address`; anything left unset there falls
/// back to the built-in defaults above.
#[derive(Parser, Debug, Serialize, Deserialize)]
#[command(name = "moor-daemon")]
#[command(about = "A moor-lite world: bootstraps a database and accepts telnet connections")]
pub struct Args {
    /// TOML configuration file overriding the built-in server options.
    #[arg(long, value_name = "config")]
    pub config: Option<PathBuf>,

    /// Address to accept telnet connections on.
    #[arg(long, default_value = "0.0.0.0:8888")]
    pub listen_address: SocketAddr,

    /// Tracing log filter, e.g. "info" or "moor_kernel=debug,moor_telnet_host=info".
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Layers CLI flags over an optional config file over the built-in defaults (highest
/// priority last merged, per `figment`'s convention) and extracts a validated
/// [`ServerOptions`].
pub fn load_server_options(args: &Args) -> Result<ServerOptions> {
    let mut figment = Figment::new().merge(Serialized::defaults(ServerOptions::default()));
    if let Some(config_file) = &args.config {
        figment = figment.merge(Toml::file(config_file));
    }
    figment = figment.merge(Env::prefixed("MOOR_"));
    Ok(figment.extract()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_config_file() {
        let args = Args {
            config: None,
            listen_address: "127.0.0.1:7777".parse().unwrap(),
            log_level: "info".to_string(),
        };
        let options = load_server_options(&args).unwrap();
        assert_eq!(options.fg_ticks, 30_000);
        assert_eq!(options.default_flush_command, ".flush");
    }

    #[test]
    fn env_override_wins_over_defaults() {
        std::env::set_var("MOOR_CONNECT_TIMEOUT", "60");
        let args = Args {
            config: None,
            listen_address: "127.0.0.1:7777".parse().unwrap(),
            log_level: "info".to_string(),
        };
        let options = load_server_options(&args).unwrap();
        std::env::remove_var("MOOR_CONNECT_TIMEOUT");
        assert_eq!(options.connect_timeout, 60);
    }
}
