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

//! The `moor-daemon` binary: seeds a fresh database, starts the scheduler on its own
//! thread, and accepts telnet connections until ctrl-c. There is no persistence layer
//! in this build (spec.md's Out-of-scope: on-disk database formats), so every run
//! starts from an empty world plus the system-verb bootstrap.

use std::sync::Arc;

use clap::Parser;
use eyre::Result;
use moor_daemon::{bootstrap, config};
use moor_db::Database;
use moor_kernel::tasks::sessions::NoopSession;
use moor_kernel::Scheduler;
use moor_telnet_host::Listeners;
use moor_var::SYSTEM_OBJECT;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = config::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(args.log_level.clone()))
        .init();

    let options = config::load_server_options(&args)?;
    info!(?options, "server options loaded");

    let db = Database::new();
    bootstrap::bootstrap(db.clone())?;
    info!("world bootstrapped");

    let scheduler = Scheduler::with_queued_task_limit(db, options.queued_task_limit);
    let scheduler_handle = {
        let scheduler = scheduler.clone();
        std::thread::spawn(move || scheduler.run())
    };

    let mut listeners = Listeners::new(scheduler.clone());
    listeners.add(args.listen_address, SYSTEM_OBJECT).await?;
    info!(address = %args.listen_address, "accepting telnet connections");

    // spec.md §6 "System-verb contracts": called once, best-effort, once the world is
    // up and ready to accept connections — mirrors how the other lifecycle hooks
    // (`user_connected` et al.) are invoked via `Scheduler::call_verb`.
    scheduler.call_verb(SYSTEM_OBJECT, SYSTEM_OBJECT, "server_started", vec![], &NoopSession);
    info!("server_started dispatched");

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    scheduler.stop();
    // `Scheduler::run` polls its control channel on a timeout, so the thread wakes up
    // and exits on its own; nothing here depends on joining it before the process
    // exits.
    drop(scheduler_handle);

    Ok(())
}
