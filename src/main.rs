//! `gaiadb` node entry point (§6.5, §6.6): loads the configuration file,
//! opens the WAL and per-COid disk store, replays committed transactions,
//! then starts the RPC listener, the admin console, and the splitter
//! check loop.
//!
//! Grounded in the original's `main.cpp` startup sequence (config parse,
//! storage spin-up, `RPCServer` bind, console thread) reshaped around
//! this workspace's split between `tokio` for socket I/O (`gaia-net`) and
//! plain `std::thread`s for everything that isn't socket I/O.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use gaia_logmem::{DiskStorage, LogInMemory};
use gaia_net::RpcServer;
use gaia_wal::{WalConfig, WalWriter};
use tracing::{error, info};

use gaiadb::config::NodeConfig;
use gaiadb::handlers::build_handler_table;
use gaiadb::recovery::replay_committed;
use gaiadb::Engine;

/// Overrides the config path when no command-line argument is given.
const CONFIG_ENV: &str = "GAIADB_CONFIG";
const DEFAULT_CONFIG_FILENAME: &str = "gaiadb.conf";

/// §4.7 "once per StatIntervalMs" tick. Not itself a §6.5 config knob, so
/// kept as a constant rather than threaded through `NodeConfig`.
const SPLITTER_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// How often the shutdown-watcher checks `Engine::shutdown_requested`.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config_path = env::args()
        .nth(1)
        .or_else(|| env::var(CONFIG_ENV).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_FILENAME.to_string());

    let config = match NodeConfig::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("cannot load configuration file {config_path}: {e}");
            std::process::exit(1);
        }
    };
    info!(hostname = %config.hostname, port = config.port, "configuration loaded");

    let disk = match DiskStorage::open(&config.store_dir) {
        Ok(d) => d,
        Err(e) => {
            error!(error = %e, dir = %config.store_dir.display(), "cannot open store directory");
            std::process::exit(1);
        }
    };
    let log = LogInMemory::new(disk);

    let wal = match WalWriter::open(WalConfig::new(&config.log_file_path)) {
        Ok(w) => w,
        Err(e) => {
            error!(error = %e, path = %config.log_file_path.display(), "cannot open WAL");
            std::process::exit(1);
        }
    };

    let engine = Arc::new(Engine::new(log, wal));

    if let Err(e) = replay_committed(&engine, &config.log_file_path) {
        error!(error = %e, "WAL replay failed");
        std::process::exit(1);
    }

    let handlers = build_handler_table(Arc::clone(&engine));
    let bind_addr = config.bind_addr();
    let server = match RpcServer::bind(&bind_addr, handlers).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, addr = %bind_addr, "cannot bind RPC listener");
            std::process::exit(1);
        }
    };
    info!(addr = %bind_addr, "listening");

    // §6.6: the admin console is a blocking stdin REPL, so it gets its own
    // OS thread rather than a tokio task.
    {
        let console_engine = Arc::clone(&engine);
        std::thread::spawn(move || gaiadb::console::run(console_engine));
    }

    // §4.7/§5: a dedicated loop owns the splitter check + dispatch cadence.
    {
        let splitter_engine = Arc::clone(&engine);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(SPLITTER_CHECK_INTERVAL).await;
                splitter_engine.run_splitter_check();
                while let Some(delay) = splitter_engine.dispatch_next_split() {
                    tokio::time::sleep(delay).await;
                }
            }
        });
    }

    // RPC #12 `Shutdown` only flips a flag on `Engine`; this loop is what
    // actually turns that flag into the process exiting.
    {
        let shutdown_engine = Arc::clone(&engine);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
                if shutdown_engine.shutdown_requested() {
                    info!("shutdown requested, exiting");
                    std::process::exit(0);
                }
            }
        });
    }

    if let Err(e) = server.serve().await {
        error!(error = %e, "RPC listener stopped");
        std::process::exit(1);
    }
}
