//! watchdog - run helmwatchd as a foreground child and tear it down cleanly.
//!
//! On SIGINT/SIGTERM the child is killed, any stray daemon processes are
//! swept with a best-effort `pkill`, and the watchdog itself exits 0 so
//! supervisor scripts treat operator-initiated shutdown as success.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "watchdog", about = "Supervise the helmet monitoring daemon")]
struct Args {
    /// Arguments forwarded to helmwatchd.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    daemon_args: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let term = Arc::new(AtomicBool::new(false));
    {
        let term = term.clone();
        ctrlc::set_handler(move || {
            term.store(true, Ordering::SeqCst);
        })
        .context("install ctrl-c handler")?;
    }

    println!("starting helmet monitoring services");
    let mut child = Command::new(daemon_path())
        .args(&args.daemon_args)
        .spawn()
        .context("spawn helmwatchd")?;
    log::info!("helmwatchd running (pid {})", child.id());

    loop {
        if term.load(Ordering::SeqCst) {
            log::info!("shutdown requested, stopping helmwatchd");
            let _ = child.kill();
            let _ = child.wait();
            sweep_stragglers();
            break;
        }
        match child.try_wait().context("poll helmwatchd")? {
            Some(status) => {
                log::info!("helmwatchd exited: {}", status);
                break;
            }
            None => std::thread::sleep(Duration::from_millis(200)),
        }
    }

    println!("services stopped");
    Ok(())
}

/// Prefer the daemon built next to this binary, fall back to PATH lookup.
fn daemon_path() -> std::path::PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("helmwatchd")))
        .filter(|sibling| sibling.is_file())
        .unwrap_or_else(|| std::path::PathBuf::from("helmwatchd"))
}

/// Kill any daemon instances that escaped the child handle.
fn sweep_stragglers() {
    match Command::new("pkill").args(["-f", "helmwatchd"]).status() {
        Ok(status) if !status.success() => {
            log::debug!("pkill found no remaining helmwatchd processes")
        }
        Ok(_) => log::info!("swept remaining helmwatchd processes"),
        Err(err) => log::warn!("pkill unavailable: {}", err),
    }
}
