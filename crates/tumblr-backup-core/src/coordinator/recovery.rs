//! The main thread's recovery pump (`WaitOnMainThread::check()` in the
//! source this was distilled from): while a run is active, watch the
//! no-internet and disk-full gates and perform whatever recovery each is
//! blocked on.

use std::io::IsTerminal;
use std::net::ToSocketAddrs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::concurrency::Gate;

const DNS_PROBE_HOST: &str = "api.tumblr.com:443";
const DNS_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const DNS_BACKOFF_START: Duration = Duration::from_secs(1);
const DNS_BACKOFF_CAP: Duration = Duration::from_secs(15 * 60);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Resolve `host:port` with a bounded timeout. `ToSocketAddrs` itself has no
/// timeout, so the lookup runs on its own thread and this waits on a channel
/// instead of the lookup call directly.
fn probe_connectivity(host: &str) -> bool {
    let (tx, rx) = mpsc::channel();
    let host = host.to_string();
    thread::spawn(move || {
        let resolved = host.as_str().to_socket_addrs().is_ok_and(|mut addrs| addrs.next().is_some());
        let _ = tx.send(resolved);
    });
    rx.recv_timeout(DNS_PROBE_TIMEOUT).unwrap_or(false)
}

/// Spawn the pump thread. It runs until `running` is cleared; the caller
/// should clear it and join after the worker pool has finished so no worker
/// is left signalling a gate nobody is watching.
pub fn spawn(no_internet_gate: Arc<Gate>, enospc_gate: Arc<Gate>, running: Arc<AtomicBool>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut dns_backoff = DNS_BACKOFF_START;
        while running.load(Ordering::SeqCst) {
            if no_internet_gate.is_waiting() {
                if probe_connectivity(DNS_PROBE_HOST) {
                    no_internet_gate.clear();
                    dns_backoff = DNS_BACKOFF_START;
                } else {
                    thread::sleep(dns_backoff);
                    dns_backoff = (dns_backoff * 2).min(DNS_BACKOFF_CAP);
                }
            } else {
                dns_backoff = DNS_BACKOFF_START;
            }

            if enospc_gate.is_waiting() {
                recover_from_enospc(&enospc_gate);
            }

            thread::sleep(POLL_INTERVAL);
        }
    })
}

/// Disk-full recovery: prompt on a TTY and retry once the operator frees
/// space; on a non-interactive run there's nobody to ask, so the gate is
/// poisoned and every waiting job fails.
fn recover_from_enospc(gate: &Gate) {
    if std::io::stdin().is_terminal() {
        eprintln!("disk is full; free some space, then press Enter to retry...");
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        gate.clear();
    } else {
        gate.destroy();
    }
}
