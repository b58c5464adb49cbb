//! Worker pool: N threads popping zero-arg jobs off a bounded queue.
//!
//! A job that fails with `ENOSPC` isn't a permanent failure: the worker
//! signals the shared disk-full [`Gate`], blocks until the main thread's
//! pump clears it (after the operator frees space or aborts), and retries
//! the same job rather than surfacing the error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::gate::Gate;

pub type Job = Box<dyn Fn() -> anyhow::Result<()> + Send + 'static>;

pub struct WorkerPool {
    sender: Option<SyncSender<Job>>,
    workers: Vec<JoinHandle<()>>,
    errors: Arc<Mutex<Vec<anyhow::Error>>>,
    abort: Arc<AtomicBool>,
}

impl WorkerPool {
    /// `queue_capacity` is the spec's bounded backpressure point (1000 by
    /// default); submitting past it blocks the caller.
    pub fn new(threads: usize, queue_capacity: usize, enospc_gate: Arc<Gate>) -> Self {
        let (sender, receiver) = mpsc::sync_channel::<Job>(queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let abort = Arc::new(AtomicBool::new(false));

        let workers = (0..threads.max(1))
            .map(|_| {
                let receiver = Arc::clone(&receiver);
                let errors = Arc::clone(&errors);
                let abort = Arc::clone(&abort);
                let gate = Arc::clone(&enospc_gate);
                thread::spawn(move || worker_loop(receiver, errors, abort, gate))
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
            errors,
            abort,
        }
    }

    /// Submit a job, blocking while the queue is full. The spec's
    /// `queue.not_full` wait point; callers that also need to observe
    /// `NoInternet`/`Enospc`/`Abort` should select on those via `try_submit`
    /// in a loop instead.
    pub fn submit(&self, job: Job) -> Result<(), ()> {
        match &self.sender {
            Some(s) => s.send(job).map_err(|_| ()),
            None => Err(()),
        }
    }

    /// Non-blocking submit; `Err` carries the job back if the queue is full
    /// or the pool has been cancelled.
    pub fn try_submit(&self, job: Job) -> Result<(), Job> {
        match &self.sender {
            Some(s) => s.try_send(job).map_err(|e| match e {
                TrySendError::Full(j) | TrySendError::Disconnected(j) => j,
            }),
            None => Err(job),
        }
    }

    pub fn queue_capacity_hint(&self) -> bool {
        self.sender.is_some()
    }

    /// Stop accepting new work and let already-queued jobs drop; running
    /// jobs finish or fail naturally rather than being interrupted mid-flight.
    pub fn cancel(&mut self) {
        self.abort.store(true, Ordering::SeqCst);
        self.sender.take();
    }

    /// Close the queue, join every worker, and return the aggregated errors.
    pub fn join(mut self) -> Vec<anyhow::Error> {
        self.sender.take();
        for w in self.workers.drain(..) {
            let _ = w.join();
        }
        Arc::try_unwrap(self.errors)
            .map(|m| m.into_inner().unwrap())
            .unwrap_or_default()
    }
}

fn worker_loop(
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    errors: Arc<Mutex<Vec<anyhow::Error>>>,
    abort: Arc<AtomicBool>,
    enospc_gate: Arc<Gate>,
) {
    loop {
        if abort.load(Ordering::SeqCst) {
            return;
        }
        let job = {
            let rx = receiver.lock().unwrap();
            rx.recv()
        };
        let Ok(job) = job else { return };
        run_with_enospc_retry(job.as_ref(), &errors, &abort, &enospc_gate);
    }
}

fn run_with_enospc_retry(
    job: &(dyn Fn() -> anyhow::Result<()> + Send),
    errors: &Arc<Mutex<Vec<anyhow::Error>>>,
    abort: &Arc<AtomicBool>,
    enospc_gate: &Arc<Gate>,
) {
    loop {
        if abort.load(Ordering::SeqCst) {
            return;
        }
        match job() {
            Ok(()) => return,
            Err(e) if is_enospc(&e) => {
                if !enospc_gate.signal() {
                    errors.lock().unwrap().push(e);
                    return;
                }
            }
            Err(e) => {
                errors.lock().unwrap().push(e);
                return;
            }
        }
    }
}

#[cfg(unix)]
fn is_enospc(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|c| c.downcast_ref::<std::io::Error>())
        .any(|io_err| io_err.raw_os_error() == Some(libc::ENOSPC))
}

#[cfg(not(unix))]
fn is_enospc(_err: &anyhow::Error) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn runs_every_submitted_job() {
        let gate = Arc::new(Gate::new());
        let pool = WorkerPool::new(4, 16, gate);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            pool.submit(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();
        }
        let errors = pool.join();
        assert!(errors.is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn aggregates_job_errors() {
        let gate = Arc::new(Gate::new());
        let pool = WorkerPool::new(2, 16, gate);
        for i in 0..5 {
            pool.submit(Box::new(move || {
                if i % 2 == 0 {
                    anyhow::bail!("job {i} failed")
                } else {
                    Ok(())
                }
            }))
            .unwrap();
        }
        let errors = pool.join();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn cancel_stops_accepting_new_jobs() {
        let gate = Arc::new(Gate::new());
        let mut pool = WorkerPool::new(1, 16, gate);
        pool.cancel();
        assert!(pool.submit(Box::new(|| Ok(()))).is_err());
        assert!(pool.join().is_empty());
    }

    #[test]
    fn enospc_job_retries_after_gate_clears() {
        let gate = Arc::new(Gate::new());
        let pool = WorkerPool::new(1, 4, Arc::clone(&gate));
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_cb = Arc::clone(&attempts);
        pool.submit(Box::new(move || {
            if attempts_cb.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(anyhow::Error::new(std::io::Error::from_raw_os_error(
                    libc_enospc(),
                )))
            } else {
                Ok(())
            }
        }))
        .unwrap();

        while !gate.is_waiting() {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        gate.clear();

        let errors = pool.join();
        assert!(errors.is_empty());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[cfg(unix)]
    fn libc_enospc() -> i32 {
        libc::ENOSPC
    }

    #[cfg(not(unix))]
    fn libc_enospc() -> i32 {
        28
    }
}
