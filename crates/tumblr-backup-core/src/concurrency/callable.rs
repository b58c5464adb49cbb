//! A dedicated worker thread with a one-slot request queue and a one-slot
//! response queue, used by the Coordinator to fetch the next API page while
//! the current page's posts are still being processed.

use std::sync::mpsc::{self, RecvError, SendError};
use std::thread::{self, JoinHandle};

pub struct AsyncCallable<Req, Resp> {
    req_tx: Option<mpsc::SyncSender<Req>>,
    resp_rx: mpsc::Receiver<Resp>,
    handle: Option<JoinHandle<()>>,
}

impl<Req, Resp> AsyncCallable<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Req) -> Resp + Send + 'static,
    {
        let (req_tx, req_rx) = mpsc::sync_channel::<Req>(1);
        let (resp_tx, resp_rx) = mpsc::sync_channel::<Resp>(1);
        let handle = thread::spawn(move || {
            while let Ok(req) = req_rx.recv() {
                if resp_tx.send(f(req)).is_err() {
                    break;
                }
            }
        });
        Self {
            req_tx: Some(req_tx),
            resp_rx,
            handle: Some(handle),
        }
    }

    /// Submit the next request; overlaps with the caller still consuming the
    /// previous response.
    pub fn submit(&self, req: Req) -> Result<(), SendError<Req>> {
        self.req_tx
            .as_ref()
            .expect("AsyncCallable already shut down")
            .send(req)
    }

    /// Block for the response to the most recently submitted request.
    pub fn recv(&self) -> Result<Resp, RecvError> {
        self.resp_rx.recv()
    }
}

impl<Req, Resp> Drop for AsyncCallable<Req, Resp> {
    fn drop(&mut self) {
        // Close the request side first so the worker's `recv` loop ends and
        // `join` below doesn't block forever on a channel nobody will feed.
        self.req_tx.take();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlaps_request_and_response() {
        let callable: AsyncCallable<u32, u32> = AsyncCallable::new(|n| n * 2);
        callable.submit(21).unwrap();
        assert_eq!(callable.recv().unwrap(), 42);
        callable.submit(10).unwrap();
        assert_eq!(callable.recv().unwrap(), 20);
    }

    #[test]
    fn drop_joins_the_worker_thread_cleanly() {
        let callable: AsyncCallable<u32, u32> = AsyncCallable::new(|n| n + 1);
        callable.submit(1).unwrap();
        assert_eq!(callable.recv().unwrap(), 2);
        drop(callable);
    }
}
