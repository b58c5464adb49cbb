//! `DownloadingMedia`: prevents two workers from racing on the same local
//! media path. Guarded by a condition variable per the source's
//! `downloading_media_cond`; a worker wanting a path already claimed blocks
//! until the holder's guard drops.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Condvar, Mutex};

#[derive(Default)]
pub struct DownloadingMedia {
    claimed: Mutex<HashSet<PathBuf>>,
    cond: Condvar,
}

impl DownloadingMedia {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `path` is unclaimed, then claim it. The returned guard
    /// releases the claim (and wakes any waiters) on drop.
    pub fn acquire(&self, path: PathBuf) -> InFlightGuard<'_> {
        let mut claimed = self.claimed.lock().unwrap();
        while claimed.contains(&path) {
            claimed = self.cond.wait(claimed).unwrap();
        }
        claimed.insert(path.clone());
        InFlightGuard {
            owner: self,
            path,
        }
    }

    pub fn len(&self) -> usize {
        self.claimed.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct InFlightGuard<'a> {
    owner: &'a DownloadingMedia,
    path: PathBuf,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.owner.claimed.lock().unwrap().remove(&self.path);
        self.owner.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn second_acquire_blocks_until_first_drops() {
        let inflight = Arc::new(DownloadingMedia::new());
        let path = PathBuf::from("/out/media/x.jpg");

        let guard = inflight.acquire(path.clone());
        assert_eq!(inflight.len(), 1);

        let inflight2 = Arc::clone(&inflight);
        let path2 = path.clone();
        let waiter = thread::spawn(move || {
            let _g = inflight2.acquire(path2);
        });

        thread::sleep(Duration::from_millis(20));
        assert_eq!(inflight.len(), 1);
        drop(guard);
        waiter.join().unwrap();
        assert!(inflight.is_empty());
    }

    #[test]
    fn distinct_paths_do_not_block_each_other() {
        let inflight = DownloadingMedia::new();
        let _a = inflight.acquire(PathBuf::from("/out/a.jpg"));
        let _b = inflight.acquire(PathBuf::from("/out/b.jpg"));
        assert_eq!(inflight.len(), 2);
    }
}
