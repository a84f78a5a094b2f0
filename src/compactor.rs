// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Background removal of segment files no longer referenced by the keydir.

use crate::{engine::Engine, keydir::Keydir};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex, RwLock,
    },
    thread::JoinHandle,
    time::Duration,
};

/// Which compaction strategy the background loop runs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum CompactionPolicy {
    /// Deletes every sealed segment whose id is absent from the current keydir snapshot.
    CleanUnreferenced,

    /// Reserved for a future dirty-ratio-based strategy; currently runs a null compactor.
    CleanDirtyRatio,
}

struct Signal {
    cancelled: AtomicBool,
    condvar: Condvar,
    mutex: Mutex<()>,
}

impl Signal {
    fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            condvar: Condvar::new(),
            mutex: Mutex::new(()),
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.condvar.notify_all();
    }

    /// Waits up to `interval`, waking early if cancelled. Returns `true` if cancelled.
    fn wait(&self, interval: Duration) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }

        let guard = self.mutex.lock().expect("compactor signal lock poisoned");
        let (_, result) = self
            .condvar
            .wait_timeout(guard, interval)
            .expect("compactor signal lock poisoned");
        let _ = result;

        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Owns the background compaction thread. Dropping or calling [`Compactor::shutdown`] signals
/// cancellation and joins the thread before returning.
pub struct Compactor {
    signal: Arc<Signal>,
    handle: Option<JoinHandle<()>>,
}

impl Compactor {
    /// Spawns the background compaction loop.
    #[must_use]
    pub fn spawn(
        engine: Arc<RwLock<Engine>>,
        keydir: Arc<Keydir>,
        interval: Duration,
        policy: CompactionPolicy,
    ) -> Self {
        let signal = Arc::new(Signal::new());
        let thread_signal = Arc::clone(&signal);

        let handle = std::thread::Builder::new()
            .name("bitcask-compactor".into())
            .spawn(move || run(&engine, &keydir, interval, policy, &thread_signal))
            .expect("failed to spawn compactor thread");

        Self {
            signal,
            handle: Some(handle),
        }
    }

    /// Signals the compaction loop to stop and waits for its current pass to finish.
    pub fn shutdown(&mut self) {
        self.signal.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("compactor thread panicked");
            }
        }
    }
}

impl Drop for Compactor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    engine: &Arc<RwLock<Engine>>,
    keydir: &Arc<Keydir>,
    interval: Duration,
    policy: CompactionPolicy,
    signal: &Arc<Signal>,
) {
    if policy == CompactionPolicy::CleanDirtyRatio {
        log::debug!("compaction policy CleanDirtyRatio is unimplemented; compactor is a no-op");
    }

    loop {
        if signal.wait(interval) {
            log::debug!("compactor received shutdown signal");
            return;
        }

        if policy != CompactionPolicy::CleanUnreferenced {
            continue;
        }

        let live = keydir.snapshot_referenced_segments();

        let mut engine = match engine.write() {
            Ok(guard) => guard,
            Err(_) => {
                log::warn!("store lock poisoned; compactor exiting");
                return;
            }
        };

        match engine.delete_unreferenced_segments(&live) {
            Ok(0) => log::trace!("compaction pass found nothing to remove"),
            Ok(n) => log::info!("compaction pass removed {n} unreferenced segment(s)"),
            Err(e) => log::warn!("compaction pass failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    #[allow(clippy::expect_used)]
    fn compactor_removes_unreferenced_segments_in_background() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (engine, keydir) = Engine::open(dir.path(), 64).expect("open");
        let engine = Arc::new(RwLock::new(engine));
        let keydir = Arc::new(keydir);

        for i in 0..20u32 {
            let key = format!("key-{i}");
            engine
                .write()
                .expect("lock")
                .append(key.as_bytes(), &[0_u8; 32], &keydir)
                .expect("append");
        }

        let mut compactor = Compactor::spawn(
            Arc::clone(&engine),
            Arc::clone(&keydir),
            Duration::from_millis(20),
            CompactionPolicy::CleanUnreferenced,
        );

        std::thread::sleep(Duration::from_millis(100));
        compactor.shutdown();

        keydir.for_each(|_, entry| {
            assert!(engine.write().expect("lock").read(entry).is_ok());
        });
    }
}
