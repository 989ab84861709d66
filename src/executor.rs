//! The thread-pool provider contract, plus a small built-in default pool.
//!
//! An object-safe submission trait the host may implement with Tokio,
//! async-std, or anything else. Reduced here to fire-and-forget `Runnable`
//! submission since a fiber drives itself to completion via its own
//! completion callback rather than being polled as a `Future`.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

/// Something an [`Executor`] can run on a worker thread.
pub type Runnable = Box<dyn FnOnce() + Send + 'static>;

/// The thread-pool provider contract.
///
/// # Contract
/// - `execute` must eventually run `task` on some thread; it may run it
///   inline if the implementation chooses, but engines built on top of this
///   crate assume it does not block the calling thread indefinitely.
pub trait Executor: Send + Sync + 'static {
    fn execute(&self, task: Runnable);
}

/// A small fixed-size daemon thread pool, used by [`crate::engine::Engine`]
/// when the caller supplies no executor of its own.
///
/// The host is expected to supply a production executor, but a minimal one
/// ships so the crate is usable standalone.
pub struct FixedThreadPool {
    sender: mpsc::Sender<Runnable>,
    _workers: Vec<thread::JoinHandle<()>>,
}

impl FixedThreadPool {
    /// Spawns `worker_count` daemon-style worker threads sharing one queue.
    pub fn new(worker_count: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Runnable>();
        let receiver = Arc::new(Mutex::new(receiver));
        let worker_count = worker_count.max(1);
        let workers = (0..worker_count)
            .map(|index| {
                let receiver = Arc::clone(&receiver);
                thread::Builder::new()
                    .name(format!("tubeline-worker-{index}"))
                    .spawn(move || loop {
                        let task = receiver.lock().unwrap().recv();
                        match task {
                            Ok(task) => task(),
                            Err(_) => break,
                        }
                    })
                    .expect("failed to spawn tubeline worker thread")
            })
            .collect();
        Self {
            sender,
            _workers: workers,
        }
    }

    /// Sizes the pool from `Configuration::default_pool_size`, which in turn
    /// defaults to the host's available parallelism.
    pub fn with_default_size() -> Self {
        Self::new(crate::configuration::Configuration::global().default_pool_size())
    }
}

impl Executor for FixedThreadPool {
    fn execute(&self, task: Runnable) {
        // A send error means every worker thread has panicked; there is no
        // graceful degradation path for a fiber that can no longer be
        // scheduled, so we surface it loudly rather than silently dropping it.
        self.sender
            .send(task)
            .expect("tubeline worker pool has no live workers left");
    }
}

/// Convenience constructor for the `Arc<dyn Executor>` injection style used
/// throughout this crate.
pub fn default_executor() -> Arc<dyn Executor> {
    Arc::new(FixedThreadPool::with_default_size())
}
