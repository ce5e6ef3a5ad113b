use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use rayon::ThreadPoolBuilder;
use tracing::debug;

/// Fixed-size group of named threads.
///
/// The same pool type drives both short-lived fan-out ([`WorkerPool::map`], on
/// a rayon pool) and long-running stage workers ([`WorkerPool::spawn`]).
#[derive(Debug, Clone)]
pub struct WorkerPool {
    name: String,
    size: usize,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size: size.max(1),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `f` over every item on a dedicated pool of at most `size` threads
    /// and wait for all of them. Results are returned in item order.
    pub fn map<T, R, F>(&self, items: Vec<T>, f: F) -> Result<Vec<R>>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Send + Sync,
    {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let threads = self.size.min(items.len());
        debug!(pool = %self.name, jobs = items.len(), threads, "fanning out");

        let name = self.name.clone();
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |index| format!("{name}-{index}"))
            .build()
            .with_context(|| format!("failed to build thread pool {}", self.name))?;

        Ok(pool.install(|| items.into_par_iter().map(f).collect()))
    }

    /// Start `size` named threads, each running `f(worker_index)`.
    pub fn spawn<R, F>(&self, f: F) -> Result<Vec<JoinHandle<R>>>
    where
        R: Send + 'static,
        F: Fn(usize) -> R + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        (0..self.size)
            .map(|index| {
                let f = Arc::clone(&f);
                let name = format!("{}-{index}", self.name);
                thread::Builder::new()
                    .name(name.clone())
                    .spawn(move || f(index))
                    .with_context(|| format!("failed to spawn thread {name}"))
            })
            .collect()
    }
}
