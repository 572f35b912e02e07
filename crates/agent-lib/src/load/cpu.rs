//! Busy-loop CPU workers

use super::LoadError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::debug;

/// Worker count used when the caller does not ask for one
pub const DEFAULT_CPU_WORKERS: usize = 4;

/// Workers allowed per available core
const WORKERS_PER_CORE: usize = 4;

/// Upper bound on workers in one generation
pub fn max_workers() -> usize {
    let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
    cores * WORKERS_PER_CORE
}

/// One batch of workers sharing a stop flag
struct Generation {
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

/// Spins OS threads until stopped
///
/// Each `start` creates a new generation with its own stop flag, so a
/// stop/start pair never revives workers from an earlier batch.
#[derive(Default)]
pub struct CpuLoad {
    current: Mutex<Option<Generation>>,
}

impl CpuLoad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of workers currently spinning
    pub fn workers(&self) -> usize {
        self.lock().as_ref().map_or(0, |g| g.handles.len())
    }

    /// Start `workers` threads, clamped to `1..=max_workers()`
    ///
    /// Returns how many were started, or 0 if a generation is already running.
    pub fn start(&self, workers: usize) -> Result<usize, LoadError> {
        let mut current = self.lock();
        if current.is_some() {
            return Ok(0);
        }

        let workers = workers.clamp(1, max_workers());
        let stop = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let flag = Arc::clone(&stop);
            let spawned = std::thread::Builder::new()
                .name(format!("cpu-load-{}", index))
                .spawn(move || spin(&flag));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    stop.store(true, Ordering::Relaxed);
                    return Err(LoadError::Worker(e));
                }
            }
        }

        debug!(workers = handles.len(), "CPU load workers started");
        let started = handles.len();
        *current = Some(Generation { stop, handles });
        Ok(started)
    }

    /// Signal and join every worker; returns how many were stopped
    pub fn stop(&self) -> usize {
        let generation = self.lock().take();
        let Some(generation) = generation else {
            return 0;
        };

        generation.stop.store(true, Ordering::Relaxed);
        let count = generation.handles.len();
        for handle in generation.handles {
            let _ = handle.join();
        }
        count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Generation>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for CpuLoad {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spin(stop: &AtomicBool) {
    let mut x: u64 = 1;
    while !stop.load(Ordering::Relaxed) {
        for _ in 0..10_000 {
            x = std::hint::black_box(x.wrapping_mul(6364136223846793005).wrapping_add(1));
        }
    }
}
