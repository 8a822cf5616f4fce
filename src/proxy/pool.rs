//
// src/proxy/pool.rs
//

use super::backend::Backend;
use crate::config::BackendConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Fixed set of backends plus the shared rotation counter.
///
/// Registration takes `&mut self`, so the sequence can only grow while the
/// pool is still exclusively owned during startup. Once it is shared
/// behind an `Arc`, only liveness flags and the counter change.
#[derive(Debug, Default)]
pub struct ServerPool {
    backends: Vec<Arc<Backend>>,
    current: AtomicUsize,
}

impl ServerPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(configs: &[BackendConfig]) -> Self {
        let mut pool = Self::new();
        for config in configs {
            pool.register(Backend::new(config.url.clone()));
        }
        pool
    }

    pub fn register(&mut self, backend: Backend) {
        tracing::info!("backend added: {}", backend.url());
        self.backends.push(Arc::new(backend));
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn healthy_count(&self) -> usize {
        self.backends.iter().filter(|b| b.is_healthy()).count()
    }

    /// Post-increment of the rotation counter, reduced modulo `len`.
    fn next_index(&self, len: usize) -> usize {
        self.current.fetch_add(1, Ordering::Relaxed).wrapping_add(1) % len
    }

    /// Pick the next healthy backend in rotation order.
    ///
    /// Starts at the freshly advanced counter and walks the pool once,
    /// wrapping around. If unhealthy backends were skipped, the counter is
    /// moved to the chosen index so the following call continues from
    /// there. The increment and the overwrite are separate atomic steps, so
    /// concurrent callers get approximate round-robin, not a strict
    /// permutation.
    pub fn select_next(&self) -> Option<Arc<Backend>> {
        let len = self.backends.len();
        if len == 0 {
            return None;
        }

        let start = self.next_index(len);
        for offset in 0..len {
            let idx = (start + offset) % len;
            let backend = &self.backends[idx];
            if backend.is_healthy() {
                if offset != 0 {
                    self.current.store(idx, Ordering::Relaxed);
                }
                return Some(backend.clone());
            }
        }

        None
    }
}
