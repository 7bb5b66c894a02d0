use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::trace;

use super::provider::{SampleError, Sampler};
use super::snapshot::SystemSnapshot;

/// Minimum time between two live samples.
pub const STALENESS_WINDOW: Duration = Duration::from_secs(1);

struct CacheState<S> {
    sampler: S,
    last: Option<(Arc<SystemSnapshot>, Instant)>,
}

/// Serves the last snapshot to every caller inside the staleness window and
/// makes at most one live backend call per window.
pub struct SamplingCache<S> {
    // Snapshot and timestamp live under one lock so they are never torn.
    state: Mutex<CacheState<S>>,
    window: Duration,
}

impl<S: Sampler> SamplingCache<S> {
    pub fn new(sampler: S) -> Self {
        Self::with_window(sampler, STALENESS_WINDOW)
    }

    pub fn with_window(sampler: S, window: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState {
                sampler,
                last: None,
            }),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn get(&self) -> Result<Arc<SystemSnapshot>, SampleError> {
        self.get_at(Instant::now())
    }

    /// Like [`get`](Self::get) with an explicit clock reading.
    pub fn get_at(&self, now: Instant) -> Result<Arc<SystemSnapshot>, SampleError> {
        let mut state = self.lock();
        if let Some((snapshot, at)) = &state.last
            && now.saturating_duration_since(*at) < self.window
        {
            trace!("serving cached snapshot");
            return Ok(Arc::clone(snapshot));
        }

        let snapshot = Arc::new(state.sampler.sample()?);
        state.last = Some((Arc::clone(&snapshot), now));
        Ok(snapshot)
    }

    /// The stored snapshot, without sampling.
    pub fn last(&self) -> Option<Arc<SystemSnapshot>> {
        self.lock().last.as_ref().map(|(snapshot, _)| Arc::clone(snapshot))
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<S>> {
        // A panic mid-sample leaves the previous pair intact.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::backend::BackendKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: Arc<AtomicUsize>,
    }

    impl Sampler for Counting {
        fn sample(&mut self) -> Result<SystemSnapshot, SampleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SystemSnapshot::empty(BackendKind::GenericFallback))
        }
    }

    fn cache() -> (SamplingCache<Counting>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = SamplingCache::new(Counting {
            calls: Arc::clone(&calls),
        });
        (cache, calls)
    }

    #[test]
    fn calls_within_window_share_one_snapshot() {
        let (cache, calls) = cache();
        let t0 = Instant::now();
        let a = cache.get_at(t0).unwrap();
        let b = cache.get_at(t0 + Duration::from_millis(999)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn window_expiry_triggers_exactly_one_new_sample() {
        let (cache, calls) = cache();
        let t0 = Instant::now();
        let a = cache.get_at(t0).unwrap();
        let t1 = t0 + STALENESS_WINDOW;
        let b = cache.get_at(t1).unwrap();
        let c = cache.get_at(t1 + Duration::from_millis(10)).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&b, &c));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn burst_of_callers_triggers_one_sample() {
        let (cache, calls) = cache();
        let cache = Arc::new(cache);
        let now = Instant::now();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let cache = Arc::clone(&cache);
                scope.spawn(move || cache.get_at(now).unwrap());
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_sample_keeps_previous_snapshot() {
        struct FailSecond(usize);
        impl Sampler for FailSecond {
            fn sample(&mut self) -> Result<SystemSnapshot, SampleError> {
                self.0 += 1;
                if self.0 == 2 {
                    return Err(SampleError::Collect(
                        crate::system::backend::CollectError::WorkerPanicked,
                    ));
                }
                Ok(SystemSnapshot::empty(BackendKind::NativeLibrary))
            }
        }

        let cache = SamplingCache::new(FailSecond(0));
        let t0 = Instant::now();
        let first = cache.get_at(t0).unwrap();
        assert!(cache.get_at(t0 + Duration::from_secs(2)).is_err());
        assert!(Arc::ptr_eq(&first, &cache.last().unwrap()));
        assert!(cache.get_at(t0 + Duration::from_secs(3)).is_ok());
    }
}
