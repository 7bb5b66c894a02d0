use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Elapsed times shorter than this are clamped up to it before dividing.
pub const MIN_RATE_INTERVAL: Duration = Duration::from_millis(100);

/// Rate reported on the first observation of a counter, and after a reset.
/// Small but non-zero so a fresh entity does not read as dead.
pub const FIRST_SAMPLE_RATE: f64 = 1.0;

/// The cumulative counters a rate can be derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterKind {
    DiskRead,
    DiskWrite,
    NetSent,
    NetReceived,
    OtherIo,
}

/// What a counter belongs to: one process, or the machine as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityId {
    System,
    Process(u32),
}

/// A raw cumulative counter paired with the moment it was read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterSample {
    pub value: u64,
    pub at: Instant,
}

impl CounterSample {
    pub fn new(value: u64, at: Instant) -> Self {
        Self { value, at }
    }
}

/// Previous readings keyed by `(entity, counter)`. Only ever consulted to
/// produce a rate.
#[derive(Debug, Default)]
pub struct RateState {
    samples: HashMap<(EntityId, CounterKind), CounterSample>,
}

impl RateState {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn replace(&mut self, key: (EntityId, CounterKind), sample: CounterSample) -> Option<CounterSample> {
        self.samples.insert(key, sample)
    }

    fn retain_processes(&mut self, alive: &HashSet<u32>) {
        self.samples.retain(|(entity, _), _| match entity {
            EntityId::System => true,
            EntityId::Process(pid) => alive.contains(pid),
        });
    }
}

/// Turns pairs of timestamped cumulative readings into per-second rates.
#[derive(Debug)]
pub struct RateDeriver {
    state: RateState,
    min_interval: Duration,
    placeholder: f64,
}

impl Default for RateDeriver {
    fn default() -> Self {
        Self::new()
    }
}

impl RateDeriver {
    pub fn new() -> Self {
        Self::with_policy(MIN_RATE_INTERVAL, FIRST_SAMPLE_RATE)
    }

    pub fn with_policy(min_interval: Duration, placeholder: f64) -> Self {
        Self {
            state: RateState::default(),
            min_interval,
            placeholder,
        }
    }

    pub fn placeholder(&self) -> f64 {
        self.placeholder
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn tracked(&self) -> usize {
        self.state.len()
    }

    /// Derive the per-second rate of `kind` for `entity` given its current
    /// cumulative value. The stored sample is always replaced with the
    /// current reading.
    pub fn derive(&mut self, kind: CounterKind, entity: EntityId, value: u64, now: Instant) -> f64 {
        let current = CounterSample::new(value, now);
        let Some(previous) = self.state.replace((entity, kind), current) else {
            return self.placeholder;
        };

        // A counter that went backwards was reset or wrapped.
        let Some(delta) = value.checked_sub(previous.value) else {
            return self.placeholder;
        };

        let elapsed = now
            .saturating_duration_since(previous.at)
            .max(self.min_interval);
        delta as f64 / elapsed.as_secs_f64()
    }

    /// Drop baselines for processes that are no longer alive. System-wide
    /// counters are kept.
    pub fn evict_missing(&mut self, alive: &HashSet<u32>) {
        self.state.retain_processes(alive);
    }
}
