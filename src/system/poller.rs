use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::cache::SamplingCache;
use super::provider::Sampler;
use super::snapshot::SystemSnapshot;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Snapshots buffered per channel subscriber before old ones are dropped.
const CHANNEL_CAPACITY: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Receives every published snapshot on the polling task. Implementations
/// must return quickly; time spent here delays the next tick.
pub trait SnapshotSubscriber: Send + Sync {
    fn on_snapshot(&self, snapshot: &SystemSnapshot);
}

impl<F> SnapshotSubscriber for F
where
    F: Fn(&SystemSnapshot) + Send + Sync,
{
    fn on_snapshot(&self, snapshot: &SystemSnapshot) {
        self(snapshot)
    }
}

type Subscribers = Arc<Mutex<Vec<Arc<dyn SnapshotSubscriber>>>>;

/// Time to sleep so the next tick lands on a multiple of `interval` since
/// the epoch. A reading exactly on a boundary sleeps a full interval.
pub fn sleep_until_next_tick(since_epoch: Duration, interval: Duration) -> Duration {
    let interval_nanos = interval.as_nanos();
    if interval_nanos == 0 {
        return Duration::ZERO;
    }
    let into_tick = since_epoch.as_nanos() % interval_nanos;
    Duration::from_nanos((interval_nanos - into_tick) as u64)
}

/// First tick boundary strictly after `now`, counting whole intervals from
/// `base`. Consecutive results are always a whole number of intervals apart.
pub fn next_tick_after(base: Instant, now: Instant, interval: Duration) -> Instant {
    let interval_nanos = interval.as_nanos();
    if interval_nanos == 0 {
        return now;
    }
    let ticks = now.saturating_duration_since(base).as_nanos() / interval_nanos + 1;
    let ticks = u32::try_from(ticks).unwrap_or(u32::MAX);
    base + interval * ticks
}

fn since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// Background loop that samples through the cache on a fixed, wall-clock
/// aligned cadence and publishes each snapshot.
pub struct Poller<S> {
    cache: Arc<SamplingCache<S>>,
    interval: Duration,
    state: Arc<watch::Sender<PollerState>>,
    sender: broadcast::Sender<Arc<SystemSnapshot>>,
    subscribers: Subscribers,
    task: Option<JoinHandle<()>>,
}

impl<S: Sampler + 'static> Poller<S> {
    pub fn new(cache: Arc<SamplingCache<S>>, interval: Duration) -> Self {
        let (state, _) = watch::channel(PollerState::Idle);
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            cache,
            interval,
            state: Arc::new(state),
            sender,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            task: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> PollerState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<PollerState> {
        self.state.subscribe()
    }

    /// Channel of published snapshots. Receivers that fall behind lose the
    /// oldest ones.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<SystemSnapshot>> {
        self.sender.subscribe()
    }

    pub fn add_subscriber(&self, subscriber: Arc<dyn SnapshotSubscriber>) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscriber);
    }

    /// Idle -> Running. Must be called inside a tokio runtime. Returns
    /// false if the poller was already started.
    pub fn start(&mut self) -> bool {
        if self.state() != PollerState::Idle {
            return false;
        }
        self.state.send_replace(PollerState::Running);
        debug!(interval_ms = self.interval.as_millis() as u64, "poller running");

        let cache = Arc::clone(&self.cache);
        let state = Arc::clone(&self.state);
        let sender = self.sender.clone();
        let subscribers = Arc::clone(&self.subscribers);
        let interval = self.interval;
        self.task = Some(tokio::spawn(run_loop(
            cache,
            interval,
            state,
            sender,
            subscribers,
        )));
        true
    }

    /// Ask the loop to finish. It notices at the top of its next iteration;
    /// a cycle already sampling runs to completion.
    pub fn stop(&self) {
        self.state.send_if_modified(|state| match state {
            PollerState::Running => {
                *state = PollerState::Stopping;
                true
            }
            PollerState::Idle => {
                *state = PollerState::Stopped;
                true
            }
            PollerState::Stopping | PollerState::Stopped => false,
        });
    }

    /// Wait for the loop task to exit.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
        {
            warn!(error = %err, "poller task ended abnormally");
        }
    }
}

impl<S> Drop for Poller<S> {
    fn drop(&mut self) {
        self.state.send_if_modified(|state| {
            if *state == PollerState::Running {
                *state = PollerState::Stopping;
                true
            } else {
                false
            }
        });
    }
}

async fn run_loop<S: Sampler + 'static>(
    cache: Arc<SamplingCache<S>>,
    interval: Duration,
    state: Arc<watch::Sender<PollerState>>,
    sender: broadcast::Sender<Arc<SystemSnapshot>>,
    subscribers: Subscribers,
) {
    let mut state_changes = state.subscribe();

    // Wall-clock boundary at or before start; every tick is stamped with a
    // boundary so the cache sees exact multiples of the interval.
    let started = Instant::now();
    let base = (started + sleep_until_next_tick(since_epoch(), interval))
        .checked_sub(interval)
        .unwrap_or(started);
    let mut deadline = base;

    loop {
        if *state.borrow() != PollerState::Running {
            break;
        }

        let cycle_cache = Arc::clone(&cache);
        let stamp = deadline;
        match tokio::task::spawn_blocking(move || cycle_cache.get_at(stamp)).await {
            Ok(Ok(snapshot)) => publish(&snapshot, &sender, &subscribers),
            Ok(Err(err)) => warn!(error = %err, "sampling cycle failed; nothing published"),
            Err(err) => warn!(error = %err, "sampling cycle panicked; nothing published"),
        }

        deadline = next_tick_after(base, Instant::now(), interval);
        tokio::select! {
            _ = tokio::time::sleep_until(deadline.into()) => {}
            _ = state_changes.changed() => {}
        }
    }

    state.send_replace(PollerState::Stopped);
    debug!("poller stopped");
}

fn publish(snapshot: &Arc<SystemSnapshot>, sender: &broadcast::Sender<Arc<SystemSnapshot>>, subscribers: &Subscribers) {
    // No channel receivers is not an error.
    let _ = sender.send(Arc::clone(snapshot));
    let subscribers = subscribers.lock().unwrap_or_else(PoisonError::into_inner);
    for subscriber in subscribers.iter() {
        subscriber.on_snapshot(snapshot);
    }
}
