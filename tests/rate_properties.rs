use std::collections::HashSet;
use std::time::{Duration, Instant};

use proptest::prelude::*;
use procpulse::system::cpu::{CpuTimes, busy_percent};
use procpulse::system::rate::{CounterKind, EntityId, FIRST_SAMPLE_RATE, MIN_RATE_INTERVAL, RateDeriver};

const PID: EntityId = EntityId::Process(7);

proptest! {
    #[test]
    fn rates_are_never_negative(
        readings in prop::collection::vec((0u64..1_000_000_000, 0u64..5_000), 1..40)
    ) {
        let mut rates = RateDeriver::new();
        let mut now = Instant::now();
        for (value, step_ms) in readings {
            now += Duration::from_millis(step_ms);
            let rate = rates.derive(CounterKind::DiskRead, PID, value, now);
            prop_assert!(rate >= 0.0, "negative rate {rate}");
            prop_assert!(rate.is_finite());
        }
    }

    #[test]
    fn short_intervals_are_clamped(
        base in 0u64..1_000_000,
        delta in 0u64..1_000_000,
        step_ms in 0u64..100,
    ) {
        let mut rates = RateDeriver::new();
        let start = Instant::now();
        rates.derive(CounterKind::NetSent, EntityId::System, base, start);
        let rate = rates.derive(
            CounterKind::NetSent,
            EntityId::System,
            base + delta,
            start + Duration::from_millis(step_ms),
        );
        prop_assert_eq!(rates.min_interval(), MIN_RATE_INTERVAL);
        let bound = delta as f64 / rates.min_interval().as_secs_f64();
        prop_assert!(rate <= bound + 1e-6, "rate {rate} exceeds clamp bound {bound}");
    }

    #[test]
    fn a_decreasing_counter_reads_as_placeholder(
        high in 1u64..u64::MAX,
        drop in 1u64..1_000_000,
    ) {
        let low = high.saturating_sub(drop);
        prop_assume!(low < high);
        let mut rates = RateDeriver::new();
        let start = Instant::now();
        rates.derive(CounterKind::DiskWrite, PID, high, start);
        let rate = rates.derive(CounterKind::DiskWrite, PID, low, start + Duration::from_secs(1));
        prop_assert_eq!(rate, rates.placeholder());
        prop_assert_eq!(rates.placeholder(), FIRST_SAMPLE_RATE);
    }

    #[test]
    fn eviction_keeps_only_live_processes(
        pids in prop::collection::hash_set(100u32..10_000, 1..50),
        keep in prop::collection::hash_set(100u32..10_000, 0..50),
    ) {
        let mut rates = RateDeriver::new();
        let now = Instant::now();
        rates.derive(CounterKind::NetReceived, EntityId::System, 1, now);
        for &pid in &pids {
            rates.derive(CounterKind::DiskRead, EntityId::Process(pid), 1, now);
        }
        let alive: HashSet<u32> = keep.into_iter().collect();
        rates.evict_missing(&alive);
        let expected = pids.intersection(&alive).count() + 1;
        prop_assert_eq!(rates.tracked(), expected);
    }

    #[test]
    fn busy_percent_stays_in_range(
        idle in 0u64..1_000_000,
        busy_kernel in 0u64..1_000_000,
        user in 0u64..1_000_000,
        d_idle in 0u64..1_000_000,
        d_busy_kernel in 0u64..1_000_000,
        d_user in 0u64..1_000_000,
    ) {
        let prev = CpuTimes { idle, kernel: idle + busy_kernel, user };
        let cur = CpuTimes {
            idle: idle + d_idle,
            kernel: idle + d_idle + busy_kernel + d_busy_kernel,
            user: user + d_user,
        };
        if let Some(percent) = busy_percent(&prev, &cur) {
            prop_assert!((0.0..=100.0).contains(&percent), "out of range: {percent}");
        }
    }
}
