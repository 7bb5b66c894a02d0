/// Cumulative CPU time counters since boot, in OS ticks.
///
/// `kernel` includes `idle`, matching how Windows reports `GetSystemTimes`;
/// other platforms fold their idle time into `kernel` to keep one formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuTimes {
    pub idle: u64,
    pub kernel: u64,
    pub user: u64,
}

impl CpuTimes {
    pub fn total(&self) -> u64 {
        self.kernel.saturating_add(self.user)
    }
}

/// Busy percentage between two readings: `100 * (1 - idle_delta / total_delta)`.
///
/// Returns `None` when no time elapsed or the counters went backwards.
pub fn busy_percent(previous: &CpuTimes, current: &CpuTimes) -> Option<f32> {
    let idle = current.idle.checked_sub(previous.idle)?;
    let total = current.total().checked_sub(previous.total())?;
    if total == 0 {
        return None;
    }
    let busy = 100.0 * (1.0 - idle as f64 / total as f64);
    Some(busy.clamp(0.0, 100.0) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarter_busy() {
        let a = CpuTimes { idle: 100, kernel: 150, user: 50 };
        let b = CpuTimes { idle: 175, kernel: 250, user: 50 };
        // idle +75, total +100
        assert_eq!(busy_percent(&a, &b), Some(25.0));
    }

    #[test]
    fn fully_idle_and_fully_busy() {
        let a = CpuTimes::default();
        let idle = CpuTimes { idle: 10, kernel: 10, user: 0 };
        let busy = CpuTimes { idle: 0, kernel: 4, user: 6 };
        assert_eq!(busy_percent(&a, &idle), Some(0.0));
        assert_eq!(busy_percent(&a, &busy), Some(100.0));
    }

    #[test]
    fn no_elapsed_time_or_reset_yields_none() {
        let a = CpuTimes { idle: 10, kernel: 20, user: 5 };
        assert_eq!(busy_percent(&a, &a), None);
        assert_eq!(busy_percent(&a, &CpuTimes::default()), None);
    }
}
