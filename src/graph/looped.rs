//! Looped triggers: wave origins driven by a periodic clock thread.
//!
//! The element itself only stores its period, mode, statistics and the
//! handle of the running [`PeriodicTask`]. What a tick does (running one
//! wave over the network) is supplied by the network when it starts the
//! loop.

use crate::graph::clock::{Pacing, PeriodicTask, Tick};
use crate::graph::error::{GraphError, GraphResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

/// How a looped trigger advances time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoopMode {
    /// Wait for each period; `dt` is the measured time since the previous tick.
    #[default]
    RealTime,
    /// Wait for each period; `dt` is always the period.
    FixedStep,
    /// Run as fast as possible; `dt` is always the period.
    Simulated,
}

impl LoopMode {
    pub(crate) fn pacing(self) -> Pacing {
        match self {
            LoopMode::RealTime | LoopMode::FixedStep => Pacing::Paced,
            LoopMode::Simulated => Pacing::Free,
        }
    }

    /// Integration step for a tick.
    pub fn dt(self, tick: &Tick) -> Duration {
        match self {
            LoopMode::RealTime => tick.measured,
            LoopMode::FixedStep | LoopMode::Simulated => tick.period,
        }
    }
}

/// Runtime statistics of one looped trigger.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoopStatistics {
    pub ticks: u64,
    pub last_wave: Duration,
    pub average_wave: Duration,
    /// Waves that took longer than the period.
    pub overruns: u64,
    pub started_at: Option<DateTime<Utc>>,
}

impl LoopStatistics {
    pub(crate) fn record(&mut self, wave: Duration, period: Duration) {
        self.ticks += 1;
        self.last_wave = wave;
        // Running mean, in nanoseconds to keep precision for short waves
        let n = self.ticks as u128;
        let mean = self.average_wave.as_nanos();
        let next = mean + (wave.as_nanos().saturating_sub(mean) / n)
            - (mean.saturating_sub(wave.as_nanos()) / n);
        self.average_wave = Duration::from_nanos(next.min(u64::MAX as u128) as u64);
        if wave > period {
            self.overruns += 1;
        }
    }
}

pub struct LoopedTrigger {
    period: Duration,
    mode: LoopMode,
    task: Mutex<Option<Arc<PeriodicTask>>>,
    stats: Arc<Mutex<LoopStatistics>>,
}

impl LoopedTrigger {
    pub fn new(period: Duration, mode: LoopMode) -> GraphResult<Self> {
        if period.is_zero() {
            return Err(GraphError::InvalidParameter(
                "looped trigger period must be greater than zero".to_string(),
            ));
        }
        if period.subsec_nanos() % 1_000 != 0 {
            return Err(GraphError::InvalidParameter(format!(
                "looped trigger period {:?} is not a whole number of microseconds",
                period
            )));
        }
        Ok(Self {
            period,
            mode,
            task: Mutex::new(None),
            stats: Arc::new(Mutex::new(LoopStatistics::default())),
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn mode(&self) -> LoopMode {
        self.mode
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| t.is_running())
    }

    pub fn statistics(&self) -> LoopStatistics {
        self.stats.lock().clone()
    }

    /// Shared handle for recording from inside the tick closure.
    pub(crate) fn stats_handle(&self) -> Arc<Mutex<LoopStatistics>> {
        self.stats.clone()
    }

    /// Spawn the clock thread. Returns `false` if it was already running.
    pub(crate) fn start<F>(&self, name: &str, tick: F) -> GraphResult<bool>
    where
        F: FnMut(Tick) -> ControlFlow<()> + Send + 'static,
    {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| t.is_running()) {
            return Ok(false);
        }
        {
            let mut stats = self.stats.lock();
            *stats = LoopStatistics::default();
            stats.started_at = Some(Utc::now());
        }
        *task = Some(Arc::new(PeriodicTask::spawn(
            name,
            self.period,
            self.mode.pacing(),
            tick,
        )?));
        Ok(true)
    }

    /// Detach the running task so it can be stopped outside any graph lock.
    pub(crate) fn take_task(&self) -> Option<Arc<PeriodicTask>> {
        self.task.lock().take()
    }
}

impl std::fmt::Debug for LoopedTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopedTrigger")
            .field("period", &self.period)
            .field("mode", &self.mode)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn tick(measured_ms: u64) -> Tick {
        Tick {
            index: 1,
            measured: Duration::from_millis(measured_ms),
            period: Duration::from_millis(10),
            deadline: Instant::now(),
        }
    }

    #[test]
    fn test_period_resolution() {
        assert!(LoopedTrigger::new(Duration::ZERO, LoopMode::RealTime).is_err());
        assert!(LoopedTrigger::new(Duration::from_nanos(1_500), LoopMode::RealTime).is_err());
        let looped = LoopedTrigger::new(Duration::from_micros(500), LoopMode::FixedStep).unwrap();
        assert_eq!(looped.period(), Duration::from_micros(500));
    }

    #[test]
    fn test_mode_dt() {
        assert_eq!(LoopMode::RealTime.dt(&tick(12)), Duration::from_millis(12));
        assert_eq!(LoopMode::FixedStep.dt(&tick(12)), Duration::from_millis(10));
        assert_eq!(LoopMode::Simulated.dt(&tick(12)), Duration::from_millis(10));
        assert_eq!(LoopMode::Simulated.pacing(), Pacing::Free);
    }

    #[test]
    fn test_statistics_mean_and_overruns() {
        let mut stats = LoopStatistics::default();
        let period = Duration::from_millis(10);
        stats.record(Duration::from_millis(2), period);
        stats.record(Duration::from_millis(4), period);
        stats.record(Duration::from_millis(15), period);
        assert_eq!(stats.ticks, 3);
        assert_eq!(stats.last_wave, Duration::from_millis(15));
        assert_eq!(stats.average_wave, Duration::from_millis(7));
        assert_eq!(stats.overruns, 1);
    }

    #[test]
    fn test_zero_period_rejected() {
        assert!(LoopedTrigger::new(Duration::ZERO, LoopMode::FixedStep).is_err());
    }

    #[test]
    fn test_start_is_idempotent() {
        let looped = LoopedTrigger::new(Duration::from_millis(5), LoopMode::FixedStep).unwrap();
        assert!(looped.start("idem", |_| ControlFlow::Continue(())).unwrap());
        assert!(!looped.start("idem", |_| ControlFlow::Continue(())).unwrap());
        assert!(looped.is_running());
        assert!(looped.statistics().started_at.is_some());

        let task = looped.take_task().unwrap();
        task.stop(Duration::from_secs(1)).unwrap();
        assert!(!looped.is_running());
    }
}
