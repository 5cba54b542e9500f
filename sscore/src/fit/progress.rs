//! Progress and timing shared by all chunk workers.
//!
//! Counters are atomics; only the "when did we last print" instant sits
//! behind its own mutex, so reporting never contends with the lock guarding
//! the accepted-event collector.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    ReadChunk,
    PrepareLocalData,
    Kernel,
    SetToGlobal,
}

impl Phase {
    #[inline]
    fn slot(self) -> usize {
        match self {
            Phase::ReadChunk => 0,
            Phase::PrepareLocalData => 1,
            Phase::Kernel => 2,
            Phase::SetToGlobal => 3,
        }
    }
}

/// Point-in-time copy of the counters, in seconds.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub timepoints_handled: usize,
    pub num_timepoints: usize,
    pub read_chunk_secs: f64,
    pub prepare_local_data_secs: f64,
    pub kernel_secs: f64,
    pub set_to_global_secs: f64,
    pub total_secs: f64,
    pub num_threads: usize,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> f64 {
        if self.num_timepoints == 0 {
            100.0
        } else {
            self.timepoints_handled as f64 * 100.0 / self.num_timepoints as f64
        }
    }
}

#[derive(Debug)]
pub struct FitProgress {
    num_timepoints: usize,
    num_threads: usize,
    started: Instant,
    timepoints_handled: AtomicUsize,
    phase_nanos: [AtomicU64; 4],
    last_report: Mutex<Option<Instant>>,
}

impl FitProgress {
    pub fn new(num_timepoints: usize, num_threads: usize) -> Self {
        FitProgress {
            num_timepoints,
            num_threads,
            started: Instant::now(),
            timepoints_handled: AtomicUsize::new(0),
            phase_nanos: Default::default(),
            last_report: Mutex::new(None),
        }
    }

    #[inline]
    pub fn add_time(&self, phase: Phase, elapsed: Duration) {
        self.phase_nanos[phase.slot()].fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Times `f` under `phase`.
    pub fn timed<T>(&self, phase: Phase, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.add_time(phase, start.elapsed());
        out
    }

    /// Records a finished chunk and logs a progress line on the first chunk,
    /// on completion, and otherwise at most once per second.
    pub fn chunk_done(&self, timepoints: usize) {
        let handled = self.timepoints_handled.fetch_add(timepoints, Ordering::AcqRel) + timepoints;

        let mut last = match self.last_report.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let due = match *last {
            None => true,
            Some(t) => t.elapsed() > REPORT_INTERVAL,
        };
        if due || handled >= self.num_timepoints {
            *last = Some(Instant::now());
            drop(last);
            self.report();
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let secs = |p: Phase| self.phase_nanos[p.slot()].load(Ordering::Relaxed) as f64 * 1e-9;
        ProgressSnapshot {
            timepoints_handled: self.timepoints_handled.load(Ordering::Acquire),
            num_timepoints: self.num_timepoints,
            read_chunk_secs: secs(Phase::ReadChunk),
            prepare_local_data_secs: secs(Phase::PrepareLocalData),
            kernel_secs: secs(Phase::Kernel),
            set_to_global_secs: secs(Phase::SetToGlobal),
            total_secs: self.started.elapsed().as_secs_f64(),
            num_threads: self.num_threads,
        }
    }

    fn report(&self) {
        let s = self.snapshot();
        info!(
            "{}/{} ({:.0}%) - Elapsed(s): RC:{:.3}, PLD:{:.3}, KERNEL:{:.3}, STG:{:.3}, Total:{:.3}, {} threads",
            s.timepoints_handled,
            s.num_timepoints,
            s.percent(),
            s.read_chunk_secs,
            s.prepare_local_data_secs,
            s.kernel_secs,
            s.set_to_global_secs,
            s.total_secs,
            s.num_threads,
        );
    }
}
