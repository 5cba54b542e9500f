//! Chunked parallel driver around the fitting kernel.
//!
//! The series is cut into chunks of `chunk_size` timepoints. Each worker reads
//! its chunk plus `overlap_size` timepoints of context on both sides into a
//! private buffer, runs the kernel on every candidate inside that padded range,
//! and contributes only the accepted events whose time falls inside the chunk
//! proper. Neighbouring chunks therefore never both claim an event.

use std::sync::{Mutex, MutexGuard};

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::debug;

use crate::algorithm::kernel::fit_stage_kernel;
use crate::algorithm::selector::check_ascending;
use crate::data::templates::{template_midpoint, Templates};
use crate::data::timeseries::{read_padded, TimeseriesSource};
use crate::error::FitError;
use crate::fit::options::FitOptions;
use crate::fit::progress::{FitProgress, Phase, ProgressSnapshot};

/// One unit of work: the owned range `[start, start + len)` and the padded
/// range actually read, `[read_start, read_start + read_len)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkPlan {
    pub index: usize,
    pub start: usize,
    pub len: usize,
    pub read_start: i64,
    pub read_len: usize,
}

impl ChunkPlan {
    #[inline]
    pub fn owns(&self, t: i64) -> bool {
        t >= self.start as i64 && t < (self.start + self.len) as i64
    }
}

pub fn plan_chunks(num_timepoints: usize, chunk_size: usize, overlap_size: usize) -> Vec<ChunkPlan> {
    if num_timepoints == 0 || chunk_size == 0 {
        return Vec::new();
    }
    (0..num_timepoints)
        .step_by(chunk_size)
        .enumerate()
        .map(|(index, start)| ChunkPlan {
            index,
            start,
            len: chunk_size.min(num_timepoints - start),
            read_start: start as i64 - overlap_size as i64,
            read_len: chunk_size + 2 * overlap_size,
        })
        .collect()
}

#[derive(Clone, Debug, Default)]
pub struct DriverOutput {
    /// Accepted positions into the candidate list, ascending
    pub accepted: Vec<usize>,
    pub num_chunks: usize,
    pub progress: ProgressSnapshot,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Fits the candidates `(times[i], labels[i])` (global timepoints, ascending)
/// against `source` chunk by chunk on a pool of `opts.num_threads` workers.
pub fn fit_chunked<S: TimeseriesSource + ?Sized>(
    source: &S,
    times: &[i64],
    labels: &[usize],
    templates: &Templates,
    opts: &FitOptions,
) -> Result<DriverOutput, FitError> {
    opts.validate()?;
    if times.len() != labels.len() {
        return Err(FitError::InvalidOptions(format!(
            "got {} times but {} labels",
            times.len(),
            labels.len()
        )));
    }
    if source.num_channels() != templates.num_channels() {
        return Err(FitError::ChannelMismatch {
            timeseries: source.num_channels(),
            templates: templates.num_channels(),
        });
    }
    check_ascending(times)?;

    let num_timepoints = source.num_timepoints();
    let (chunk_size, overlap_size) = opts.chunking_for(num_timepoints);
    let plans = plan_chunks(num_timepoints, chunk_size, overlap_size);

    let tmid = template_midpoint(opts.clip_size) as i64;
    let clip_in_series = |t: i64| t - tmid >= 0 && t - tmid + opts.clip_size as i64 <= num_timepoints as i64;

    let pool = ThreadPoolBuilder::new().num_threads(opts.num_threads).build()?;
    let progress = FitProgress::new(num_timepoints, pool.current_num_threads());
    let collector: Mutex<Vec<usize>> = Mutex::new(Vec::new());

    debug!(
        "fitting {} candidates in {} chunks (chunk size {}, overlap {})",
        times.len(),
        plans.len(),
        chunk_size,
        overlap_size
    );

    pool.install(|| {
        plans.par_iter().try_for_each(|plan| -> Result<(), FitError> {
            let mut chunk = progress.timed(Phase::ReadChunk, || {
                read_padded(source, plan.read_start, plan.read_len)
            })?;

            let (lo, local_times, local_labels) = progress.timed(Phase::PrepareLocalData, || {
                let read_end = plan.read_start + plan.read_len as i64;
                let lo = times.partition_point(|&t| t < plan.read_start);
                let hi = times.partition_point(|&t| t < read_end);
                let local_times: Vec<i64> = times[lo..hi].iter().map(|&t| t - plan.read_start).collect();
                // a clip reaching past the series edge is never eligible, whatever
                // padding this chunk carries
                let local_labels: Vec<usize> = times[lo..hi]
                    .iter()
                    .zip(&labels[lo..hi])
                    .map(|(&t, &k)| if clip_in_series(t) { k } else { 0 })
                    .collect();
                (lo, local_times, local_labels)
            });

            let out = progress.timed(Phase::Kernel, || {
                fit_stage_kernel(&mut chunk, &local_times, &local_labels, templates, opts)
            })?;

            progress.timed(Phase::SetToGlobal, || {
                let owned = out
                    .accepted
                    .iter()
                    .map(|&j| lo + j)
                    .filter(|&g| plan.owns(times[g]));
                lock(&collector).extend(owned);
            });
            progress.chunk_done(plan.len);
            Ok(())
        })
    })?;

    let mut accepted = match collector.into_inner() {
        Ok(v) => v,
        Err(poisoned) => poisoned.into_inner(),
    };
    accepted.sort_unstable();

    Ok(DriverOutput {
        accepted,
        num_chunks: plans.len(),
        progress: progress.snapshot(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::timeseries::Timeseries;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_plan_chunks_covers_series() {
        let plans = plan_chunks(25, 10, 3);
        assert_eq!(plans.len(), 3);
        assert_eq!(plans[0].read_start, -3);
        assert_eq!(plans[0].read_len, 16);
        assert_eq!(plans[2].start, 20);
        assert_eq!(plans[2].len, 5);
        let owned: usize = plans.iter().map(|p| p.len).sum();
        assert_eq!(owned, 25);
        assert!(plans[1].owns(10) && plans[1].owns(19));
        assert!(!plans[1].owns(20) && !plans[1].owns(9));
    }

    #[test]
    fn test_plan_chunks_empty_series() {
        assert!(plan_chunks(0, 10, 3).is_empty());
    }

    fn pulse_setup(times: &[i64]) -> (Timeseries, Templates) {
        let mut templates = Templates::zeros(2, 4, 1);
        for m in 0..2 {
            templates.set_value(m, 1, 1, 1.0);
            templates.set_value(m, 2, 1, -0.5);
        }
        let tmid = template_midpoint(4) as i64;
        let mut ts = Timeseries::zeros(2, 200);
        for &t in times {
            for dt in 0..4 {
                for m in 0..2 {
                    let pos = (t - tmid + dt) as usize;
                    let v = ts.value(m, pos) + templates.value(m, dt as usize, 1);
                    ts.set_value(m, pos, v);
                }
            }
        }
        (ts, templates)
    }

    #[test]
    fn test_events_on_chunk_seams_counted_once() {
        let spikes = [19, 20, 40, 59, 61, 100, 150];
        let (ts, templates) = pulse_setup(&spikes);
        let labels = vec![1; spikes.len()];

        let opts = FitOptions::default()
            .with_clip_size(4)
            .with_chunking(20, 8)
            .with_num_threads(3);
        let out = fit_chunked(&ts, &spikes, &labels, &templates, &opts).unwrap();
        assert_eq!(out.num_chunks, 10);
        assert_eq!(out.progress.timepoints_handled, 200);

        let single = FitOptions::default().with_clip_size(4).with_chunking(1000, 8);
        let whole = fit_chunked(&ts, &spikes, &labels, &templates, &single).unwrap();
        assert_eq!(whole.num_chunks, 1);
        assert_eq!(out.accepted, whole.accepted);
    }

    #[test]
    fn test_noisy_series_recovers_every_spike() {
        let spikes = [15, 45, 80, 130, 170];
        let (clean, templates) = pulse_setup(&spikes);
        let mut rng = StdRng::seed_from_u64(7);
        let data = clean.as_slice().iter().map(|v| v + rng.gen_range(-0.05..0.05)).collect();
        let ts = Timeseries::new(2, 200, data).unwrap();
        let labels = vec![1; spikes.len()];

        let opts = FitOptions::default().with_clip_size(4).with_chunking(20, 8);
        let out = fit_chunked(&ts, &spikes, &labels, &templates, &opts).unwrap();
        assert_eq!(out.accepted, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_edge_events_same_for_any_chunking() {
        let shape = [0.0, 0.5, 1.0, 0.5, 0.0, 0.0];
        let mut templates = Templates::zeros(1, 6, 1);
        for (dt, &v) in shape.iter().enumerate() {
            templates.set_value(0, dt, 1, v);
        }
        // clips of t = 1 and t = 197 reach past the series, only t = 100 fits
        let times = [1, 100, 197];
        let tmid = template_midpoint(6) as i64;
        let mut ts = Timeseries::zeros(1, 200);
        for &t in &times {
            for (dt, &v) in shape.iter().enumerate() {
                let pos = t - tmid + dt as i64;
                if (0..200).contains(&pos) {
                    ts.set_value(0, pos as usize, v);
                }
            }
        }
        let labels = [1, 1, 1];

        let whole_opts = FitOptions::default().with_clip_size(6).with_chunking(1000, 16);
        let whole = fit_chunked(&ts, &times, &labels, &templates, &whole_opts).unwrap();
        let chunked_opts = FitOptions::default().with_clip_size(6).with_chunking(50, 16);
        let chunked = fit_chunked(&ts, &times, &labels, &templates, &chunked_opts).unwrap();

        assert_eq!(whole.num_chunks, 1);
        assert_eq!(chunked.num_chunks, 4);
        assert_eq!(whole.accepted, vec![1]);
        assert_eq!(chunked.accepted, whole.accepted);
    }

    #[test]
    fn test_source_is_not_modified() {
        let (ts, templates) = pulse_setup(&[50]);
        let before = ts.clone();
        let opts = FitOptions::default().with_clip_size(4).with_chunking(20, 4);
        let out = fit_chunked(&ts, &[50], &[1], &templates, &opts).unwrap();
        assert_eq!(out.accepted, vec![0]);
        assert_eq!(ts, before);
    }

    #[test]
    fn test_events_outside_series_never_owned() {
        let (ts, templates) = pulse_setup(&[]);
        let opts = FitOptions::default().with_clip_size(4).with_chunking(20, 4);
        let out = fit_chunked(&ts, &[-3, 205], &[1, 1], &templates, &opts).unwrap();
        assert!(out.accepted.is_empty());
    }

    #[test]
    fn test_channel_mismatch() {
        let ts = Timeseries::zeros(3, 50);
        let templates = Templates::zeros(2, 4, 1);
        let opts = FitOptions::default().with_clip_size(4).with_chunking(20, 4);
        assert!(matches!(
            fit_chunked(&ts, &[10], &[1], &templates, &opts),
            Err(FitError::ChannelMismatch { .. })
        ));
    }

    #[test]
    fn test_unsorted_times() {
        let (ts, templates) = pulse_setup(&[]);
        let opts = FitOptions::default().with_clip_size(4).with_chunking(20, 4);
        assert!(matches!(
            fit_chunked(&ts, &[30, 10], &[1, 1], &templates, &opts),
            Err(FitError::UnsortedTimes { .. })
        ));
    }
}
