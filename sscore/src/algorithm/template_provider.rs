use rayon::prelude::*;
use tracing::warn;

use crate::data::firings::Firings;
use crate::data::templates::{template_midpoint, Templates};
use crate::data::timeseries::{Timeseries, TimeseriesSource};
use crate::error::FitError;
use crate::fit::options::PROCESSING_CHUNK_SIZE;

/// Source of the per-cluster waveforms the kernel fits with.
pub trait TemplateProvider: Sync {
    fn compute_templates(
        &self,
        source: &dyn TimeseriesSource,
        firings: &Firings,
        clip_size: usize,
    ) -> Result<Templates, FitError>;
}

/// Templates as the average clip of every event carrying the label.
///
/// Clips are `[t - Tmid, t - Tmid + T)`; events whose clip leaves the series
/// are skipped, and a label without any usable event gets an all-zero template.
#[derive(Clone, Debug)]
pub struct MeanTemplateProvider {
    /// Timepoints read from the source per block
    pub block_size: usize,
}

impl Default for MeanTemplateProvider {
    fn default() -> Self {
        MeanTemplateProvider {
            block_size: PROCESSING_CHUNK_SIZE,
        }
    }
}

/// Per-block partial sums.
struct Accumulator {
    sums: Vec<f64>,
    counts: Vec<usize>,
    skipped: usize,
}

impl Accumulator {
    fn new(block_len: usize, num_clusters: usize) -> Self {
        Accumulator {
            sums: vec![0.0; block_len * num_clusters],
            counts: vec![0; num_clusters],
            skipped: 0,
        }
    }

    fn merge(mut self, other: Accumulator) -> Self {
        for (a, b) in self.sums.iter_mut().zip(other.sums) {
            *a += b;
        }
        for (a, b) in self.counts.iter_mut().zip(other.counts) {
            *a += b;
        }
        self.skipped += other.skipped;
        self
    }
}

impl TemplateProvider for MeanTemplateProvider {
    fn compute_templates(
        &self,
        source: &dyn TimeseriesSource,
        firings: &Firings,
        clip_size: usize,
    ) -> Result<Templates, FitError> {
        let m = source.num_channels();
        let n = source.num_timepoints() as i64;
        let k = firings.max_label();
        let tmid = template_midpoint(clip_size) as i64;
        let block_len = m * clip_size;
        let block_size = self.block_size.max(1) as i64;

        // (clip start, label) per usable event, grouped by block
        let num_blocks = ((n + block_size - 1) / block_size).max(0) as usize;
        let mut per_block: Vec<Vec<(i64, usize)>> = vec![Vec::new(); num_blocks];
        let mut out_of_bounds = 0usize;
        for i in 0..firings.len() {
            let label = firings.label(i);
            if label == 0 {
                continue;
            }
            let t0 = firings.time_index(i) - tmid;
            if t0 < 0 || t0 + clip_size as i64 > n {
                out_of_bounds += 1;
                continue;
            }
            per_block[(t0 / block_size) as usize].push((t0, label));
        }

        let acc = per_block
            .par_iter()
            .enumerate()
            .filter(|(_, clips)| !clips.is_empty())
            .map(|(b, clips)| -> Result<Accumulator, FitError> {
                let start = b as i64 * block_size;
                let end = (start + block_size + clip_size as i64).min(n);
                let data = source.read_chunk(0..m, start as usize, (end - start) as usize)?;
                let block = Timeseries::new(m, (end - start) as usize, data)?;

                let mut acc = Accumulator::new(block_len, k);
                for &(t0, label) in clips {
                    match block.window(t0 - start, clip_size) {
                        Some(clip) => {
                            let dst = &mut acc.sums[(label - 1) * block_len..label * block_len];
                            for (d, v) in dst.iter_mut().zip(clip) {
                                *d += v;
                            }
                            acc.counts[label - 1] += 1;
                        }
                        None => acc.skipped += 1,
                    }
                }
                Ok(acc)
            })
            .try_reduce(|| Accumulator::new(block_len, k), |a, b| Ok(a.merge(b)))?;

        let skipped = out_of_bounds + acc.skipped;
        if skipped > 0 {
            warn!("{} events skipped for template computation: clip outside the series", skipped);
        }

        let mut data = acc.sums;
        for (label_idx, &count) in acc.counts.iter().enumerate() {
            if count > 0 {
                let scale = 1.0 / count as f64;
                for v in &mut data[label_idx * block_len..(label_idx + 1) * block_len] {
                    *v *= scale;
                }
            }
        }

        Templates::new(m, clip_size, k, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::firings::Event;

    fn event(time: f64, label: usize) -> Event {
        Event {
            channel: 0.0,
            time,
            label,
            peak: 0.0,
        }
    }

    #[test]
    fn test_mean_of_clips() {
        let mut ts = Timeseries::zeros(2, 40);
        ts.set_value(0, 10, 2.0);
        ts.set_value(1, 11, -2.0);
        ts.set_value(0, 30, 4.0);
        ts.set_value(1, 31, -4.0);
        let firings = Firings::from_events(&[event(10.0, 1), event(30.0, 1), event(20.0, 2)]);

        let provider = MeanTemplateProvider { block_size: 16 };
        let templates = provider.compute_templates(&ts, &firings, 4).unwrap();
        assert_eq!(templates.num_clusters(), 2);
        // Tmid = 1: the event sample sits at clip index 1
        assert!((templates.value(0, 1, 1) - 3.0).abs() < 1e-12);
        assert!((templates.value(1, 2, 1) + 3.0).abs() < 1e-12);
        assert_eq!(templates.value(0, 0, 1), 0.0);
        assert!(templates.get(2).unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_events_near_edges_skipped() {
        let mut ts = Timeseries::zeros(1, 10);
        ts.set_value(0, 5, 1.0);
        let firings = Firings::from_events(&[event(0.0, 1), event(5.0, 1), event(9.0, 1)]);
        let templates = MeanTemplateProvider::default()
            .compute_templates(&ts, &firings, 4)
            .unwrap();
        assert!((templates.value(0, 1, 1) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_label_zero_ignored() {
        let ts = Timeseries::zeros(1, 10);
        let firings = Firings::from_events(&[event(5.0, 0)]);
        let templates = MeanTemplateProvider::default()
            .compute_templates(&ts, &firings, 4)
            .unwrap();
        assert_eq!(templates.num_clusters(), 0);
    }
}
