use std::time::Instant;

use serde::Serialize;
use tracing::info;

use crate::algorithm::shells::{split_into_shells, ShellOptions};
use crate::algorithm::template_provider::TemplateProvider;
use crate::data::firings::Firings;
use crate::data::templates::Templates;
use crate::data::timeseries::TimeseriesSource;
use crate::error::FitError;
use crate::fit::driver::fit_chunked;
use crate::fit::options::FitOptions;
use crate::fit::progress::ProgressSnapshot;

/// What a fit stage run did, for logs and JSON reports.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FitSummary {
    pub events_in: usize,
    pub events_kept: usize,
    pub num_templates: usize,
    pub num_chunks: usize,
    pub sort_secs: f64,
    pub shells_secs: f64,
    pub templates_secs: f64,
    pub fit_secs: f64,
    pub total_secs: f64,
    pub progress: ProgressSnapshot,
}

impl FitSummary {
    pub fn percent_kept(&self) -> f64 {
        if self.events_in == 0 {
            0.0
        } else {
            self.events_kept as f64 * 100.0 / self.events_in as f64
        }
    }
}

#[derive(Clone, Debug)]
pub struct FitStageOutput {
    /// Kept events with all of their original fields, in time order
    pub firings: Firings,
    /// Positions of the kept events in the time-sorted input
    pub accepted: Vec<usize>,
    /// One template per amplitude shell, as fitted
    pub templates: Templates,
    pub summary: FitSummary,
}

/// Full fit stage: sort the events by time, split clusters into amplitude
/// shells, compute one template per shell, fit chunk by chunk, and return the
/// surviving events with their original labels.
pub fn fit_stage(
    source: &dyn TimeseriesSource,
    firings: &Firings,
    provider: &dyn TemplateProvider,
    opts: &FitOptions,
) -> Result<FitStageOutput, FitError> {
    opts.validate()?;
    let total = Instant::now();

    let timer = Instant::now();
    let sorted = firings.sort_by_time();
    let sort_secs = timer.elapsed().as_secs_f64();

    let timer = Instant::now();
    let split = split_into_shells(&sorted, &ShellOptions::from(opts))?;
    let times = split.time_indices();
    let labels = split.labels();
    let shells_secs = timer.elapsed().as_secs_f64();

    let timer = Instant::now();
    let templates = provider.compute_templates(source, &split, opts.clip_size)?;
    let templates_secs = timer.elapsed().as_secs_f64();

    let timer = Instant::now();
    let driver = fit_chunked(source, &times, &labels, &templates, opts)?;
    let fit_secs = timer.elapsed().as_secs_f64();

    let out = sorted.select(&driver.accepted);
    let summary = FitSummary {
        events_in: firings.len(),
        events_kept: out.len(),
        num_templates: templates.num_clusters(),
        num_chunks: driver.num_chunks,
        sort_secs,
        shells_secs,
        templates_secs,
        fit_secs,
        total_secs: total.elapsed().as_secs_f64(),
        progress: driver.progress,
    };

    if !firings.is_empty() {
        info!(
            "using {}/{} events ({:.1}%)",
            summary.events_kept,
            summary.events_in,
            summary.percent_kept()
        );
    }

    Ok(FitStageOutput {
        firings: out,
        accepted: driver.accepted,
        templates,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::template_provider::MeanTemplateProvider;
    use crate::data::firings::Event;
    use crate::data::timeseries::Timeseries;

    fn event(time: f64, label: usize, peak: f64) -> Event {
        Event {
            channel: 1.0,
            time,
            label,
            peak,
        }
    }

    fn opts() -> FitOptions {
        let mut opts = FitOptions::default().with_clip_size(4).with_chunking(1000, 4);
        opts.min_shell_size = 1;
        opts.shell_increment = 100.0;
        opts
    }

    #[test]
    fn test_single_pulse_end_to_end() {
        // M = 2, N = 20, unit two-sample pulse at t = 10 on both channels
        let mut ts = Timeseries::zeros(2, 20);
        for m in 0..2 {
            ts.set_value(m, 10, 1.0);
            ts.set_value(m, 11, 1.0);
        }
        let firings = Firings::from_events(&[event(10.0, 1, 1.0)]);

        let out = fit_stage(&ts, &firings, &MeanTemplateProvider::default(), &opts()).unwrap();
        assert_eq!(out.firings, firings);
        assert_eq!(out.accepted, vec![0]);
        assert_eq!(out.summary.events_kept, 1);
        assert_eq!(out.summary.num_chunks, 1);
        assert_eq!(out.templates.num_clusters(), 1);
        assert_eq!(out.templates.value(0, 1, 1), 1.0);
    }

    #[test]
    fn test_output_is_time_sorted_with_original_labels() {
        let mut ts = Timeseries::zeros(1, 60);
        ts.set_value(0, 10, -2.0);
        ts.set_value(0, 40, -2.0);
        // out of order input, plus an unclassified event and a spurious one
        let firings = Firings::from_events(&[
            event(40.0, 3, -2.0),
            event(25.0, 0, -1.0),
            event(10.0, 3, -2.0),
            event(52.0, 2, -1.0),
        ]);

        let out = fit_stage(&ts, &firings, &MeanTemplateProvider::default(), &opts()).unwrap();
        assert_eq!(out.firings.len(), 2);
        assert_eq!(out.firings.time(0), 10.0);
        assert_eq!(out.firings.time(1), 40.0);
        assert_eq!(out.firings.labels(), vec![3, 3]);
        assert_eq!(out.summary.events_in, 4);
        assert!((out.summary.percent_kept() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_firings() {
        let ts = Timeseries::zeros(1, 10);
        let firings = Firings::from_events(&[]);
        let out = fit_stage(&ts, &firings, &MeanTemplateProvider::default(), &opts()).unwrap();
        assert!(out.firings.is_empty());
        assert_eq!(out.summary.percent_kept(), 0.0);
    }

    #[test]
    fn test_invalid_options_rejected() {
        let ts = Timeseries::zeros(1, 10);
        let firings = Firings::from_events(&[]);
        let mut bad = opts();
        bad.clip_size = 0;
        assert!(matches!(
            fit_stage(&ts, &firings, &MeanTemplateProvider::default(), &bad),
            Err(FitError::InvalidOptions(_))
        ));
    }
}
