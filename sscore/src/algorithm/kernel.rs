//! Greedy template-subtraction kernel.
//!
//! Works on one private buffer. Every pass scores all undecided candidates
//! against the buffer as it currently stands, lets the non-max selector pick
//! winners, subtracts the winners' templates and repeats until a pass adds
//! nothing. Accepted and rejected are both terminal, so the loop runs at most
//! `L + 1` passes for `L` candidates.

use tracing::debug;

use crate::algorithm::score::{compute_score, subtract_template};
use crate::algorithm::selector::{check_ascending, select_events};
use crate::data::templates::{template_midpoint, TemplateNorms, Templates};
use crate::data::timeseries::Timeseries;
use crate::error::FitError;
use crate::fit::options::FitOptions;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Undecided,
    Accepted,
    Rejected,
}

/// Candidate scored during one pass.
#[derive(Clone, Copy, Debug)]
struct Trial {
    score: f64,
    time: i64,
    label: usize,
    index: usize,
}

#[derive(Clone, Debug, Default)]
pub struct KernelOutput {
    /// Accepted candidate positions, ascending
    pub accepted: Vec<usize>,
    pub num_passes: usize,
}

/// Runs the fitting loop on `buffer`, which is modified in place: every
/// accepted event's template is subtracted from it exactly once.
///
/// `times` are buffer-local timepoints (ascending), `labels` the matching
/// cluster labels. Label 0 never takes part. Candidates whose clip
/// `[t - Tmid, t - Tmid + T)` does not fit into the buffer are rejected.
pub fn fit_stage_kernel(
    buffer: &mut Timeseries,
    times: &[i64],
    labels: &[usize],
    templates: &Templates,
    opts: &FitOptions,
) -> Result<KernelOutput, FitError> {
    if times.len() != labels.len() {
        return Err(FitError::InvalidOptions(format!(
            "kernel got {} times but {} labels",
            times.len(),
            labels.len()
        )));
    }
    if templates.num_channels() != buffer.num_channels() {
        return Err(FitError::ChannelMismatch {
            timeseries: buffer.num_channels(),
            templates: templates.num_channels(),
        });
    }
    if templates.clip_size() != opts.clip_size {
        return Err(FitError::InvalidOptions(format!(
            "templates have clip size {}, options say {}",
            templates.clip_size(),
            opts.clip_size
        )));
    }
    check_ascending(times)?;

    let clip_size = opts.clip_size;
    let tmid = template_midpoint(clip_size) as i64;
    let norms = TemplateNorms::new(templates, labels)?;

    let mut decisions: Vec<Decision> = labels
        .iter()
        .map(|&k| if k > 0 { Decision::Undecided } else { Decision::Rejected })
        .collect();

    let mut num_passes = 0;
    loop {
        num_passes += 1;

        let mut trials: Vec<Trial> = Vec::new();
        for (i, decision) in decisions.iter_mut().enumerate() {
            if *decision != Decision::Undecided {
                continue;
            }
            let label = labels[i];
            let window = match buffer.window(times[i] - tmid, clip_size) {
                Some(w) => w,
                None => {
                    *decision = Decision::Rejected;
                    continue;
                }
            };

            let score = compute_score(window, templates.template(label)?);
            let threshold = opts
                .min_improvement_fraction
                .map(|f| norms.min_score(label, f))
                .unwrap_or(0.0);

            if score > 0.0 && score >= threshold {
                trials.push(Trial {
                    score,
                    time: times[i],
                    label,
                    index: i,
                });
            } else {
                *decision = Decision::Rejected;
            }
        }

        let trial_times: Vec<i64> = trials.iter().map(|t| t.time).collect();
        let trial_scores: Vec<f64> = trials.iter().map(|t| t.score).collect();
        let keep = select_events(&trial_times, &trial_scores, clip_size as i64)?;

        let mut num_added = 0;
        for (trial, &kept) in trials.iter().zip(keep.iter()) {
            if !kept {
                continue;
            }
            let template = templates.template(trial.label)?;
            if let Some(window) = buffer.window_mut(trial.time - tmid, clip_size) {
                subtract_template(window, template);
                decisions[trial.index] = Decision::Accepted;
                num_added += 1;
            }
        }

        debug!("pass {}: {} candidates, added {} events", num_passes, trials.len(), num_added);

        if num_added == 0 {
            break;
        }
    }

    let accepted = decisions
        .iter()
        .enumerate()
        .filter_map(|(i, &d)| if d == Decision::Accepted { Some(i) } else { None })
        .collect();

    Ok(KernelOutput {
        accepted,
        num_passes,
    })
}
