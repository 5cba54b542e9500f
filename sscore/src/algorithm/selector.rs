//! Non-max suppression over time-ordered scored candidates.
//!
//! A single left-to-right sweep keeps a trailing "current best" candidate.
//! Each new candidate is compared with the best one still within `window`
//! timepoints; when the sweep has moved more than `window` past the best, the
//! candidates in between are rescanned to find the best one still in reach.
//! Kept candidates end up strictly more than `window` apart, and among any run
//! of mutually conflicting candidates the highest score wins (earliest on ties).

use crate::error::FitError;

/// Sweep state: either nothing to compare against yet, or the index and score
/// of the candidate currently blocking its window.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Best {
    Empty,
    Active { index: usize, score: f64 },
}

impl Best {
    #[inline]
    fn score(&self) -> f64 {
        match *self {
            Best::Empty => 0.0,
            Best::Active { score, .. } => score,
        }
    }
}

/// Marks which candidates survive non-max suppression.
///
/// `times` must be ascending. Candidates with a non-positive score are never
/// kept and never block others.
pub fn select_events(times: &[i64], scores: &[f64], window: i64) -> Result<Vec<bool>, FitError> {
    if times.len() != scores.len() {
        return Err(FitError::InvalidOptions(format!(
            "selector got {} times but {} scores",
            times.len(),
            scores.len()
        )));
    }
    check_ascending(times)?;

    let mut keep = vec![false; times.len()];
    let mut best = Best::Empty;

    for i in 0..times.len() {
        let score = scores[i];
        if !(score > 0.0) {
            continue;
        }

        let horizon = times[i] - window;
        if let Best::Active { index, .. } = best {
            if times[index] < horizon {
                best = rescan(times, scores, &mut keep, index + 1, i, horizon);
            }
        }

        if score > best.score() {
            if let Best::Active { index, .. } = best {
                keep[index] = false;
            }
            keep[i] = true;
            best = Best::Active { index: i, score };
        }
    }

    Ok(keep)
}

/// Finds the highest scoring candidate in `[from, to)` that is still at or
/// after `horizon`, and clears the keep mark of every other candidate there.
fn rescan(times: &[i64], scores: &[f64], keep: &mut [bool], from: usize, to: usize, horizon: i64) -> Best {
    let mut best = Best::Empty;
    for j in from..to {
        if times[j] < horizon || !(scores[j] > 0.0) {
            continue;
        }
        if scores[j] > best.score() {
            best = Best::Active {
                index: j,
                score: scores[j],
            };
        }
    }

    if let Best::Active { index, .. } = best {
        for j in from..to {
            if j != index && times[j] >= horizon {
                keep[j] = false;
            }
        }
    }

    best
}

/// Positions kept by [`select_events`].
pub fn selected_indices(times: &[i64], scores: &[f64], window: i64) -> Result<Vec<usize>, FitError> {
    let keep = select_events(times, scores, window)?;
    Ok(keep
        .iter()
        .enumerate()
        .filter_map(|(i, &k)| if k { Some(i) } else { None })
        .collect())
}

pub(crate) fn check_ascending(times: &[i64]) -> Result<(), FitError> {
    for (i, w) in times.windows(2).enumerate() {
        if w[1] < w[0] {
            return Err(FitError::UnsortedTimes {
                index: i + 1,
                previous: w[0],
                current: w[1],
            });
        }
    }
    Ok(())
}
