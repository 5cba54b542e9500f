//! Amplitude shells: each cluster is cut into sub-clusters of events with
//! similar absolute peak amplitude, so that templates are computed from
//! spikes of comparable size.

use std::collections::BTreeMap;

use itertools::Itertools;

use crate::data::firings::Firings;
use crate::error::FitError;
use crate::fit::options::FitOptions;

#[derive(Clone, Debug, PartialEq)]
pub struct Shell {
    /// Positions into the peak list the shell was defined on, ascending
    pub inds: Vec<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShellOptions {
    pub min_shell_size: usize,
    pub shell_increment: f64,
}

impl From<&FitOptions> for ShellOptions {
    fn from(opts: &FitOptions) -> Self {
        ShellOptions {
            min_shell_size: opts.min_shell_size,
            shell_increment: opts.shell_increment,
        }
    }
}

/// Groups peaks into shells of at least `min_shell_size` members.
///
/// Amplitude bins of width `shell_increment` are walked from low to high
/// absolute amplitude and accumulated until the running shell is large
/// enough. A short remainder at the top is folded into the last shell.
pub fn define_shells(peaks: &[f64], opts: &ShellOptions) -> Result<Vec<Shell>, FitError> {
    if !(opts.shell_increment > 0.0) {
        return Err(FitError::InvalidOptions(format!(
            "shell_increment must be positive, got {}",
            opts.shell_increment
        )));
    }
    if peaks.is_empty() {
        return Ok(Vec::new());
    }

    let abs_peaks = peaks.iter().map(|p| p.abs()).collect_vec();
    let max_abs = abs_peaks.iter().copied().fold(0.0f64, f64::max);
    let num_bins = (max_abs / opts.shell_increment).floor() as usize + 1;

    let mut bins: Vec<Vec<usize>> = vec![Vec::new(); num_bins];
    for (i, &a) in abs_peaks.iter().enumerate() {
        let b = ((a / opts.shell_increment).floor() as usize).min(num_bins - 1);
        bins[b].push(i);
    }

    let min_size = opts.min_shell_size.max(1);
    let mut shells: Vec<Shell> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    for bin in bins {
        current.extend(bin);
        if current.len() >= min_size {
            current.sort_unstable();
            shells.push(Shell {
                inds: std::mem::take(&mut current),
            });
        }
    }

    if !current.is_empty() {
        match shells.last_mut() {
            Some(last) => {
                last.inds.extend(current);
                last.inds.sort_unstable();
            }
            None => {
                current.sort_unstable();
                shells.push(Shell { inds: current });
            }
        }
    }

    Ok(shells)
}

/// Relabels every event so that each shell of each cluster gets its own
/// label. New labels are consecutive from 1, cluster by cluster in label
/// order; label 0 is left alone.
pub fn split_into_shells(firings: &Firings, opts: &ShellOptions) -> Result<Firings, FitError> {
    let labels = firings.labels();

    // only labels that occur, ascending
    let mut by_label: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (j, &k) in labels.iter().enumerate() {
        if k > 0 {
            by_label.entry(k).or_default().push(j);
        }
    }

    let mut new_labels = vec![0usize; labels.len()];
    let mut next_label = 1;
    for inds_k in by_label.values() {
        let peaks = inds_k.iter().map(|&j| firings.peak(j)).collect_vec();
        for shell in define_shells(&peaks, opts)? {
            for &s in &shell.inds {
                new_labels[inds_k[s]] = next_label;
            }
            next_label += 1;
        }
    }

    firings.with_labels(&new_labels)
}
