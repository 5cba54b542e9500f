use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::FitError;

pub const CHANNEL_ROW: usize = 0;
pub const TIME_ROW: usize = 1;
pub const LABEL_ROW: usize = 2;
pub const PEAK_ROW: usize = 3;

/// Minimal number of rows a firings table must carry (channel, time, label).
pub const MIN_FIRINGS_ROWS: usize = 3;

/// One detected candidate spike.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub channel: f64,
    pub time: f64,
    pub label: usize,
    pub peak: f64,
}

/// Dense event table, one column per event, one row per field.
///
/// Rows beyond the four known fields are carried along untouched so that a
/// filtered table written back to disk keeps everything upstream stages put in.
#[derive(Clone, Debug, PartialEq)]
pub struct Firings {
    num_rows: usize,
    num_events: usize,
    data: Vec<f64>,
}

impl Firings {
    pub fn new(num_rows: usize, num_events: usize, data: Vec<f64>) -> Result<Self, FitError> {
        if num_rows < MIN_FIRINGS_ROWS {
            return Err(FitError::InvalidOptions(format!(
                "firings need at least {} rows, got {}",
                MIN_FIRINGS_ROWS, num_rows
            )));
        }
        if data.len() != num_rows * num_events {
            return Err(FitError::InvalidOptions(format!(
                "firings buffer holds {} values, expected {} x {}",
                data.len(),
                num_rows,
                num_events
            )));
        }
        Ok(Firings {
            num_rows,
            num_events,
            data,
        })
    }

    pub fn from_events(events: &[Event]) -> Self {
        let data = events
            .iter()
            .flat_map(|e| [e.channel, e.time, e.label as f64, e.peak])
            .collect();
        Firings {
            num_rows: 4,
            num_events: events.len(),
            data,
        }
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.num_events
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_events == 0
    }

    #[inline]
    pub fn value(&self, row: usize, i: usize) -> f64 {
        self.data[i * self.num_rows + row]
    }

    #[inline]
    pub fn time(&self, i: usize) -> f64 {
        self.value(TIME_ROW, i)
    }

    /// Event time rounded half-up to a timepoint index.
    #[inline]
    pub fn time_index(&self, i: usize) -> i64 {
        (self.time(i) + 0.5).floor() as i64
    }

    /// Cluster label; negative or fractional values truncate towards 0.
    #[inline]
    pub fn label(&self, i: usize) -> usize {
        let v = self.value(LABEL_ROW, i);
        if v > 0.0 {
            v as usize
        } else {
            0
        }
    }

    #[inline]
    pub fn peak(&self, i: usize) -> f64 {
        if self.num_rows > PEAK_ROW {
            self.value(PEAK_ROW, i)
        } else {
            0.0
        }
    }

    pub fn event(&self, i: usize) -> Event {
        Event {
            channel: self.value(CHANNEL_ROW, i),
            time: self.time(i),
            label: self.label(i),
            peak: self.peak(i),
        }
    }

    pub fn column(&self, i: usize) -> &[f64] {
        &self.data[i * self.num_rows..(i + 1) * self.num_rows]
    }

    pub fn time_indices(&self) -> Vec<i64> {
        (0..self.num_events).map(|i| self.time_index(i)).collect()
    }

    pub fn labels(&self) -> Vec<usize> {
        (0..self.num_events).map(|i| self.label(i)).collect()
    }

    pub fn max_label(&self) -> usize {
        (0..self.num_events).map(|i| self.label(i)).max().unwrap_or(0)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Stable reorder of all columns by ascending event time.
    pub fn sort_by_time(&self) -> Firings {
        let order = (0..self.num_events)
            .sorted_by_key(|&i| OrderedFloat(self.time(i)))
            .collect_vec();
        self.select(&order)
    }

    pub fn is_sorted_by_time(&self) -> bool {
        (1..self.num_events).all(|i| self.time(i - 1) <= self.time(i))
    }

    /// Copy with the label row replaced.
    pub fn with_labels(&self, labels: &[usize]) -> Result<Firings, FitError> {
        if labels.len() != self.num_events {
            return Err(FitError::InvalidOptions(format!(
                "got {} labels for {} events",
                labels.len(),
                self.num_events
            )));
        }
        let mut out = self.clone();
        for (i, &k) in labels.iter().enumerate() {
            out.data[i * self.num_rows + LABEL_ROW] = k as f64;
        }
        Ok(out)
    }

    /// Copy restricted to `indices`, in that order, keeping every row.
    pub fn select(&self, indices: &[usize]) -> Firings {
        let mut data = Vec::with_capacity(indices.len() * self.num_rows);
        for &i in indices {
            data.extend_from_slice(self.column(i));
        }
        Firings {
            num_rows: self.num_rows,
            num_events: indices.len(),
            data,
        }
    }
}
