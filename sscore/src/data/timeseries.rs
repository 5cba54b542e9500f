use std::ops::Range;

use crate::error::FitError;

/// Anything that can serve rectangular blocks of a multichannel recording.
///
/// Blocks are returned column-major: the `channels.len()` samples of one
/// timepoint are contiguous, timepoints follow each other. Requests must lie
/// within `[0, num_timepoints())`; padding beyond the series edges is the
/// caller's job (see [`read_padded`]).
pub trait TimeseriesSource: Sync {
    fn num_channels(&self) -> usize;
    fn num_timepoints(&self) -> usize;
    fn read_chunk(&self, channels: Range<usize>, t0: usize, len: usize) -> Result<Vec<f64>, FitError>;
}

/// Dense M x N buffer, column-major per timepoint.
#[derive(Clone, Debug, PartialEq)]
pub struct Timeseries {
    num_channels: usize,
    num_timepoints: usize,
    data: Vec<f64>,
}

impl Timeseries {
    pub fn new(num_channels: usize, num_timepoints: usize, data: Vec<f64>) -> Result<Self, FitError> {
        if data.len() != num_channels * num_timepoints {
            return Err(FitError::InvalidOptions(format!(
                "timeseries buffer holds {} values, expected {} x {}",
                data.len(),
                num_channels,
                num_timepoints
            )));
        }
        Ok(Timeseries {
            num_channels,
            num_timepoints,
            data,
        })
    }

    pub fn zeros(num_channels: usize, num_timepoints: usize) -> Self {
        Timeseries {
            num_channels,
            num_timepoints,
            data: vec![0.0; num_channels * num_timepoints],
        }
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    #[inline]
    pub fn num_timepoints(&self) -> usize {
        self.num_timepoints
    }

    #[inline]
    pub fn value(&self, channel: usize, t: usize) -> f64 {
        self.data[t * self.num_channels + channel]
    }

    #[inline]
    pub fn set_value(&mut self, channel: usize, t: usize, value: f64) {
        self.data[t * self.num_channels + channel] = value;
    }

    /// Flattened view of `len` timepoints starting at `t0`, or `None` if the
    /// window leaves the buffer.
    #[inline]
    pub fn window(&self, t0: i64, len: usize) -> Option<&[f64]> {
        let range = self.window_range(t0, len)?;
        Some(&self.data[range])
    }

    #[inline]
    pub fn window_mut(&mut self, t0: i64, len: usize) -> Option<&mut [f64]> {
        let range = self.window_range(t0, len)?;
        Some(&mut self.data[range])
    }

    /// True when `[t0, t0 + len)` lies inside the buffer.
    #[inline]
    pub fn contains_window(&self, t0: i64, len: usize) -> bool {
        self.window_range(t0, len).is_some()
    }

    fn window_range(&self, t0: i64, len: usize) -> Option<Range<usize>> {
        if t0 < 0 {
            return None;
        }
        let t0 = t0 as usize;
        let end = t0.checked_add(len)?;
        if end > self.num_timepoints {
            return None;
        }
        Some(t0 * self.num_channels..end * self.num_channels)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Sum of squares over the whole buffer.
    pub fn energy(&self) -> f64 {
        self.data.iter().map(|v| v * v).sum()
    }
}

impl TimeseriesSource for Timeseries {
    fn num_channels(&self) -> usize {
        self.num_channels
    }

    fn num_timepoints(&self) -> usize {
        self.num_timepoints
    }

    fn read_chunk(&self, channels: Range<usize>, t0: usize, len: usize) -> Result<Vec<f64>, FitError> {
        let end = t0.saturating_add(len);
        if end > self.num_timepoints || channels.end > self.num_channels {
            return Err(FitError::ReadOutOfBounds {
                start: t0,
                end,
                len: self.num_timepoints,
            });
        }

        let mut out = Vec::with_capacity(channels.len() * len);
        for t in t0..end {
            let base = t * self.num_channels;
            out.extend_from_slice(&self.data[base + channels.start..base + channels.end]);
        }
        Ok(out)
    }
}

/// Read `len` timepoints starting at `start` (possibly negative) from `source`,
/// zero-filling every timepoint that falls outside the series. Only the
/// in-bounds part is requested from the source.
pub fn read_padded<S: TimeseriesSource + ?Sized>(source: &S, start: i64, len: usize) -> Result<Timeseries, FitError> {
    let m = source.num_channels();
    let n = source.num_timepoints() as i64;
    let mut chunk = Timeseries::zeros(m, len);

    let lo = start.max(0);
    let hi = (start + len as i64).min(n);
    if lo < hi {
        let block = source.read_chunk(0..m, lo as usize, (hi - lo) as usize)?;
        let offset = ((lo - start) as usize) * m;
        chunk.data[offset..offset + block.len()].copy_from_slice(&block);
    }

    Ok(chunk)
}
