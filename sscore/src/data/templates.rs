use crate::error::FitError;

/// Index of the template peak inside a clip of length `clip_size`.
#[inline]
pub fn template_midpoint(clip_size: usize) -> usize {
    (clip_size + 1) / 2 - 1
}

/// M x T x K template tensor. Template `k` (labels are 1-based) is stored as
/// one contiguous M*T block laid out like a timeseries window, so it can be
/// compared element-wise with [`crate::data::timeseries::Timeseries::window`].
#[derive(Clone, Debug, PartialEq)]
pub struct Templates {
    num_channels: usize,
    clip_size: usize,
    num_clusters: usize,
    data: Vec<f64>,
}

impl Templates {
    pub fn new(num_channels: usize, clip_size: usize, num_clusters: usize, data: Vec<f64>) -> Result<Self, FitError> {
        if data.len() != num_channels * clip_size * num_clusters {
            return Err(FitError::InvalidOptions(format!(
                "template buffer holds {} values, expected {} x {} x {}",
                data.len(),
                num_channels,
                clip_size,
                num_clusters
            )));
        }
        Ok(Templates {
            num_channels,
            clip_size,
            num_clusters,
            data,
        })
    }

    pub fn zeros(num_channels: usize, clip_size: usize, num_clusters: usize) -> Self {
        Templates {
            num_channels,
            clip_size,
            num_clusters,
            data: vec![0.0; num_channels * clip_size * num_clusters],
        }
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    #[inline]
    pub fn clip_size(&self) -> usize {
        self.clip_size
    }

    #[inline]
    pub fn num_clusters(&self) -> usize {
        self.num_clusters
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    fn block_len(&self) -> usize {
        self.num_channels * self.clip_size
    }

    /// Waveform of cluster `label` (1-based), `None` for label 0 or labels
    /// above K.
    pub fn get(&self, label: usize) -> Option<&[f64]> {
        if label == 0 || label > self.num_clusters {
            return None;
        }
        let n = self.block_len();
        Some(&self.data[(label - 1) * n..label * n])
    }

    pub fn get_mut(&mut self, label: usize) -> Option<&mut [f64]> {
        if label == 0 || label > self.num_clusters {
            return None;
        }
        let n = self.block_len();
        Some(&mut self.data[(label - 1) * n..label * n])
    }

    pub fn template(&self, label: usize) -> Result<&[f64], FitError> {
        self.get(label).ok_or(FitError::LabelOutOfRange {
            label,
            num_templates: self.num_clusters,
        })
    }

    #[inline]
    pub fn set_value(&mut self, channel: usize, t: usize, label: usize, value: f64) {
        let n = self.block_len();
        self.data[(label - 1) * n + t * self.num_channels + channel] = value;
    }

    #[inline]
    pub fn value(&self, channel: usize, t: usize, label: usize) -> f64 {
        let n = self.block_len();
        self.data[(label - 1) * n + t * self.num_channels + channel]
    }
}

/// Euclidean norm of each template referenced by a candidate set, indexed by
/// label. Slot 0 (the unclassified label) is always 0.
#[derive(Clone, Debug)]
pub struct TemplateNorms {
    norms: Vec<f64>,
}

impl TemplateNorms {
    pub fn new(templates: &Templates, labels: &[usize]) -> Result<Self, FitError> {
        let max_label = labels.iter().copied().max().unwrap_or(0);
        if max_label > templates.num_clusters() {
            return Err(FitError::LabelOutOfRange {
                label: max_label,
                num_templates: templates.num_clusters(),
            });
        }
        let mut norms = vec![0.0; max_label + 1];
        let mut present = vec![false; max_label + 1];
        for &k in labels {
            present[k] = true;
        }

        for k in 1..=max_label {
            if present[k] {
                let t = templates.template(k)?;
                norms[k] = t.iter().map(|v| v * v).sum::<f64>().sqrt();
            }
        }

        Ok(TemplateNorms { norms })
    }

    #[inline]
    pub fn norm(&self, label: usize) -> f64 {
        self.norms.get(label).copied().unwrap_or(0.0)
    }

    /// Smallest acceptable score for `label` when a fraction of the template
    /// energy is required.
    #[inline]
    pub fn min_score(&self, label: usize, fraction: f64) -> f64 {
        let n = self.norm(label);
        fraction * n * n
    }
}
