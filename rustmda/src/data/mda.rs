use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use sscore::data::firings::Firings;
use sscore::data::templates::Templates;
use sscore::data::timeseries::Timeseries;

use crate::data::header::{read_values, write_values, MdaDataType, MdaHeader};
use crate::error::MdaError;

/// Whole `.mda` array held in memory as f64, column-major.
#[derive(Clone, Debug, PartialEq)]
pub struct Mda {
    dims: Vec<usize>,
    data: Vec<f64>,
}

impl Mda {
    pub fn new(dims: Vec<usize>, data: Vec<f64>) -> Result<Self, MdaError> {
        let expected: usize = dims.iter().product();
        if dims.is_empty() || expected != data.len() {
            return Err(MdaError::ShapeMismatch(format!(
                "{} values for dims {:?}",
                data.len(),
                dims
            )));
        }
        Ok(Mda { dims, data })
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, MdaError> {
        let mut reader = BufReader::new(File::open(path)?);
        let header = MdaHeader::read_from(&mut reader)?;
        let data = read_values(&mut reader, header.data_type, header.num_entries())?;
        Ok(Mda {
            dims: header.dims,
            data,
        })
    }

    pub fn write64<P: AsRef<Path>>(&self, path: P) -> Result<(), MdaError> {
        self.write_as(path, MdaDataType::Float64)
    }

    pub fn write32<P: AsRef<Path>>(&self, path: P) -> Result<(), MdaError> {
        self.write_as(path, MdaDataType::Float32)
    }

    fn write_as<P: AsRef<Path>>(&self, path: P, data_type: MdaDataType) -> Result<(), MdaError> {
        let mut writer = BufWriter::new(File::create(path)?);
        MdaHeader::new(data_type, self.dims.clone()).write_to(&mut writer)?;
        write_values(&mut writer, data_type, &self.data)?;
        writer.flush()?;
        Ok(())
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn n1(&self) -> usize {
        self.dims.first().copied().unwrap_or(1)
    }

    pub fn n2(&self) -> usize {
        self.dims.get(1).copied().unwrap_or(1)
    }

    #[inline]
    pub fn value(&self, i: usize, j: usize) -> f64 {
        self.data[i + self.n1() * j]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Collapses every dimension past the second into it.
    fn matrix_shape(&self) -> (usize, usize) {
        let n2 = self.dims.iter().skip(1).product();
        (self.n1(), n2)
    }

    /// M x N recording, first dimension channels.
    pub fn into_timeseries(self) -> Result<Timeseries, MdaError> {
        let (m, n) = self.matrix_shape();
        Ok(Timeseries::new(m, n, self.data)?)
    }

    /// R x L event table, first dimension fields.
    pub fn into_firings(self) -> Result<Firings, MdaError> {
        let (r, l) = self.matrix_shape();
        Ok(Firings::new(r, l, self.data)?)
    }

    pub fn from_firings(firings: &Firings) -> Self {
        Mda {
            dims: vec![firings.num_rows(), firings.len()],
            data: firings.as_slice().to_vec(),
        }
    }

    /// M x T x K tensor in the same layout the fitting kernel uses.
    pub fn from_templates(templates: &Templates) -> Self {
        Mda {
            dims: vec![templates.num_channels(), templates.clip_size(), templates.num_clusters()],
            data: templates.as_slice().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sscore::data::firings::Event;
    use tempfile::tempdir;

    #[test]
    fn test_write64_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ts.mda");
        let mda = Mda::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, -6.25]).unwrap();
        mda.write64(&path).unwrap();

        let back = Mda::read(&path).unwrap();
        assert_eq!(back, mda);
        assert_eq!(back.value(1, 2), -6.25);
        assert_eq!(back.n1(), 2);
        assert_eq!(back.n2(), 3);
    }

    #[test]
    fn test_write32_is_float32_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ts32.mda");
        let mda = Mda::new(vec![1, 4], vec![0.5, 1.5, -2.0, 8.0]).unwrap();
        mda.write32(&path).unwrap();

        // 12 header bytes + 2 dims + 4 f32 values
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 12 + 8 + 16);
        assert_eq!(Mda::read(&path).unwrap(), mda);
    }

    #[test]
    fn test_new_rejects_wrong_shape() {
        assert!(matches!(
            Mda::new(vec![2, 2], vec![0.0; 3]),
            Err(MdaError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_firings_through_file_keep_extra_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("firings.mda");
        let data = vec![1.0, 10.0, 2.0, -4.0, 7.0, 3.0, 25.0, 1.0, -9.0, 8.0];
        let firings = Firings::new(5, 2, data).unwrap();
        Mda::from_firings(&firings).write64(&path).unwrap();

        let back = Mda::read(&path).unwrap().into_firings().unwrap();
        assert_eq!(back, firings);
        assert_eq!(back.value(4, 1), 8.0);
    }

    #[test]
    fn test_two_row_table_is_not_firings() {
        let mda = Mda::new(vec![2, 1], vec![1.0, 5.0]).unwrap();
        assert!(matches!(mda.into_firings(), Err(MdaError::Fit(_))));
    }

    #[test]
    fn test_templates_layout_matches_kernel() {
        let mut templates = Templates::zeros(2, 3, 2);
        templates.set_value(1, 2, 2, 4.0);
        let mda = Mda::from_templates(&templates);
        assert_eq!(mda.dims(), &[2, 3, 2]);
        // channel 1, timepoint 2, cluster 2 (index 1)
        assert_eq!(mda.as_slice()[1 + 2 * 2 + 2 * 3], 4.0);
    }

    #[test]
    fn test_timeseries_from_mda() {
        let mda = Mda::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let ts = mda.into_timeseries().unwrap();
        assert_eq!(ts.value(1, 0), 2.0);
        assert_eq!(ts.value(0, 1), 3.0);
    }

    #[test]
    fn test_event_round_trip_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.mda");
        let firings = Firings::from_events(&[Event {
            channel: 3.0,
            time: 120.0,
            label: 2,
            peak: -11.5,
        }]);
        Mda::from_firings(&firings).write32(&path).unwrap();
        let back = Mda::read(&path).unwrap().into_firings().unwrap();
        assert_eq!(back.event(0).label, 2);
        assert_eq!(back.peak(0), -11.5);
    }
}
