use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sscore::data::timeseries::TimeseriesSource;
use sscore::FitError;

use crate::data::header::{read_values, MdaHeader};
use crate::error::MdaError;

/// 2-D `.mda` recording read lazily from disk.
///
/// Only the header is read on open; blocks of timepoints are fetched on
/// demand. Workers share one file handle, so reads are serialised.
#[derive(Debug)]
pub struct DiskReadMda {
    path: PathBuf,
    header: MdaHeader,
    reader: Mutex<BufReader<File>>,
}

impl DiskReadMda {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MdaError> {
        let path = path.as_ref().to_path_buf();
        let mut reader = BufReader::new(File::open(&path)?);
        let header = MdaHeader::read_from(&mut reader)?;
        if header.dims.len() > 2 && header.dims[2..].iter().any(|&d| d != 1) {
            return Err(MdaError::ShapeMismatch(format!(
                "expected a 2-D recording, got dims {:?}",
                header.dims
            )));
        }
        Ok(DiskReadMda {
            path,
            header,
            reader: Mutex::new(reader),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &MdaHeader {
        &self.header
    }

    fn read_block(&self, channels: Range<usize>, t0: usize, len: usize) -> Result<Vec<f64>, MdaError> {
        let m = self.header.dim(0);
        let bpe = self.header.data_type.bytes_per_entry();
        let offset = self.header.header_size() + t0 * m * bpe;

        let raw = {
            let mut reader = match self.reader.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            reader.seek(SeekFrom::Start(offset as u64))?;
            read_values(&mut *reader, self.header.data_type, len * m)?
        };

        if channels == (0..m) {
            return Ok(raw);
        }
        let mut out = Vec::with_capacity(channels.len() * len);
        for column in raw.chunks_exact(m) {
            out.extend_from_slice(&column[channels.clone()]);
        }
        Ok(out)
    }
}

impl TimeseriesSource for DiskReadMda {
    fn num_channels(&self) -> usize {
        self.header.dim(0)
    }

    fn num_timepoints(&self) -> usize {
        self.header.dim(1)
    }

    fn read_chunk(&self, channels: Range<usize>, t0: usize, len: usize) -> Result<Vec<f64>, FitError> {
        let n = self.num_timepoints();
        let m = self.num_channels();
        let end = t0.saturating_add(len);
        if end > n || channels.end > m || channels.start > channels.end {
            return Err(FitError::ReadOutOfBounds {
                start: t0,
                end,
                len: n,
            });
        }
        Ok(self.read_block(channels, t0, len)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::mda::Mda;
    use sscore::data::timeseries::read_padded;
    use tempfile::tempdir;

    fn ramp_file(dir: &Path, m: usize, n: usize, wide: bool) -> PathBuf {
        let path = dir.join("ramp.mda");
        let mda = Mda::new(vec![m, n], (0..m * n).map(|i| i as f64).collect()).unwrap();
        if wide {
            mda.write64(&path).unwrap();
        } else {
            mda.write32(&path).unwrap();
        }
        path
    }

    #[test]
    fn test_reads_match_in_memory() {
        let dir = tempdir().unwrap();
        let path = ramp_file(dir.path(), 3, 50, true);
        let disk = DiskReadMda::open(&path).unwrap();
        let memory = Mda::read(&path).unwrap().into_timeseries().unwrap();

        assert_eq!(disk.num_channels(), 3);
        assert_eq!(disk.num_timepoints(), 50);
        assert_eq!(
            disk.read_chunk(0..3, 7, 11).unwrap(),
            memory.read_chunk(0..3, 7, 11).unwrap()
        );
        assert_eq!(
            disk.read_chunk(1..2, 40, 10).unwrap(),
            memory.read_chunk(1..2, 40, 10).unwrap()
        );
    }

    #[test]
    fn test_float32_file() {
        let dir = tempdir().unwrap();
        let path = ramp_file(dir.path(), 2, 10, false);
        let disk = DiskReadMda::open(&path).unwrap();
        assert_eq!(disk.read_chunk(0..2, 4, 2).unwrap(), vec![8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_out_of_bounds_read() {
        let dir = tempdir().unwrap();
        let path = ramp_file(dir.path(), 2, 10, true);
        let disk = DiskReadMda::open(&path).unwrap();
        assert!(matches!(
            disk.read_chunk(0..2, 8, 5),
            Err(FitError::ReadOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_huge_read_request_is_out_of_bounds() {
        let dir = tempdir().unwrap();
        let path = ramp_file(dir.path(), 2, 10, true);
        let disk = DiskReadMda::open(&path).unwrap();
        assert!(matches!(
            disk.read_chunk(0..2, 3, usize::MAX),
            Err(FitError::ReadOutOfBounds { start: 3, .. })
        ));
    }

    #[test]
    fn test_padded_read_through_disk() {
        let dir = tempdir().unwrap();
        let path = ramp_file(dir.path(), 1, 5, true);
        let disk = DiskReadMda::open(&path).unwrap();
        let chunk = read_padded(&disk, -2, 9).unwrap();
        assert_eq!(chunk.as_slice(), &[0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 0.0, 0.0]);
    }

    #[test]
    fn test_three_dimensional_file_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cube.mda");
        Mda::new(vec![2, 2, 2], vec![0.0; 8]).unwrap().write64(&path).unwrap();
        assert!(matches!(DiskReadMda::open(&path), Err(MdaError::ShapeMismatch(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            DiskReadMda::open(dir.path().join("nope.mda")),
            Err(MdaError::Io(_))
        ));
    }
}
