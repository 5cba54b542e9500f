use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use sscore::FitOptions;

use crate::error::MdaError;

/// Loads fit options from a JSON file. Missing keys keep their defaults.
pub fn read_config<P: AsRef<Path>>(path: P) -> Result<FitOptions, MdaError> {
    let reader = BufReader::new(File::open(path)?);
    let opts: FitOptions = serde_json::from_reader(reader)?;
    Ok(opts)
}

pub fn write_config<P: AsRef<Path>>(path: P, opts: &FitOptions) -> Result<(), MdaError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, opts)?;
    writer.flush()?;
    Ok(())
}
