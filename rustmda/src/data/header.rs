use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::MdaError;

/// Upper bound on the number of dimensions accepted in a header.
const MAX_DIMS: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MdaDataType {
    Byte,
    Float32,
    Int16,
    Int32,
    Uint16,
    Float64,
    Uint32,
}

impl MdaDataType {
    pub fn from_code(code: i32) -> Result<Self, MdaError> {
        match code {
            -2 => Ok(MdaDataType::Byte),
            -3 => Ok(MdaDataType::Float32),
            -4 => Ok(MdaDataType::Int16),
            -5 => Ok(MdaDataType::Int32),
            -6 => Ok(MdaDataType::Uint16),
            -7 => Ok(MdaDataType::Float64),
            -8 => Ok(MdaDataType::Uint32),
            other => Err(MdaError::UnsupportedDataType(other)),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            MdaDataType::Byte => -2,
            MdaDataType::Float32 => -3,
            MdaDataType::Int16 => -4,
            MdaDataType::Int32 => -5,
            MdaDataType::Uint16 => -6,
            MdaDataType::Float64 => -7,
            MdaDataType::Uint32 => -8,
        }
    }

    pub fn bytes_per_entry(&self) -> usize {
        match self {
            MdaDataType::Byte => 1,
            MdaDataType::Int16 | MdaDataType::Uint16 => 2,
            MdaDataType::Float32 | MdaDataType::Int32 | MdaDataType::Uint32 => 4,
            MdaDataType::Float64 => 8,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MdaHeader {
    pub data_type: MdaDataType,
    pub dims: Vec<usize>,
    /// Dims stored as 64-bit integers (negative dim count on disk)
    pub wide_dims: bool,
}

impl MdaHeader {
    pub fn new(data_type: MdaDataType, dims: Vec<usize>) -> Self {
        let wide_dims = dims.iter().any(|&d| d > i32::MAX as usize);
        MdaHeader {
            data_type,
            dims,
            wide_dims,
        }
    }

    /// Bytes from the start of the file to the first data entry.
    pub fn header_size(&self) -> usize {
        let dim_bytes = if self.wide_dims { 8 } else { 4 };
        12 + dim_bytes * self.dims.len()
    }

    pub fn num_entries(&self) -> usize {
        self.dims.iter().product()
    }

    /// Size of dimension `i`, 1 for trailing dimensions not stored.
    pub fn dim(&self, i: usize) -> usize {
        self.dims.get(i).copied().unwrap_or(1)
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, MdaError> {
        let code = reader.read_i32::<LittleEndian>()?;
        let data_type = MdaDataType::from_code(code)?;

        let num_bytes = reader.read_i32::<LittleEndian>()?;
        if num_bytes as usize != data_type.bytes_per_entry() {
            return Err(MdaError::InvalidHeader(format!(
                "{} bytes per entry for data type {:?}",
                num_bytes, data_type
            )));
        }

        let num_dims = reader.read_i32::<LittleEndian>()?;
        let wide_dims = num_dims < 0;
        let num_dims = num_dims.unsigned_abs() as usize;
        if num_dims == 0 || num_dims > MAX_DIMS {
            return Err(MdaError::InvalidHeader(format!("{} dimensions", num_dims)));
        }

        let mut dims = Vec::with_capacity(num_dims);
        for _ in 0..num_dims {
            let d = if wide_dims {
                reader.read_i64::<LittleEndian>()?
            } else {
                reader.read_i32::<LittleEndian>()? as i64
            };
            if d < 0 {
                return Err(MdaError::InvalidHeader(format!("negative dimension {}", d)));
            }
            dims.push(d as usize);
        }

        Ok(MdaHeader {
            data_type,
            dims,
            wide_dims,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), MdaError> {
        writer.write_i32::<LittleEndian>(self.data_type.code())?;
        writer.write_i32::<LittleEndian>(self.data_type.bytes_per_entry() as i32)?;
        let num_dims = self.dims.len() as i32;
        if self.wide_dims {
            writer.write_i32::<LittleEndian>(-num_dims)?;
            for &d in &self.dims {
                writer.write_i64::<LittleEndian>(d as i64)?;
            }
        } else {
            writer.write_i32::<LittleEndian>(num_dims)?;
            for &d in &self.dims {
                writer.write_i32::<LittleEndian>(d as i32)?;
            }
        }
        Ok(())
    }
}

/// Reads `count` entries of `data_type` and widens them to f64.
pub fn read_values<R: Read>(reader: &mut R, data_type: MdaDataType, count: usize) -> Result<Vec<f64>, MdaError> {
    let values = match data_type {
        MdaDataType::Byte => {
            let mut buf = vec![0u8; count];
            reader.read_exact(&mut buf)?;
            buf.into_iter().map(f64::from).collect()
        }
        MdaDataType::Float32 => {
            let mut buf = vec![0f32; count];
            reader.read_f32_into::<LittleEndian>(&mut buf)?;
            buf.into_iter().map(f64::from).collect()
        }
        MdaDataType::Int16 => {
            let mut buf = vec![0i16; count];
            reader.read_i16_into::<LittleEndian>(&mut buf)?;
            buf.into_iter().map(f64::from).collect()
        }
        MdaDataType::Int32 => {
            let mut buf = vec![0i32; count];
            reader.read_i32_into::<LittleEndian>(&mut buf)?;
            buf.into_iter().map(f64::from).collect()
        }
        MdaDataType::Uint16 => {
            let mut buf = vec![0u16; count];
            reader.read_u16_into::<LittleEndian>(&mut buf)?;
            buf.into_iter().map(f64::from).collect()
        }
        MdaDataType::Float64 => {
            let mut buf = vec![0f64; count];
            reader.read_f64_into::<LittleEndian>(&mut buf)?;
            buf
        }
        MdaDataType::Uint32 => {
            let mut buf = vec![0u32; count];
            reader.read_u32_into::<LittleEndian>(&mut buf)?;
            buf.into_iter().map(f64::from).collect()
        }
    };
    Ok(values)
}

/// Writes `values` narrowed to `data_type` (float types only).
pub fn write_values<W: Write>(writer: &mut W, data_type: MdaDataType, values: &[f64]) -> Result<(), MdaError> {
    match data_type {
        MdaDataType::Float64 => {
            for &v in values {
                writer.write_f64::<LittleEndian>(v)?;
            }
        }
        MdaDataType::Float32 => {
            for &v in values {
                writer.write_f32::<LittleEndian>(v as f32)?;
            }
        }
        other => return Err(MdaError::UnsupportedDataType(other.code())),
    }
    Ok(())
}
