// src/lib.rs
pub mod data {
    pub mod header;
    pub mod mda;
    pub mod disk_read;
}

pub mod config;
pub mod error;

pub use data::disk_read::DiskReadMda;
pub use data::mda::Mda;
pub use error::MdaError;
