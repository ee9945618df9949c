pub mod camera_model;
pub mod config;
pub mod dem;
pub mod error;
pub mod grid;
pub mod interp;
pub mod intersect;
pub mod io;
pub mod mapper;
pub mod ortho;
pub mod pose;
pub mod raster;
pub mod remap;

pub use error::{Error, Result};
