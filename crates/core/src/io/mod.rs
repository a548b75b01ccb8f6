//! I/O operations for reading and writing georeferenced rasters

mod native;

pub use native::{
    read_geotiff, read_geotiff_from_buffer, write_class_geotiff, write_class_geotiff_to_buffer,
    write_geotiff,
};
