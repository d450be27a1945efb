//! Rolling voxel map of accumulated landmarks.

pub mod rolling_grid;
pub mod voxel_filter;

pub use rolling_grid::RollingGrid;
pub use voxel_filter::downsample;
