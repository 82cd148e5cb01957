//! Batch Fraunhofer diffraction: generate apertures on a complex grid, take
//! their 2D Fourier transform and extract scalar measurements and array dumps
//! from the resulting far-field patterns.

pub mod aperture;
pub mod config;
pub mod grid;
pub mod ops;
pub mod output;
pub mod pipeline;
pub mod tasks;
pub mod transform;
pub mod util;
