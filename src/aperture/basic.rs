use super::{check_params, ApertureError, GeneratorContext};
use crate::grid::ComplexGrid;
use ndarray::prelude::*;
use ndarray::par_azip;
use ndrustfft::Complex;



// Transmission 1 inside the circle x^2+y^2 <= r^2, boundary included.
pub fn circular(
    grid: &mut ComplexGrid,
    xs: ArrayView1<f64>,
    ys: ArrayView1<f64>,
    params: &[f64],
    _ctx: &mut GeneratorContext
) -> Result<(), ApertureError> {
    check_params("circular", params, 1)?;

    let rsq_max = params[0]*params[0];

    par_azip!((index (i, j), v in grid.view_mut()) {
        let rsq = xs[j]*xs[j]+ys[i]*ys[i];
        *v = Complex::new(if rsq <= rsq_max { 1. } else { 0. }, 0.);
    });

    Ok(())
}

// An ax by ay rectangle centred on the origin.
pub fn rectangle(
    grid: &mut ComplexGrid,
    xs: ArrayView1<f64>,
    ys: ArrayView1<f64>,
    params: &[f64],
    _ctx: &mut GeneratorContext
) -> Result<(), ApertureError> {
    check_params("rectangle", params, 2)?;

    let (half_x, half_y) = (params[0]/2., params[1]/2.);

    par_azip!((index (i, j), v in grid.view_mut()) {
        let inside = xs[j].abs() <= half_x && ys[i].abs() <= half_y;
        *v = Complex::new(if inside { 1. } else { 0. }, 0.);
    });

    Ok(())
}

// Circular aperture of radius params[0] with a Gaussian illumination of width
// params[1].
pub fn gaussian(
    grid: &mut ComplexGrid,
    xs: ArrayView1<f64>,
    ys: ArrayView1<f64>,
    params: &[f64],
    _ctx: &mut GeneratorContext
) -> Result<(), ApertureError> {
    check_params("gaussian", params, 2)?;

    fill_tapered_annulus(grid, xs, ys, params[0], params[1], 0.);

    Ok(())
}

// As `gaussian`, with a central hole of radius params[2].
pub fn gaussian_hole(
    grid: &mut ComplexGrid,
    xs: ArrayView1<f64>,
    ys: ArrayView1<f64>,
    params: &[f64],
    _ctx: &mut GeneratorContext
) -> Result<(), ApertureError> {
    check_params("gaussian_hole", params, 3)?;

    fill_tapered_annulus(grid, xs, ys, params[0], params[1], params[2]);

    Ok(())
}

fn fill_tapered_annulus(
    grid: &mut ComplexGrid,
    xs: ArrayView1<f64>,
    ys: ArrayView1<f64>,
    r_ext: f64,
    sigma: f64,
    r_int: f64
) {
    let (ext_sq, int_sq) = (r_ext*r_ext, r_int*r_int);
    let sig_sq2 = 2.*sigma*sigma;

    par_azip!((index (i, j), v in grid.view_mut()) {
        let rsq = xs[j]*xs[j]+ys[i]*ys[i];
        *v = Complex::new(taper(rsq, ext_sq, int_sq, sig_sq2).unwrap_or(0.), 0.);
    });
}

/// Gaussian taper `exp(-r^2/(2 sigma^2))` restricted to `r_int <= r <= r_ext`.
pub(crate) fn taper(rsq: f64, ext_sq: f64, int_sq: f64, sig_sq2: f64) -> Option<f64> {
    (rsq <= ext_sq && rsq >= int_sq).then(|| (-rsq/sig_sq2).exp())
}
