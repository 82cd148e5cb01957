use super::basic::taper;
use super::{check_params, ApertureError, GeneratorContext};
use crate::grid::ComplexGrid;
use crate::ops::{filter, ifftshift_grid_in_place, mean_and_std};
use crate::transform::{Direction, Plan, Planner};
use ndarray::prelude::*;
use ndarray::par_azip;
use ndrustfft::Complex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use tracing::info;



/// Auxiliary transforms used by [`corr_errors`]: forward for the noise, forward
/// for the smoothing kernel, and inverse for their product, plus the kernel's
/// own grid.
pub struct NoisePlans {
    forward: Plan,
    kernel_forward: Plan,
    inverse: Plan,
    kernel: ComplexGrid
}

impl NoisePlans {
    pub fn new(planner: &dyn Planner, dim: (usize, usize)) -> Result<Self, ApertureError> {
        let (rows, cols) = dim;

        info!(rows, cols, "planning correlated noise transforms");

        Ok(Self {
            forward: planner.plan(rows, cols, Direction::Forward)?,
            kernel_forward: planner.plan(rows, cols, Direction::Forward)?,
            inverse: planner.plan(rows, cols, Direction::Inverse)?,
            kernel: ComplexGrid::new(rows, cols)?
        })
    }

    pub fn dim(&self) -> (usize, usize) {
        self.kernel.dim()
    }
}

fn normal(generator: &'static str, sigma: f64) -> Result<Normal<f64>, ApertureError> {
    Normal::new(0., sigma).map_err(|e| ApertureError::InvalidParams {
        generator,
        reason: format!("error sigma {sigma}: {e}")
    })
}



/// Gaussian smoothing kernel with correlation length `lc`, centred on the
/// coordinate origin and normalized to unit sum.
pub fn gauss_mask(grid: &mut ComplexGrid, xs: ArrayView1<f64>, ys: ArrayView1<f64>, lc: f64) {
    let sig_sq2 = 2.*lc*lc;

    par_azip!((index (i, j), v in grid.view_mut()) {
        let rsq = xs[j]*xs[j]+ys[i]*ys[i];
        *v = Complex::new((-rsq/sig_sq2).exp(), 0.);
    });

    let total: f64 = grid.view().iter().map(|v| v.re).sum();

    if total > 0. {
        grid.divide_by(total);
    }
}

/// Real Gaussian noise of spread `sigma` inside `radius`, zero elsewhere.
/// Cells are drawn row by row, so a given RNG state always gives the same grid.
pub fn real_errors<R: Rng + ?Sized>(
    grid: &mut ComplexGrid,
    xs: ArrayView1<f64>,
    ys: ArrayView1<f64>,
    radius: f64,
    sigma: f64,
    rng: &mut R
) -> Result<(), ApertureError> {
    let dist = normal("real_errors", sigma)?;
    let rsq_max = radius*radius;

    for ((i, j), v) in grid.view_mut().indexed_iter_mut() {
        let rsq = xs[j]*xs[j]+ys[i]*ys[i];

        *v = if rsq <= rsq_max {
            Complex::new(dist.sample(rng), 0.)
        }
        else {
            Complex::new(0., 0.)
        };
    }

    Ok(())
}



// Circular convolution of `grid` with the unit-sum Gaussian of width `lc`, up to
// the unnormalized inverse's factor of rows*cols. The kernel is centred on
// index n/2, so the result is rotated back by n/2 on each axis.
fn smooth(
    plans: &mut NoisePlans,
    grid: &mut ComplexGrid,
    xs: ArrayView1<f64>,
    ys: ArrayView1<f64>,
    lc: f64
) -> Result<(), ApertureError> {
    gauss_mask(&mut plans.kernel, xs, ys, lc);

    plans.forward.execute_in_place(grid)?;
    plans.kernel_forward.execute_in_place(&mut plans.kernel)?;
    grid.multiply_elementwise(&plans.kernel)?;
    plans.inverse.execute_in_place(grid)?;
    ifftshift_grid_in_place(grid);

    Ok(())
}



// Holed Gaussian aperture with uncorrelated phase errors. params: outer radius,
// taper sigma, inner radius, phase error sigma, and optionally the RNG seed.
pub fn rand_errors(
    grid: &mut ComplexGrid,
    xs: ArrayView1<f64>,
    ys: ArrayView1<f64>,
    params: &[f64],
    _ctx: &mut GeneratorContext
) -> Result<(), ApertureError> {
    check_params("rand_errors", params, 4)?;

    let mut rng = match params.get(4) {
        Some(&seed) => ChaCha8Rng::seed_from_u64(seed as u64),
        None => ChaCha8Rng::from_entropy()
    };

    rand_errors_with_rng(grid, xs, ys, params, &mut rng)
}

pub fn rand_errors_with_rng<R: Rng + ?Sized>(
    grid: &mut ComplexGrid,
    xs: ArrayView1<f64>,
    ys: ArrayView1<f64>,
    params: &[f64],
    rng: &mut R
) -> Result<(), ApertureError> {
    check_params("rand_errors", params, 4)?;

    let ext_sq = params[0]*params[0];
    let sig_sq2 = 2.*params[1]*params[1];
    let int_sq = params[2]*params[2];
    let dist = normal("rand_errors", params[3])?;

    for ((i, j), v) in grid.view_mut().indexed_iter_mut() {
        let rsq = xs[j]*xs[j]+ys[i]*ys[i];

        *v = match taper(rsq, ext_sq, int_sq, sig_sq2) {
            Some(rho) => Complex::from_polar(rho, dist.sample(rng)),
            None => Complex::new(0., 0.)
        };
    }

    Ok(())
}



// Holed Gaussian aperture with spatially correlated phase errors ("bumps").
// params: outer radius, taper sigma, inner radius, phase error sigma, RNG seed,
// correlation length.
pub fn corr_errors(
    grid: &mut ComplexGrid,
    xs: ArrayView1<f64>,
    ys: ArrayView1<f64>,
    params: &[f64],
    ctx: &mut GeneratorContext
) -> Result<(), ApertureError> {
    check_params("corr_errors", params, 6)?;

    let mut rng = ChaCha8Rng::seed_from_u64(params[4] as u64);

    corr_errors_with_rng(grid, xs, ys, params, ctx, &mut rng)
}

pub fn corr_errors_with_rng<R: Rng + ?Sized>(
    grid: &mut ComplexGrid,
    xs: ArrayView1<f64>,
    ys: ArrayView1<f64>,
    params: &[f64],
    ctx: &mut GeneratorContext,
    rng: &mut R
) -> Result<(), ApertureError> {
    check_params("corr_errors", params, 6)?;

    let (r_ext, sigma, r_int) = (params[0], params[1], params[2]);
    let (err_sigma, lc) = (params[3], params[5]);
    let plans = ctx.noise_plans(grid.dim())?;

    // Noise reaches past the rim so the smoothed field has no edge fall-off
    real_errors(grid, xs, ys, r_ext+3.*lc, err_sigma, rng)?;
    smooth(plans, grid, xs, ys, lc)?;

    let depth_sigma = mean_and_std(grid, |v| v.re, xs, ys, filter::within_radius(r_ext)).err;

    if !(depth_sigma > 0.) {
        return Err(ApertureError::DegenerateNoise);
    }

    grid.scale_by(err_sigma/depth_sigma);

    let (ext_sq, int_sq) = (r_ext*r_ext, r_int*r_int);
    let sig_sq2 = 2.*sigma*sigma;

    par_azip!((index (i, j), v in grid.view_mut()) {
        let rsq = xs[j]*xs[j]+ys[i]*ys[i];

        *v = match taper(rsq, ext_sq, int_sq, sig_sq2) {
            Some(rho) => Complex::from_polar(rho, v.re),
            None => Complex::new(0., 0.)
        };
    });

    Ok(())
}
