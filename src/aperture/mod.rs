mod basic;
mod noise;

use crate::grid::{ComplexGrid, GridError};
use crate::transform::Planner;
use ndarray::prelude::*;
use std::collections::HashMap;
use thiserror::Error;

pub use basic::{circular, gaussian, gaussian_hole, rectangle};
pub use noise::{
    corr_errors, corr_errors_with_rng, gauss_mask, rand_errors, rand_errors_with_rng,
    real_errors, NoisePlans
};



/// Fills a grid from its x (column) and y (row) coordinates and a list of
/// shape parameters.
pub type Generator = fn(
    &mut ComplexGrid,
    ArrayView1<f64>,
    ArrayView1<f64>,
    &[f64],
    &mut GeneratorContext
) -> Result<(), ApertureError>;

#[derive(Debug, Error)]
pub enum ApertureError {
    #[error("unknown aperture type \"{0}\"")]
    UnknownGenerator(String),

    #[error("{generator} needs at least {expected} parameters, got {found}")]
    MissingParams { generator: &'static str, expected: usize, found: usize },

    #[error("invalid parameters for {generator}: {reason}")]
    InvalidParams { generator: &'static str, reason: String },

    #[error("correlated noise has zero spread inside the aperture")]
    DegenerateNoise,

    #[error(transparent)]
    Grid(#[from] GridError)
}

pub(crate) fn check_params(
    generator: &'static str,
    params: &[f64],
    expected: usize
) -> Result<(), ApertureError> {
    if params.len() < expected {
        return Err(ApertureError::MissingParams { generator, expected, found: params.len() });
    }

    Ok(())
}



/// Per-worker state shared by successive generator calls: the planner used for
/// auxiliary transforms and the plans built with it on first use.
pub struct GeneratorContext<'a> {
    planner: &'a dyn Planner,
    noise: Option<NoisePlans>
}

impl<'a> GeneratorContext<'a> {
    pub fn new(planner: &'a dyn Planner) -> Self {
        Self { planner, noise: None }
    }

    pub(crate) fn noise_plans(&mut self, dim: (usize, usize)) -> Result<&mut NoisePlans, ApertureError> {
        let plans = match self.noise.take() {
            Some(plans) if plans.dim() == dim => plans,
            _ => NoisePlans::new(self.planner, dim)?
        };

        Ok(self.noise.insert(plans))
    }
}



/// Name to generator lookup, built once and passed around by reference. Each
/// entry also records how many parameters the generator needs.
pub struct Registry {
    generators: HashMap<&'static str, (Generator, usize)>
}

impl Registry {
    pub fn standard() -> Self {
        let entries: [(&'static str, (Generator, usize)); 6] = [
            ("circular", (circular, 1)),
            ("rectangle", (rectangle, 2)),
            ("gaussian", (gaussian, 2)),
            ("gaussian_hole", (gaussian_hole, 3)),
            ("rand_errors", (rand_errors, 4)),
            ("corr_errors", (corr_errors, 6))
        ];

        Self { generators: entries.into_iter().collect() }
    }

    pub fn get(&self, name: &str) -> Result<Generator, ApertureError> {
        self.generators
            .get(name)
            .map(|&(generator, _)| generator)
            .ok_or_else(|| ApertureError::UnknownGenerator(name.to_string()))
    }

    /// Looks up `name` and checks that `params` is long enough for it.
    pub fn check(&self, name: &str, params: &[f64]) -> Result<Generator, ApertureError> {
        let (&key, &(generator, expected)) = self.generators
            .get_key_value(name)
            .ok_or_else(|| ApertureError::UnknownGenerator(name.to_string()))?;

        check_params(key, params, expected)?;

        Ok(generator)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.generators.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.generators.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
